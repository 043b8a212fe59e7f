//! Field mapping between mesh topology states
//!
//! Companion crate to `fvm-solvers`: when the mesh is refined,
//! re-partitioned or its patches change, the solution fields have to be
//! carried onto the new cell layout before the next solve. Two layers
//! cover that:
//!
//! - [`FieldMapper`] describes a single-process transfer, either direct
//!   (one source index per target, with an [`UNMAPPED`] sentinel) or
//!   interpolative (weighted source contributions per target).
//! - [`DistributedFieldMapper`] first gathers remote source values into a
//!   stacked local field through a [`DistributionMap`], then applies a
//!   local mapper over stacked indices.
//!
//! ```ignore
//! use fvm_field::FieldMapper;
//! use ndarray::array;
//!
//! let mapper = FieldMapper::direct(vec![2, 0, 1]);
//! let new_field = mapper.map(&array![10.0, 20.0, 30.0]);
//! assert_eq!(new_field, array![30.0, 10.0, 20.0]);
//! ```

pub mod distributed;
pub mod mapper;

pub use distributed::{DistributedFieldMapper, DistributionMap};
pub use mapper::{FieldMapper, MappingError, UNMAPPED};
