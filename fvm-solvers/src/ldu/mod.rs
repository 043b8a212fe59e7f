//! Face-addressed sparse matrices
//!
//! The LDU layer: addressing ([`LduAddressing`]), coupled-boundary
//! interfaces ([`LduInterface`] and its processor/cyclic implementations)
//! and the matrix itself ([`LduMatrix`]).

pub mod addressing;
pub mod interfaces;
pub mod matrix;

pub use addressing::{AddressingError, LduAddressing, ScheduleEvent};
pub use interfaces::{CyclicInterface, LduInterface, ProcessorInterface};
pub use matrix::{LduMatrix, MatrixInterface};
