//! Relaxation smoothers
//!
//! The named smoother set used by the smooth solver and by multigrid
//! pre/post relaxation. Constructed by name through the registry.

pub mod gauss_seidel;
pub mod jacobi;

pub use gauss_seidel::{GaussSeidelSmoother, SymGaussSeidelSmoother};
pub use jacobi::JacobiSmoother;
