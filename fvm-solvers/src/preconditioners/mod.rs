//! Preconditioners for the Krylov solvers.
//!
//! All of them implement [`LduPreconditioner`](crate::traits::LduPreconditioner)
//! and are built from a matrix in its current coefficient state; none of
//! them track later coefficient changes. The no-op variant lives next to
//! the trait itself as [`NonePreconditioner`](crate::traits::NonePreconditioner).

pub mod diagonal;
pub mod dic;
pub mod dilu;
pub mod gamg;

pub use diagonal::DiagonalPreconditioner;
pub use dic::DicPreconditioner;
pub use dilu::DiluPreconditioner;
pub use gamg::GamgPreconditioner;
