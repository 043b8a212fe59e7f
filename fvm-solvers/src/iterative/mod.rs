//! Krylov and relaxation solvers over LDU systems.
//!
//! Each solver is a free function taking the matrix, the field to solve
//! for, its source, the run controls and a communicator, and returning the
//! performance record for the call. Symmetric systems go to [`pcg`] or
//! [`fpcg`], asymmetric ones to [`pbicg`]; [`smooth_solve`] wraps any
//! smoother behind the same interface.

pub mod fpcg;
pub mod pbicg;
pub mod pcg;
pub mod smooth;

pub use fpcg::fpcg;
pub use pbicg::pbicg;
pub use pcg::pcg;
pub use smooth::smooth_solve;
