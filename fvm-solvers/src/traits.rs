//! Core traits for scalar types, preconditioners and smoothers
//!
//! This module defines the scalar abstraction shared by all matrix and
//! solver code, plus the two capability traits the solver layer is generic
//! over:
//!
//! - [`Scalar`]: real floating-point scalars (f64, f32) with the framework
//!   numeric limits
//! - [`LduPreconditioner`]: approximate inverse application `w ≈ A⁻¹·r`
//! - [`Smoother`]: in-place relaxation sweeps over an LDU system

use crate::comm::Communicator;
use crate::ldu::LduMatrix;
use ndarray::Array1;
use num_traits::{Float, NumAssign};
use std::fmt;

/// Real scalar type for field and coefficient storage.
///
/// Implemented for `f64` and `f32`. Carries the per-precision limits used
/// by convergence and singularity checks so that solver code never spells
/// out magic epsilons inline.
pub trait Scalar:
    Float
    + NumAssign
    + Send
    + Sync
    + Default
    + fmt::Debug
    + fmt::Display
    + fmt::LowerExp
    + 'static
{
    /// Small value guarding relative comparisons (1e-15 for f64).
    fn small() -> Self;

    /// Very small value guarding divisions; anything below it is treated
    /// as numerically zero (1e-300 for f64).
    fn vsmall() -> Self;

    /// Large sentinel value (1e15 for f64).
    fn great() -> Self;

    /// Convert a configuration value (always carried as f64 in controls)
    /// into this precision.
    fn from_config(v: f64) -> Self;
}

impl Scalar for f64 {
    #[inline]
    fn small() -> Self {
        1e-15
    }

    #[inline]
    fn vsmall() -> Self {
        1e-300
    }

    #[inline]
    fn great() -> Self {
        1e15
    }

    #[inline]
    fn from_config(v: f64) -> Self {
        v
    }
}

impl Scalar for f32 {
    #[inline]
    fn small() -> Self {
        1e-6
    }

    #[inline]
    fn vsmall() -> Self {
        1e-37
    }

    #[inline]
    fn great() -> Self {
        1e6
    }

    #[inline]
    fn from_config(v: f64) -> Self {
        v as f32
    }
}

/// Preconditioner over an LDU system.
///
/// `precondition` computes an approximate solution `w` to `A·w ≈ r`
/// cheaper than a full solve. Implementations cache any factorization at
/// construction from a borrowed matrix; if the matrix coefficients change
/// afterwards the preconditioner must be rebuilt (no dirty tracking).
pub trait LduPreconditioner<S: Scalar>: Send + Sync {
    /// Approximately solve `A·w = r`, writing into `w`.
    fn precondition(&self, w: &mut Array1<S>, r: &Array1<S>, comm: &dyn Communicator<S>);

    /// Approximately solve `Aᵀ·w = r`, writing into `w`.
    ///
    /// Defaults to `precondition`, which is exact for symmetric
    /// preconditioners.
    fn precondition_transpose(&self, w: &mut Array1<S>, r: &Array1<S>, comm: &dyn Communicator<S>) {
        self.precondition(w, r, comm);
    }

    /// Registry name this preconditioner was constructed under.
    fn name(&self) -> &str;
}

impl<S: Scalar> fmt::Debug for dyn LduPreconditioner<S> + '_ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LduPreconditioner({})", self.name())
    }
}

/// Relaxation smoother over an LDU system.
///
/// Used standalone by the smooth solver and as the pre/post relaxation
/// inside multigrid cycles. A sweep reads and updates `psi` in place
/// against the given source; coupled boundary contributions are refreshed
/// once per sweep through the communicator.
pub trait Smoother<S: Scalar>: Send + Sync {
    /// Apply `n_sweeps` relaxation sweeps to `psi`.
    fn smooth(
        &self,
        matrix: &LduMatrix<S>,
        psi: &mut Array1<S>,
        source: &Array1<S>,
        comm: &dyn Communicator<S>,
        n_sweeps: usize,
    );

    /// Registry name this smoother was constructed under.
    fn name(&self) -> &str;
}

impl<S: Scalar> fmt::Debug for dyn Smoother<S> + '_ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Smoother({})", self.name())
    }
}

/// The `none` preconditioner: `w = r` unchanged.
///
/// Exists so solver code can treat "no preconditioning" uniformly.
#[derive(Debug, Clone, Copy, Default)]
pub struct NonePreconditioner;

impl<S: Scalar> LduPreconditioner<S> for NonePreconditioner {
    fn precondition(&self, w: &mut Array1<S>, r: &Array1<S>, _comm: &dyn Communicator<S>) {
        w.assign(r);
    }

    fn name(&self) -> &str {
        "none"
    }
}
