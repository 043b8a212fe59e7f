//! Gauss-Seidel relaxation
//!
//! Forward and symmetric (forward-then-backward) Gauss-Seidel sweeps over
//! the LDU structure. The forward sweep walks cells in ascending order,
//! finishing each cell against already-updated lower neighbours and
//! scattering the fresh value into the working source of the cells above
//! it; the backward sweep of the symmetric variant reuses that scattered
//! source, so no second distribution pass is needed.
//!
//! Coupled-boundary contributions are refreshed into the working source
//! once per sweep, before the cell loop.

use crate::comm::Communicator;
use crate::ldu::LduMatrix;
use crate::traits::{Scalar, Smoother};
use ndarray::Array1;

/// Forward Gauss-Seidel.
#[derive(Debug, Clone, Copy, Default)]
pub struct GaussSeidelSmoother;

/// Symmetric Gauss-Seidel: one forward and one backward pass per sweep.
#[derive(Debug, Clone, Copy, Default)]
pub struct SymGaussSeidelSmoother;

fn forward_sweep<S: Scalar>(
    matrix: &LduMatrix<S>,
    psi: &mut Array1<S>,
    b_prime: &mut Array1<S>,
) {
    let addr = matrix.addressing();
    let own_start = addr.owner_start();
    let u = addr.upper_addr();
    let diag = matrix.diag();
    let lower = matrix.lower();
    let upper = matrix.upper();

    for cell in 0..addr.n_cells() {
        let f_start = own_start[cell];
        let f_end = own_start[cell + 1];

        let mut psii = b_prime[cell];
        for f in f_start..f_end {
            psii -= upper[f] * psi[u[f]];
        }
        psii /= diag[cell];

        // Push the finished value into the working source of the cells
        // above, so their lower-triangle terms are in place on arrival.
        for f in f_start..f_end {
            b_prime[u[f]] -= lower[f] * psii;
        }
        psi[cell] = psii;
    }
}

fn backward_sweep<S: Scalar>(matrix: &LduMatrix<S>, psi: &mut Array1<S>, b_prime: &Array1<S>) {
    let addr = matrix.addressing();
    let own_start = addr.owner_start();
    let u = addr.upper_addr();
    let diag = matrix.diag();
    let upper = matrix.upper();

    for cell in (0..addr.n_cells()).rev() {
        let f_start = own_start[cell];
        let f_end = own_start[cell + 1];

        // b_prime already carries the lower-triangle products scattered by
        // the forward sweep.
        let mut psii = b_prime[cell];
        for f in f_start..f_end {
            psii -= upper[f] * psi[u[f]];
        }
        psi[cell] = psii / diag[cell];
    }
}

fn refreshed_source<S: Scalar>(
    matrix: &LduMatrix<S>,
    psi: &Array1<S>,
    source: &Array1<S>,
    comm: &dyn Communicator<S>,
) -> Array1<S> {
    let mut b_prime = source.clone();
    matrix.add_coupled_source(&mut b_prime, psi, comm);
    b_prime
}

impl<S: Scalar> Smoother<S> for GaussSeidelSmoother {
    fn smooth(
        &self,
        matrix: &LduMatrix<S>,
        psi: &mut Array1<S>,
        source: &Array1<S>,
        comm: &dyn Communicator<S>,
        n_sweeps: usize,
    ) {
        for _ in 0..n_sweeps {
            let mut b_prime = refreshed_source(matrix, psi, source, comm);
            forward_sweep(matrix, psi, &mut b_prime);
        }
    }

    fn name(&self) -> &str {
        "GaussSeidel"
    }
}

impl<S: Scalar> Smoother<S> for SymGaussSeidelSmoother {
    fn smooth(
        &self,
        matrix: &LduMatrix<S>,
        psi: &mut Array1<S>,
        source: &Array1<S>,
        comm: &dyn Communicator<S>,
        n_sweeps: usize,
    ) {
        for _ in 0..n_sweeps {
            let mut b_prime = refreshed_source(matrix, psi, source, comm);
            forward_sweep(matrix, psi, &mut b_prime);
            backward_sweep(matrix, psi, &b_prime);
        }
    }

    fn name(&self) -> &str {
        "symGaussSeidel"
    }
}
