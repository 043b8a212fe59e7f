//! Multigrid as a preconditioner

use ndarray::Array1;

use crate::comm::Communicator;
use crate::controls::SolverControls;
use crate::gamg::GamgSolver;
use crate::ldu::LduMatrix;
use crate::traits::{LduPreconditioner, Scalar, Smoother};

/// One multigrid cycle per application, behind the preconditioner
/// interface.
///
/// Borrows the matrix it was built for and caches the agglomerated
/// hierarchy at construction, so rebuild after any coefficient change.
pub struct GamgPreconditioner<'m, S: Scalar> {
    matrix: &'m LduMatrix<S>,
    solver: GamgSolver<S>,
}

impl<'m, S: Scalar> GamgPreconditioner<'m, S> {
    pub fn new(
        matrix: &'m LduMatrix<S>,
        controls: &SolverControls,
        smoother: Box<dyn Smoother<S>>,
        comm: &dyn Communicator<S>,
    ) -> Self {
        Self {
            matrix,
            solver: GamgSolver::new(matrix, controls.gamg, smoother, comm),
        }
    }
}

impl<S: Scalar> LduPreconditioner<S> for GamgPreconditioner<'_, S> {
    fn precondition(&self, w: &mut Array1<S>, r: &Array1<S>, comm: &dyn Communicator<S>) {
        w.fill(S::zero());
        self.solver.cycle(self.matrix, w, r, comm);
    }

    fn name(&self) -> &str {
        "GAMG"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::{gsum_mag, SerialComm};
    use crate::ldu::LduAddressing;
    use crate::smoothers::GaussSeidelSmoother;
    use std::sync::Arc;

    #[test]
    fn richardson_iteration_with_one_cycle_converges_fast() {
        let n = 64;
        let owner: Vec<usize> = (0..n - 1).collect();
        let neighbour: Vec<usize> = (1..n).collect();
        let addr = Arc::new(LduAddressing::new(n, owner, neighbour, vec![]).unwrap());
        let mut diag = vec![2.0; n];
        diag[0] = 3.0;
        diag[n - 1] = 3.0;
        let matrix = LduMatrix::symmetric(addr, diag, vec![-1.0; n - 1]);

        let comm = SerialComm;
        let precon = GamgPreconditioner::new(
            &matrix,
            &SolverControls::default(),
            Box::new(GaussSeidelSmoother),
            &comm,
        );
        assert_eq!(precon.name(), "GAMG");

        let source = Array1::from_elem(n, 1.0);
        let mut psi = Array1::zeros(n);
        let mut w = Array1::zeros(n);

        let r0 = gsum_mag(&matrix.residual(&psi, &source, &comm), &comm);
        for _ in 0..4 {
            let r = matrix.residual(&psi, &source, &comm);
            precon.precondition(&mut w, &r, &comm);
            psi += &w;
        }
        let r4 = gsum_mag(&matrix.residual(&psi, &source, &comm), &comm);
        assert!(r4 < 1e-3 * r0);
    }
}
