//! Smoother-as-solver

use ndarray::Array1;

use crate::comm::{gsum_mag, Communicator};
use crate::controls::SolverControls;
use crate::ldu::LduMatrix;
use crate::performance::SolverPerformance;
use crate::traits::{Scalar, Smoother};

/// Iterate a smoother until the residual criteria are met.
///
/// Runs `n_sweeps` relaxation sweeps between residual evaluations, and
/// counts every sweep as an iteration. Cheap per sweep but only linearly
/// convergent; the usual role is cleaning up mildly out-of-balance
/// transported quantities rather than pressure.
pub fn smooth_solve<S: Scalar>(
    matrix: &LduMatrix<S>,
    psi: &mut Array1<S>,
    source: &Array1<S>,
    field_name: &str,
    controls: &SolverControls,
    smoother: &dyn Smoother<S>,
    comm: &dyn Communicator<S>,
) -> SolverPerformance<S> {
    let mut perf = SolverPerformance::new("smoothSolver", field_name);
    let tolerance = S::from_config(controls.tolerance);
    let rel_tol = S::from_config(controls.rel_tol);
    let n_sweeps = controls.n_sweeps.max(1);

    let mut apsi = Array1::zeros(psi.len());
    matrix.amul(&mut apsi, psi, comm);
    let norm_factor = matrix.norm_factor(psi, source, &apsi, comm);
    log::debug!("smoothSolver: normalization factor = {:e}", norm_factor);

    let residual = source - &apsi;
    perf.initial_residual = gsum_mag(&residual, comm) / norm_factor;
    perf.final_residual = perf.initial_residual;

    if controls.min_iterations > 0 || !perf.check_convergence(tolerance, rel_tol) {
        loop {
            smoother.smooth(matrix, psi, source, comm, n_sweeps);

            let residual = matrix.residual(psi, source, comm);
            perf.final_residual = gsum_mag(&residual, comm) / norm_factor;
            perf.n_iterations += n_sweeps;

            if controls.log_interval > 0 && perf.n_iterations % controls.log_interval == 0 {
                log::debug!(
                    "smoothSolver: iteration {}, residual = {:e}",
                    perf.n_iterations,
                    perf.final_residual
                );
            }

            let keep_going = (perf.n_iterations < controls.max_iterations
                && !perf.check_convergence(tolerance, rel_tol))
                || perf.n_iterations < controls.min_iterations;
            if !keep_going {
                break;
            }
        }
    }

    log::info!("{perf}");
    perf
}
