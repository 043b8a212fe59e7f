//! Preconditioned conjugate gradients

use ndarray::Array1;

use crate::comm::{gsum_mag, gsum_prod, Communicator};
use crate::controls::SolverControls;
use crate::ldu::LduMatrix;
use crate::performance::SolverPerformance;
use crate::traits::{LduPreconditioner, Scalar};

/// Conjugate-gradient solve of the symmetric system `A psi = source`.
///
/// The preconditioner must have been built from the matrix's current
/// coefficient state. Costs three global reductions per iteration; [`fpcg`]
/// is the two-reduction restructuring with identical iterates.
///
/// [`fpcg`]: crate::iterative::fpcg
pub fn pcg<S: Scalar>(
    matrix: &LduMatrix<S>,
    psi: &mut Array1<S>,
    source: &Array1<S>,
    field_name: &str,
    controls: &SolverControls,
    precon: &dyn LduPreconditioner<S>,
    comm: &dyn Communicator<S>,
) -> SolverPerformance<S> {
    assert!(
        matrix.is_symmetric(),
        "pcg: matrix must be symmetric (use pbicg for asymmetric systems)"
    );

    let mut perf = SolverPerformance::new(controls.qualified_name("PCG"), field_name);
    let tolerance = S::from_config(controls.tolerance);
    let rel_tol = S::from_config(controls.rel_tol);

    let n = psi.len();
    let mut w = Array1::zeros(n);
    let mut p = Array1::zeros(n);

    matrix.amul(&mut w, psi, comm);
    let mut r = source - &w;

    let norm_factor = matrix.norm_factor(psi, source, &w, comm);
    log::debug!(
        "{}: normalization factor = {:e}",
        perf.solver_name(),
        norm_factor
    );

    perf.initial_residual = gsum_mag(&r, comm) / norm_factor;
    perf.final_residual = perf.initial_residual;

    if controls.min_iterations > 0 || !perf.check_convergence(tolerance, rel_tol) {
        let mut rho = S::great();

        loop {
            let rho_old = rho;

            precon.precondition(&mut w, &r, comm);
            rho = gsum_prod(&w, &r, comm);

            if perf.n_iterations == 0 {
                p.assign(&w);
            } else {
                let beta = rho / rho_old;
                p.zip_mut_with(&w, |pi, &wi| *pi = wi + beta * *pi);
            }

            // w doubles as the A.p product; the preconditioner refills it
            // at the top of the next iteration.
            matrix.amul(&mut w, &p, comm);
            let pq = gsum_prod(&w, &p, comm);

            if perf.check_singularity(pq.abs() / norm_factor) {
                break;
            }

            let alpha = rho / pq;
            psi.zip_mut_with(&p, |psii, &pi| *psii += alpha * pi);
            r.zip_mut_with(&w, |ri, &wi| *ri -= alpha * wi);

            perf.final_residual = gsum_mag(&r, comm) / norm_factor;
            perf.n_iterations += 1;

            if controls.log_interval > 0 && perf.n_iterations % controls.log_interval == 0 {
                log::debug!(
                    "{}: iteration {}, residual = {:e}",
                    perf.solver_name(),
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
