//! Preconditioned biconjugate gradients

use ndarray::Array1;

use crate::comm::{gsum_mag, gsum_prod, Communicator};
use crate::controls::SolverControls;
use crate::ldu::LduMatrix;
use crate::performance::SolverPerformance;
use crate::traits::{LduPreconditioner, Scalar};

/// Biconjugate-gradient solve of the asymmetric system `A psi = source`.
///
/// Runs the conjugate recurrence on `A` and its transpose side by side,
/// so each iteration costs one `amul`, one `tmul` and both preconditioner
/// applications. Convergence is judged on the `A` residual alone.
pub fn pbicg<S: Scalar>(
    matrix: &LduMatrix<S>,
    psi: &mut Array1<S>,
    source: &Array1<S>,
    field_name: &str,
    controls: &SolverControls,
    precon: &dyn LduPreconditioner<S>,
    comm: &dyn Communicator<S>,
) -> SolverPerformance<S> {
    assert!(
        matrix.is_asymmetric(),
        "pbicg: matrix must be asymmetric (use pcg for symmetric systems)"
    );

    let mut perf = SolverPerformance::new(controls.qualified_name("PBiCG"), field_name);
    let tolerance = S::from_config(controls.tolerance);
    let rel_tol = S::from_config(controls.rel_tol);

    let n = psi.len();
    let mut w = Array1::zeros(n);
    let mut w_t = Array1::zeros(n);
    let mut p = Array1::zeros(n);
    let mut p_t = Array1::zeros(n);

    matrix.amul(&mut w, psi, comm);
    matrix.tmul(&mut w_t, psi, comm);
    let mut r = source - &w;
    let mut r_t = source - &w_t;

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
            precon.precondition_transpose(&mut w_t, &r_t, comm);
            rho = gsum_prod(&w, &r_t, comm);

            if perf.n_iterations == 0 {
                p.assign(&w);
                p_t.assign(&w_t);
            } else {
                let beta = rho / rho_old;
                p.zip_mut_with(&w, |pi, &wi| *pi = wi + beta * *pi);
                p_t.zip_mut_with(&w_t, |pi, &wi| *pi = wi + beta * *pi);
            }

            matrix.amul(&mut w, &p, comm);
            matrix.tmul(&mut w_t, &p_t, comm);
            let pq = gsum_prod(&w, &p_t, comm);

            if perf.check_singularity(pq.abs() / norm_factor) {
                break;
            }

            let alpha = rho / pq;
            psi.zip_mut_with(&p, |psii, &pi| *psii += alpha * pi);
            r.zip_mut_with(&w, |ri, &wi| *ri -= alpha * wi);
            r_t.zip_mut_with(&w_t, |ri, &wi| *ri -= alpha * wi);

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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::SerialComm;
    use crate::dense::DenseLu;
    use crate::ldu::LduAddressing;
    use crate::preconditioners::DiluPreconditioner;
    use crate::traits::NonePreconditioner;
    use approx::assert_relative_eq;
    use std::sync::Arc;

    /// Upwinded 1-D convection-diffusion chain.
    fn convection_diffusion(n: usize) -> LduMatrix<f64> {
        let owner: Vec<usize> = (0..n - 1).collect();
        let neighbour: Vec<usize> = (1..n).collect();
        let addr = Arc::new(LduAddressing::new(n, owner, neighbour, vec![]).unwrap());
        let mut diag = vec![2.2; n];
        diag[0] = 3.0;
        diag[n - 1] = 3.0;
        LduMatrix::asymmetric(addr, diag, vec![-1.3; n - 1], vec![-0.7; n - 1])
    }

    #[test]
    fn matches_a_dense_factorization() {
        let n = 14;
        let matrix = convection_diffusion(n);
        let comm = SerialComm;
        let source = Array1::from_shape_fn(n, |i| 0.5 + (i as f64) * 0.1);

        let controls = SolverControls {
            tolerance: 1e-12,
            ..SolverControls::default()
        };
        let mut psi = Array1::zeros(n);
        let perf = pbicg(
            &matrix,
            &mut psi,
            &source,
            "U",
            &controls,
            &NonePreconditioner,
            &comm,
        );
        assert!(perf.converged());
        assert_eq!(perf.solver_name(), "PBiCG");

        let lu = DenseLu::factorize(&matrix.to_dense()).unwrap();
        let exact = lu.solve(&source);
        for cell in 0..n {
            assert_relative_eq!(psi[cell], exact[cell], epsilon = 1e-8);
        }
    }

    #[test]
    fn dilu_preconditioning_collapses_the_iteration_count() {
        let n = 40;
        let matrix = convection_diffusion(n);
        let comm = SerialComm;
        let source = Array1::from_elem(n, 1.0);

        let controls = SolverControls {
            preconditioner: "DILU".to_string(),
            tolerance: 1e-10,
            ..SolverControls::default()
        };
        let mut psi = Array1::zeros(n);
        let perf = pbicg(
            &matrix,
            &mut psi,
            &source,
            "U",
            &controls,
            &DiluPreconditioner::new(&matrix),
            &comm,
        );

        assert!(perf.converged());
        assert_eq!(perf.solver_name(), "DILUPBiCG");
        // DILU is a complete factorization on a tridiagonal system.
        assert!(perf.n_iterations() <= 2);
    }

    #[test]
    #[should_panic(expected = "must be asymmetric")]
    fn rejects_symmetric_matrices() {
        let addr = Arc::new(LduAddressing::new(2, vec![0], vec![1], vec![]).unwrap());
        let matrix = LduMatrix::symmetric(addr, vec![2.0, 2.0], vec![-1.0]);
        let comm = SerialComm;
        let source = Array1::from_elem(2, 1.0);
        let mut psi = Array1::zeros(2);
        pbicg(
            &matrix,
            &mut psi,
            &source,
            "U",
            &SolverControls::default(),
            &NonePreconditioner,
            &comm,
        );
    }
}
