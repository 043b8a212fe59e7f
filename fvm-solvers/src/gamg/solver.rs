//! Geometric-algebraic multigrid
//!
//! The hierarchy is built once per coefficient state: repeated pairwise
//! agglomeration on |upper| face weights, each level carrying its merged
//! matrix and the transfer map back to the level above. A cycle smooths,
//! restricts the residual, recurses (twice for a W cycle), scales the
//! correction for symmetric systems, prolongs and smooths again. The
//! coarsest system is either solved directly or smoothed hard.

use ndarray::Array1;

use crate::comm::{gsum_mag, Communicator};
use crate::controls::{CycleType, GamgControls, SolverControls};
use crate::dense::DenseLu;
use crate::gamg::agglomeration::{
    agglomerate_matrix, coarsen_addressing, pairwise_agglomerate, prolong_field, restrict_field,
    LevelMap,
};
use crate::ldu::LduMatrix;
use crate::performance::SolverPerformance;
use crate::traits::{Scalar, Smoother};

/// Sweep count on the coarsest level when no direct solve is available.
const COARSEST_SWEEPS: usize = 20;

struct GamgLevel<S: Scalar> {
    matrix: LduMatrix<S>,
    map: LevelMap,
}

/// A multigrid hierarchy bound to one matrix's coefficient state.
///
/// The finest matrix is not stored; callers pass it to [`cycle`] so the
/// solver can sit behind a preconditioner without owning the system it
/// preconditions. Rebuild the hierarchy whenever the coefficients change.
///
/// [`cycle`]: GamgSolver::cycle
pub struct GamgSolver<S: Scalar> {
    levels: Vec<GamgLevel<S>>,
    coarsest_lu: Option<DenseLu<S>>,
    controls: GamgControls,
    smoother: Box<dyn Smoother<S>>,
}

impl<S: Scalar> GamgSolver<S> {
    pub fn new(
        matrix: &LduMatrix<S>,
        controls: GamgControls,
        smoother: Box<dyn Smoother<S>>,
        comm: &dyn Communicator<S>,
    ) -> Self {
        let mut levels: Vec<GamgLevel<S>> = Vec::new();

        loop {
            // Cycling walks every rank through the same depth, so adding a
            // level takes a unanimous vote.
            let plan = {
                let current = levels.last().map_or(matrix, |l| &l.matrix);
                if current.n_cells() > controls.n_cells_in_coarsest_level
                    && levels.len() + 1 < controls.max_levels
                {
                    let weights: Vec<S> = current.upper().iter().map(|&w| w.abs()).collect();
                    let aggl = pairwise_agglomerate(current.addressing(), &weights);
                    if aggl.n_coarse < current.n_cells() {
                        Some(aggl)
                    } else {
                        None
                    }
                } else {
                    None
                }
            };

            let votes = comm.sum(if plan.is_some() { S::one() } else { S::zero() });
            if votes < S::from_config(comm.size() as f64) {
                break;
            }
            let aggl = match plan {
                Some(aggl) => aggl,
                // A unanimous vote implies a local plan.
                None => break,
            };

            let current = levels.last().map_or(matrix, |l| &l.matrix);
            let map = coarsen_addressing(current.addressing(), &aggl);
            let coarse = agglomerate_matrix(current, &map);
            levels.push(GamgLevel {
                matrix: coarse,
                map,
            });
        }

        let coarsest = levels.last().map_or(matrix, |l| &l.matrix);
        log::debug!(
            "GAMG: {} levels, coarsest level has {} cells",
            levels.len() + 1,
            coarsest.n_cells()
        );

        // A dense factorization of the coarsest level is only worthwhile
        // in serial; distributed runs fall back to heavy smoothing.
        let coarsest_lu = if controls.direct_solve_coarsest && comm.size() == 1 {
            match DenseLu::factorize(&coarsest.to_dense()) {
                Ok(lu) => Some(lu),
                Err(err) => {
                    log::warn!("GAMG: coarsest-level direct solve disabled: {err}");
                    None
                }
            }
        } else {
            None
        };

        GamgSolver {
            levels,
            coarsest_lu,
            controls,
            smoother,
        }
    }

    /// Total level count, the finest included.
    pub fn n_levels(&self) -> usize {
        self.levels.len() + 1
    }

    /// Cell counts per level, finest first.
    pub fn level_cells(&self, fine_matrix: &LduMatrix<S>) -> Vec<usize> {
        let mut cells = vec![fine_matrix.n_cells()];
        cells.extend(self.levels.iter().map(|l| l.matrix.n_cells()));
        cells
    }

    /// One multigrid cycle on `A psi = source`, shaped by the configured
    /// cycle type. `fine_matrix` must be the matrix the hierarchy was
    /// built from.
    pub fn cycle(
        &self,
        fine_matrix: &LduMatrix<S>,
        psi: &mut Array1<S>,
        source: &Array1<S>,
        comm: &dyn Communicator<S>,
    ) {
        self.cycle_level(0, fine_matrix, psi, source, comm);
    }

    fn level_matrix<'a>(&'a self, level: usize, fine_matrix: &'a LduMatrix<S>) -> &'a LduMatrix<S> {
        if level == 0 {
            fine_matrix
        } else {
            &self.levels[level - 1].matrix
        }
    }

    fn cycle_level(
        &self,
        level: usize,
        fine_matrix: &LduMatrix<S>,
        psi: &mut Array1<S>,
        source: &Array1<S>,
        comm: &dyn Communicator<S>,
    ) {
        let matrix = self.level_matrix(level, fine_matrix);

        if level == self.levels.len() {
            self.solve_coarsest(matrix, psi, source, comm);
            return;
        }

        if self.controls.n_pre_sweeps > 0 {
            self.smoother
                .smooth(matrix, psi, source, comm, self.controls.n_pre_sweeps);
        }

        let residual = matrix.residual(psi, source, comm);

        let map = &self.levels[level].map;
        let mut coarse_source = Array1::zeros(map.n_coarse);
        restrict_field(&mut coarse_source, &residual, &map.cell_map);

        let mut coarse_correction = Array1::zeros(map.n_coarse);
        self.cycle_level(level + 1, fine_matrix, &mut coarse_correction, &coarse_source, comm);
        if self.controls.cycle == CycleType::W {
            self.cycle_level(level + 1, fine_matrix, &mut coarse_correction, &coarse_source, comm);
        }

        if matrix.is_symmetric() {
            scale_correction(
                self.level_matrix(level + 1, fine_matrix),
                &mut coarse_correction,
                &coarse_source,
                comm,
            );
        }

        let mut correction = Array1::zeros(matrix.n_cells());
        prolong_field(&mut correction, &coarse_correction, &map.cell_map);
        *psi += &correction;

        let post_sweeps = if level == 0 {
            self.controls.n_finest_sweeps
        } else {
            self.controls.n_post_sweeps
        };
        if post_sweeps > 0 {
            self.smoother.smooth(matrix, psi, source, comm, post_sweeps);
        }
    }

    fn solve_coarsest(
        &self,
        matrix: &LduMatrix<S>,
        psi: &mut Array1<S>,
        source: &Array1<S>,
        comm: &dyn Communicator<S>,
    ) {
        if let Some(lu) = &self.coarsest_lu {
            *psi = lu.solve(source);
            return;
        }
        self.smoother
            .smooth(matrix, psi, source, comm, COARSEST_SWEEPS);
    }
}

/// Minimize the energy norm of the error left after prolongation: scale
/// the coarse correction by <source, e> / <A e, e> before injecting it.
/// Only valid for symmetric operators; skipped when the denominator has
/// lost all significance.
fn scale_correction<S: Scalar>(
    matrix: &LduMatrix<S>,
    correction: &mut Array1<S>,
    source: &Array1<S>,
    comm: &dyn Communicator<S>,
) {
    let mut acorr = Array1::zeros(correction.len());
    matrix.amul(&mut acorr, correction, comm);

    let mut sums = [S::zero(); 2];
    for cell in 0..correction.len() {
        sums[0] += source[cell] * correction[cell];
        sums[1] += acorr[cell] * correction[cell];
    }
    comm.sum_batch(&mut sums);

    if sums[1].abs() < S::vsmall() {
        return;
    }
    let factor = sums[0] / sums[1];
    correction.mapv_inplace(|v| v * factor);
}

/// Solve `A psi = source` with multigrid cycles as the outer iteration.
pub fn gamg_solve<S: Scalar>(
    matrix: &LduMatrix<S>,
    psi: &mut Array1<S>,
    source: &Array1<S>,
    field_name: &str,
    controls: &SolverControls,
    smoother: Box<dyn Smoother<S>>,
    comm: &dyn Communicator<S>,
) -> SolverPerformance<S> {
    let mut perf = SolverPerformance::new("GAMG", field_name);
    let tolerance = S::from_config(controls.tolerance);
    let rel_tol = S::from_config(controls.rel_tol);

    let mut apsi = Array1::zeros(psi.len());
    matrix.amul(&mut apsi, psi, comm);
    let norm_factor = matrix.norm_factor(psi, source, &apsi, comm);
    log::debug!("GAMG: normalization factor = {:e}", norm_factor);

    let mut residual = source - &apsi;
    perf.initial_residual = gsum_mag(&residual, comm) / norm_factor;
    perf.final_residual = perf.initial_residual;

    if controls.min_iterations > 0 || !perf.check_convergence(tolerance, rel_tol) {
        let solver = GamgSolver::new(matrix, controls.gamg, smoother, comm);

        loop {
            solver.cycle(matrix, psi, source, comm);

            matrix.amul(&mut apsi, psi, comm);
            residual = source - &apsi;
            perf.final_residual = gsum_mag(&residual, comm) / norm_factor;
            perf.n_iterations += 1;

            if controls.log_interval > 0 && perf.n_iterations % controls.log_interval == 0 {
                log::debug!(
                    "GAMG: iteration {}, residual = {:e}",
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
