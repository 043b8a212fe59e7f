//! Solve-outcome records
//!
//! [`SolverPerformance`] is the value record every solve call returns:
//! solver and field name, initial/final residuals, iteration count and the
//! converged/singular flags. Immutable to callers; solvers fill it in as
//! the iteration proceeds and hand it back by value.

use crate::traits::Scalar;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct SolverPerformance<S: Scalar> {
    pub(crate) solver_name: String,
    pub(crate) field_name: String,
    pub(crate) initial_residual: S,
    pub(crate) final_residual: S,
    pub(crate) n_iterations: usize,
    pub(crate) converged: bool,
    pub(crate) singular: bool,
}

impl<S: Scalar> SolverPerformance<S> {
    pub fn new(solver_name: impl Into<String>, field_name: impl Into<String>) -> Self {
        Self {
            solver_name: solver_name.into(),
            field_name: field_name.into(),
            initial_residual: S::zero(),
            final_residual: S::zero(),
            n_iterations: 0,
            converged: false,
            singular: false,
        }
    }

    pub fn solver_name(&self) -> &str {
        &self.solver_name
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn initial_residual(&self) -> S {
        self.initial_residual
    }

    pub fn final_residual(&self) -> S {
        self.final_residual
    }

    pub fn n_iterations(&self) -> usize {
        self.n_iterations
    }

    pub fn converged(&self) -> bool {
        self.converged
    }

    pub fn singular(&self) -> bool {
        self.singular
    }

    /// Update the converged flag from the current final residual: absolute
    /// tolerance, or relative reduction against the initial residual when
    /// `rel_tol` is meaningfully above zero.
    pub fn check_convergence(&mut self, tolerance: S, rel_tol: S) -> bool {
        self.converged = self.final_residual < tolerance
            || (rel_tol > S::small() && self.final_residual < rel_tol * self.initial_residual);
        self.converged
    }

    /// Update the singular flag: a normalized denominator below `vsmall`
    /// means the matrix cannot support the update about to be computed.
    pub fn check_singularity(&mut self, residual: S) -> bool {
        self.singular = residual < S::vsmall();
        self.singular
    }
}

impl<S: Scalar> fmt::Display for SolverPerformance<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: Solving for {}, Initial residual = {:e}, Final residual = {:e}, No Iterations {}",
            self.solver_name,
            self.field_name,
            self.initial_residual,
            self.final_residual,
            self.n_iterations
        )
    }
}

/// Accumulated records across outer iterations of a simulation loop.
#[derive(Debug, Clone)]
pub struct SolverPerformanceList<S: Scalar> {
    records: Vec<SolverPerformance<S>>,
}

impl<S: Scalar> Default for SolverPerformanceList<S> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
        }
    }
}

impl<S: Scalar> SolverPerformanceList<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: SolverPerformance<S>) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn first(&self) -> Option<&SolverPerformance<S>> {
        self.records.first()
    }

    pub fn last(&self) -> Option<&SolverPerformance<S>> {
        self.records.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SolverPerformance<S>> {
        self.records.iter()
    }

    /// All accumulated solves converged.
    pub fn all_converged(&self) -> bool {
        self.records.iter().all(|r| r.converged)
    }

    /// Largest initial residual seen, the quantity outer loops watch to
    /// decide whether another outer iteration is needed.
    pub fn max_initial_residual(&self) -> S {
        self.records
            .iter()
            .map(|r| r.initial_residual)
            .fold(S::zero(), |a, b| if b > a { b } else { a })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn convergence_by_absolute_tolerance() {
        let mut p = SolverPerformance::<f64>::new("PCG", "p");
        p.initial_residual = 1.0;
        p.final_residual = 1e-8;
        assert!(p.check_convergence(1e-6, 0.0));
        assert!(p.converged());
    }

    #[test]
    fn convergence_by_relative_reduction() {
        let mut p = SolverPerformance::<f64>::new("PCG", "p");
        p.initial_residual = 100.0;
        p.final_residual = 1e-3;
        // Absolute tolerance not met, relative reduction 1e-5 is.
        assert!(!p.check_convergence(1e-6, 0.0));
        assert!(p.check_convergence(1e-6, 1e-2));
    }

    #[test]
    fn zero_rel_tol_disables_the_relative_check() {
        let mut p = SolverPerformance::<f64>::new("PCG", "p");
        p.initial_residual = 1e30;
        p.final_residual = 1.0;
        assert!(!p.check_convergence(1e-6, 0.0));
    }

    #[test]
    fn singularity_flag_tracks_the_denominator() {
        let mut p = SolverPerformance::<f64>::new("PCG", "p");
        assert!(p.check_singularity(0.0));
        assert!(p.singular());
        assert!(!p.check_singularity(1e-3));
    }

    #[test]
    fn display_line_names_solver_and_field() {
        let mut p = SolverPerformance::<f64>::new("DICPCG", "p");
        p.initial_residual = 0.5;
        p.final_residual = 1e-7;
        p.n_iterations = 12;
        let line = p.to_string();
        assert!(line.starts_with("DICPCG: Solving for p,"));
        assert!(line.ends_with("No Iterations 12"));
    }

    #[test]
    fn list_accumulates_across_outer_iterations() {
        let mut list = SolverPerformanceList::<f64>::new();
        for (init, conv) in [(1.0, true), (0.1, true), (3.0, false)] {
            let mut p = SolverPerformance::new("PCG", "p");
            p.initial_residual = init;
            p.converged = conv;
            list.push(p);
        }
        assert_eq!(list.len(), 3);
        assert!(!list.all_converged());
        assert_eq!(list.max_initial_residual(), 3.0);
        assert_eq!(list.first().map(|r| r.initial_residual()), Some(1.0));
    }
}
