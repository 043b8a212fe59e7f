//! Name-keyed construction of preconditioners and smoothers
//!
//! [`SolverRegistry`] maps the names a [`SolverControls`] carries to
//! factory functions, pre-loaded with every built-in and open to user
//! additions through [`register_preconditioner`] and [`register_smoother`].
//! [`SolverRegistry::solve`] is the configuration-driven entry point: it
//! dispatches on the solver name and builds whatever the chosen solver
//! needs from the registered factories.
//!
//! [`register_preconditioner`]: SolverRegistry::register_preconditioner
//! [`register_smoother`]: SolverRegistry::register_smoother

use std::collections::BTreeMap;

use ndarray::Array1;

use crate::comm::Communicator;
use crate::controls::{ControlsError, SolverControls, SolverName};
use crate::gamg::gamg_solve;
use crate::iterative::{fpcg, pbicg, pcg, smooth_solve};
use crate::ldu::LduMatrix;
use crate::performance::SolverPerformance;
use crate::preconditioners::{
    DiagonalPreconditioner, DicPreconditioner, DiluPreconditioner, GamgPreconditioner,
};
use crate::smoothers::{GaussSeidelSmoother, JacobiSmoother, SymGaussSeidelSmoother};
use crate::traits::{LduPreconditioner, NonePreconditioner, Scalar, Smoother};

/// Builds a preconditioner bound to the lifetime of the matrix it is
/// given. The registry itself is passed through so composite
/// preconditioners can build their own parts by name.
pub type PreconditionerFactory<S> = for<'m> fn(
    &'m LduMatrix<S>,
    &SolverControls,
    &SolverRegistry<S>,
    &dyn Communicator<S>,
) -> Result<Box<dyn LduPreconditioner<S> + 'm>, ControlsError>;

pub type SmootherFactory<S> = fn(&SolverControls) -> Box<dyn Smoother<S>>;

pub struct SolverRegistry<S: Scalar> {
    preconditioners: BTreeMap<String, PreconditionerFactory<S>>,
    smoothers: BTreeMap<String, SmootherFactory<S>>,
}

impl<S: Scalar> Default for SolverRegistry<S> {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register_preconditioner("none", build_none);
        registry.register_preconditioner("diagonal", build_diagonal);
        registry.register_preconditioner("DIC", build_dic);
        registry.register_preconditioner("DILU", build_dilu);
        registry.register_preconditioner("GAMG", build_gamg);
        registry.register_smoother("GaussSeidel", build_gauss_seidel);
        registry.register_smoother("symGaussSeidel", build_sym_gauss_seidel);
        registry.register_smoother("Jacobi", build_jacobi);
        registry
    }
}

impl<S: Scalar> SolverRegistry<S> {
    /// A registry with nothing in it; [`Default`] gives the built-ins.
    pub fn empty() -> Self {
        Self {
            preconditioners: BTreeMap::new(),
            smoothers: BTreeMap::new(),
        }
    }

    /// Add or replace a preconditioner under `name`.
    pub fn register_preconditioner(
        &mut self,
        name: impl Into<String>,
        factory: PreconditionerFactory<S>,
    ) {
        self.preconditioners.insert(name.into(), factory);
    }

    /// Add or replace a smoother under `name`.
    pub fn register_smoother(&mut self, name: impl Into<String>, factory: SmootherFactory<S>) {
        self.smoothers.insert(name.into(), factory);
    }

    /// Build the preconditioner `controls.preconditioner` names.
    pub fn build_preconditioner<'m>(
        &self,
        matrix: &'m LduMatrix<S>,
        controls: &SolverControls,
        comm: &dyn Communicator<S>,
    ) -> Result<Box<dyn LduPreconditioner<S> + 'm>, ControlsError> {
        match self.preconditioners.get(&controls.preconditioner) {
            Some(factory) => factory(matrix, controls, self, comm),
            None => Err(ControlsError::UnknownPreconditioner {
                name: controls.preconditioner.clone(),
                registered: self.registered(&self.preconditioners),
            }),
        }
    }

    /// Build the smoother `controls.smoother` names.
    pub fn build_smoother(
        &self,
        controls: &SolverControls,
    ) -> Result<Box<dyn Smoother<S>>, ControlsError> {
        match self.smoothers.get(&controls.smoother) {
            Some(factory) => Ok(factory(controls)),
            None => Err(ControlsError::UnknownSmoother {
                name: controls.smoother.clone(),
                registered: self.registered(&self.smoothers),
            }),
        }
    }

    /// Run the solver the controls select.
    pub fn solve(
        &self,
        matrix: &LduMatrix<S>,
        psi: &mut Array1<S>,
        source: &Array1<S>,
        field_name: &str,
        controls: &SolverControls,
        comm: &dyn Communicator<S>,
    ) -> Result<SolverPerformance<S>, ControlsError> {
        match controls.solver {
            SolverName::Pcg => {
                let precon = self.build_preconditioner(matrix, controls, comm)?;
                Ok(pcg(
                    matrix,
                    psi,
                    source,
                    field_name,
                    controls,
                    precon.as_ref(),
                    comm,
                ))
            }
            SolverName::Fpcg => {
                let precon = self.build_preconditioner(matrix, controls, comm)?;
                Ok(fpcg(
                    matrix,
                    psi,
                    source,
                    field_name,
                    controls,
                    precon.as_ref(),
                    comm,
                ))
            }
            SolverName::PBiCg => {
                let precon = self.build_preconditioner(matrix, controls, comm)?;
                Ok(pbicg(
                    matrix,
                    psi,
                    source,
                    field_name,
                    controls,
                    precon.as_ref(),
                    comm,
                ))
            }
            SolverName::Gamg => {
                let smoother = self.build_smoother(controls)?;
                Ok(gamg_solve(
                    matrix, psi, source, field_name, controls, smoother, comm,
                ))
            }
            SolverName::SmoothSolver => {
                let smoother = self.build_smoother(controls)?;
                Ok(smooth_solve(
                    matrix,
                    psi,
                    source,
                    field_name,
                    controls,
                    smoother.as_ref(),
                    comm,
                ))
            }
        }
    }

    fn registered<V>(&self, table: &BTreeMap<String, V>) -> String {
        table.keys().cloned().collect::<Vec<_>>().join(", ")
    }
}

/// One-shot solve against the default registry.
pub fn solve<S: Scalar>(
    matrix: &LduMatrix<S>,
    psi: &mut Array1<S>,
    source: &Array1<S>,
    field_name: &str,
    controls: &SolverControls,
    comm: &dyn Communicator<S>,
) -> Result<SolverPerformance<S>, ControlsError> {
    SolverRegistry::default().solve(matrix, psi, source, field_name, controls, comm)
}

fn build_none<'m, S: Scalar>(
    _matrix: &'m LduMatrix<S>,
    _controls: &SolverControls,
    _registry: &SolverRegistry<S>,
    _comm: &dyn Communicator<S>,
) -> Result<Box<dyn LduPreconditioner<S> + 'm>, ControlsError> {
    Ok(Box::new(NonePreconditioner))
}

fn build_diagonal<'m, S: Scalar>(
    matrix: &'m LduMatrix<S>,
    _controls: &SolverControls,
    _registry: &SolverRegistry<S>,
    _comm: &dyn Communicator<S>,
) -> Result<Box<dyn LduPreconditioner<S> + 'm>, ControlsError> {
    Ok(Box::new(DiagonalPreconditioner::new(matrix)))
}

fn build_dic<'m, S: Scalar>(
    matrix: &'m LduMatrix<S>,
    _controls: &SolverControls,
    _registry: &SolverRegistry<S>,
    _comm: &dyn Communicator<S>,
) -> Result<Box<dyn LduPreconditioner<S> + 'm>, ControlsError> {
    Ok(Box::new(DicPreconditioner::new(matrix)))
}

fn build_dilu<'m, S: Scalar>(
    matrix: &'m LduMatrix<S>,
    _controls: &SolverControls,
    _registry: &SolverRegistry<S>,
    _comm: &dyn Communicator<S>,
) -> Result<Box<dyn LduPreconditioner<S> + 'm>, ControlsError> {
    Ok(Box::new(DiluPreconditioner::new(matrix)))
}

fn build_gamg<'m, S: Scalar>(
    matrix: &'m LduMatrix<S>,
    controls: &SolverControls,
    registry: &SolverRegistry<S>,
    comm: &dyn Communicator<S>,
) -> Result<Box<dyn LduPreconditioner<S> + 'm>, ControlsError> {
    let smoother = registry.build_smoother(controls)?;
    Ok(Box::new(GamgPreconditioner::new(
        matrix, controls, smoother, comm,
    )))
}

fn build_gauss_seidel<S: Scalar>(_controls: &SolverControls) -> Box<dyn Smoother<S>> {
    Box::new(GaussSeidelSmoother)
}

fn build_sym_gauss_seidel<S: Scalar>(_controls: &SolverControls) -> Box<dyn Smoother<S>> {
    Box::new(SymGaussSeidelSmoother)
}

fn build_jacobi<S: Scalar>(_controls: &SolverControls) -> Box<dyn Smoother<S>> {
    Box::new(JacobiSmoother::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::SerialComm;
    use crate::ldu::LduAddressing;
    use approx::assert_relative_eq;
    use std::sync::Arc;

    fn poisson_chain(n: usize) -> LduMatrix<f64> {
        let owner: Vec<usize> = (0..n - 1).collect();
        let neighbour: Vec<usize> = (1..n).collect();
        let addr = Arc::new(LduAddressing::new(n, owner, neighbour, vec![]).unwrap());
        let mut diag = vec![2.0; n];
        diag[0] = 3.0;
        diag[n - 1] = 3.0;
        LduMatrix::symmetric(addr, diag, vec![-1.0; n - 1])
    }

    #[test]
    fn every_builtin_preconditioner_builds() {
        let matrix = poisson_chain(12);
        let comm = SerialComm;
        let registry = SolverRegistry::default();

        for name in ["none", "diagonal", "DIC", "GAMG"] {
            let controls = SolverControls {
                preconditioner: name.to_string(),
                ..SolverControls::default()
            };
            let precon = registry
                .build_preconditioner(&matrix, &controls, &comm)
                .unwrap();
            assert_eq!(precon.name(), name);
        }

        let addr = Arc::new(LduAddressing::new(2, vec![0], vec![1], vec![]).unwrap());
        let asymmetric = LduMatrix::asymmetric(addr, vec![2.0, 2.0], vec![-0.5], vec![-1.0]);
        let controls = SolverControls {
            preconditioner: "DILU".to_string(),
            ..SolverControls::default()
        };
        let precon = registry
            .build_preconditioner(&asymmetric, &controls, &comm)
            .unwrap();
        assert_eq!(precon.name(), "DILU");
    }

    #[test]
    fn every_builtin_smoother_builds() {
        let registry = SolverRegistry::<f64>::default();
        for name in ["GaussSeidel", "symGaussSeidel", "Jacobi"] {
            let controls = SolverControls {
                smoother: name.to_string(),
                ..SolverControls::default()
            };
            let smoother = registry.build_smoother(&controls).unwrap();
            assert_eq!(smoother.name(), name);
        }
    }

    #[test]
    fn unknown_names_list_the_registered_options() {
        let matrix = poisson_chain(4);
        let comm = SerialComm;
        let registry = SolverRegistry::default();

        let controls = SolverControls {
            preconditioner: "ILU".to_string(),
            ..SolverControls::default()
        };
        let err = registry
            .build_preconditioner(&matrix, &controls, &comm)
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("unknown preconditioner \"ILU\""));
        assert!(msg.contains("DIC"));
        assert!(msg.contains("none"));

        let controls = SolverControls {
            smoother: "SOR".to_string(),
            ..SolverControls::default()
        };
        let err = registry.build_smoother(&controls).unwrap_err();
        assert!(err.to_string().contains("symGaussSeidel"));
    }

    #[test]
    fn solve_dispatches_on_the_solver_name() {
        let n = 16;
        let matrix = poisson_chain(n);
        let comm = SerialComm;
        let source = Array1::from_elem(n, 1.0);

        for solver in [SolverName::Pcg, SolverName::Fpcg, SolverName::Gamg] {
            let controls = SolverControls {
                solver,
                tolerance: 1e-9,
                ..SolverControls::default()
            };
            let mut psi = Array1::zeros(n);
            let perf = solve(&matrix, &mut psi, &source, "p", &controls, &comm).unwrap();
            assert!(perf.converged(), "{solver:?} did not converge");
        }

        let controls = SolverControls {
            solver: SolverName::SmoothSolver,
            tolerance: 1e-6,
            max_iterations: 10_000,
            ..SolverControls::default()
        };
        let mut psi = Array1::zeros(n);
        let perf = solve(&matrix, &mut psi, &source, "p", &controls, &comm).unwrap();
        assert!(perf.converged());
    }

    #[test]
    fn user_registrations_take_part_in_solves() {
        fn build_plain_diagonal<'m>(
            matrix: &'m LduMatrix<f64>,
            _controls: &SolverControls,
            _registry: &SolverRegistry<f64>,
            _comm: &dyn Communicator<f64>,
        ) -> Result<Box<dyn LduPreconditioner<f64> + 'm>, ControlsError> {
            Ok(Box::new(DiagonalPreconditioner::new(matrix)))
        }

        let mut registry = SolverRegistry::default();
        registry.register_preconditioner("myDiagonal", build_plain_diagonal);

        let n = 10;
        let matrix = poisson_chain(n);
        let comm = SerialComm;
        let source = Array1::from_elem(n, 1.0);
        let controls = SolverControls {
            preconditioner: "myDiagonal".to_string(),
            tolerance: 1e-9,
            ..SolverControls::default()
        };

        let mut psi = Array1::zeros(n);
        let perf = registry
            .solve(&matrix, &mut psi, &source, "p", &controls, &comm)
            .unwrap();
        assert!(perf.converged());

        let r = matrix.residual(&psi, &source, &comm);
        assert_relative_eq!(crate::comm::sum_mag(&r), 0.0, epsilon = 1e-6);
    }
}
