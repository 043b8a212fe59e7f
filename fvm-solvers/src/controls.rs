//! Solver configuration
//!
//! [`SolverControls`] carries the recognized per-solve options the way a
//! case configuration supplies them: solver selection as a closed enum,
//! preconditioner and smoother as registry-keyed names, tolerances and
//! iteration bounds as plain numbers. All values are `f64` here and
//! converted to the working precision at the point of use.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControlsError {
    #[error("unknown solver \"{name}\": expected one of PCG, FPCG, PBiCG, GAMG, smoothSolver")]
    UnknownSolver { name: String },
    #[error("unknown preconditioner \"{name}\": registered options are {registered}")]
    UnknownPreconditioner { name: String, registered: String },
    #[error("unknown smoother \"{name}\": registered options are {registered}")]
    UnknownSmoother { name: String, registered: String },
    #[error("unknown multigrid cycle \"{name}\": expected V or W")]
    UnknownCycle { name: String },
}

/// The closed set of solver entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolverName {
    #[serde(rename = "PCG")]
    Pcg,
    #[serde(rename = "FPCG")]
    Fpcg,
    #[serde(rename = "PBiCG")]
    PBiCg,
    #[serde(rename = "GAMG")]
    Gamg,
    #[serde(rename = "smoothSolver")]
    SmoothSolver,
}

impl FromStr for SolverName {
    type Err = ControlsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PCG" => Ok(Self::Pcg),
            "FPCG" => Ok(Self::Fpcg),
            "PBiCG" => Ok(Self::PBiCg),
            "GAMG" => Ok(Self::Gamg),
            "smoothSolver" => Ok(Self::SmoothSolver),
            _ => Err(ControlsError::UnknownSolver {
                name: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for SolverName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pcg => "PCG",
            Self::Fpcg => "FPCG",
            Self::PBiCg => "PBiCG",
            Self::Gamg => "GAMG",
            Self::SmoothSolver => "smoothSolver",
        };
        f.write_str(s)
    }
}

/// Multigrid cycle shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CycleType {
    #[default]
    V,
    W,
}

impl FromStr for CycleType {
    type Err = ControlsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "V" => Ok(Self::V),
            "W" => Ok(Self::W),
            _ => Err(ControlsError::UnknownCycle {
                name: s.to_string(),
            }),
        }
    }
}

/// Multigrid-specific options.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GamgControls {
    pub cycle: CycleType,
    pub n_pre_sweeps: usize,
    pub n_post_sweeps: usize,
    pub n_finest_sweeps: usize,
    /// Agglomeration stops once a level has at most this many cells.
    pub n_cells_in_coarsest_level: usize,
    pub max_levels: usize,
    /// LU-factorize and back-substitute on the coarsest level instead of
    /// heavy smoothing. Serial runs only; parallel runs keep smoothing.
    pub direct_solve_coarsest: bool,
}

impl Default for GamgControls {
    fn default() -> Self {
        Self {
            cycle: CycleType::V,
            n_pre_sweeps: 0,
            n_post_sweeps: 2,
            n_finest_sweeps: 2,
            n_cells_in_coarsest_level: 10,
            max_levels: 50,
            direct_solve_coarsest: false,
        }
    }
}

/// Recognized options for one solve call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverControls {
    pub solver: SolverName,
    pub preconditioner: String,
    pub smoother: String,
    pub tolerance: f64,
    pub rel_tol: f64,
    pub max_iterations: usize,
    pub min_iterations: usize,
    /// Smoother sweeps per residual check (smooth solver), and sweeps per
    /// smoothing stage where a solver embeds one.
    pub n_sweeps: usize,
    /// Emit a debug progress line every N iterations; 0 disables.
    pub log_interval: usize,
    pub gamg: GamgControls,
}

impl Default for SolverControls {
    fn default() -> Self {
        Self {
            solver: SolverName::Pcg,
            preconditioner: "none".to_string(),
            smoother: "GaussSeidel".to_string(),
            tolerance: 1e-6,
            rel_tol: 0.0,
            max_iterations: 1000,
            min_iterations: 0,
            n_sweeps: 1,
            log_interval: 0,
            gamg: GamgControls::default(),
        }
    }
}

impl SolverControls {
    /// Reported solver name with the preconditioner prefix, "DICPCG"
    /// style; the "none" preconditioner adds no prefix.
    pub fn qualified_name(&self, base: &str) -> String {
        if self.preconditioner == "none" {
            base.to_string()
        } else {
            format!("{}{}", self.preconditioner, base)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solver_names_parse_and_print() {
        for name in ["PCG", "FPCG", "PBiCG", "GAMG", "smoothSolver"] {
            let parsed: SolverName = name.parse().unwrap();
            assert_eq!(parsed.to_string(), name);
        }
    }

    #[test]
    fn unknown_solver_is_reported_with_alternatives() {
        let err = "CG".parse::<SolverName>().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("unknown solver \"CG\""));
        assert!(msg.contains("smoothSolver"));
    }

    #[test]
    fn cycle_parses() {
        assert_eq!("V".parse::<CycleType>().unwrap(), CycleType::V);
        assert_eq!("W".parse::<CycleType>().unwrap(), CycleType::W);
        assert!("F".parse::<CycleType>().is_err());
    }

    #[test]
    fn defaults_are_usable() {
        let c = SolverControls::default();
        assert_eq!(c.solver, SolverName::Pcg);
        assert_eq!(c.preconditioner, "none");
        assert!(c.tolerance > 0.0);
        assert_eq!(c.rel_tol, 0.0);
        assert!(c.max_iterations > 0);
        assert_eq!(c.min_iterations, 0);
        assert!(!c.gamg.direct_solve_coarsest);
    }

    #[test]
    fn qualified_name_skips_none() {
        let mut c = SolverControls::default();
        assert_eq!(c.qualified_name("PCG"), "PCG");
        c.preconditioner = "DIC".to_string();
        assert_eq!(c.qualified_name("PCG"), "DICPCG");
    }
}
