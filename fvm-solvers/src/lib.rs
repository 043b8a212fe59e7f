//! Sparse LDU matrices and linear solvers for finite-volume CFD
//!
//! This crate provides the matrix and solver layer of a finite-volume
//! framework: addressing and storage in the face-based LDU format, Krylov
//! and multigrid solvers, preconditioners and relaxation smoothers, with
//! coupled boundaries and distributed runs behind one interface.
//!
//! # Features
//!
//! - **LDU matrices**: owner/neighbour face addressing with upper and
//!   lower coefficient triangles sharing one canonical face order
//! - **Krylov solvers**: PCG and the reduction-fused FPCG for symmetric
//!   systems, PBiCG for asymmetric ones
//! - **Multigrid**: pairwise-agglomerated GAMG, usable as a solver and as
//!   a preconditioner
//! - **Preconditioners**: diagonal, DIC, DILU
//! - **Smoothers**: Gauss-Seidel, symmetric Gauss-Seidel, damped Jacobi
//! - **Coupled boundaries**: cyclic and processor interfaces folded into
//!   every matrix product
//!
//! # Example
//!
//! ```ignore
//! use fvm_solvers::{solve, LduAddressing, LduMatrix, SerialComm, SolverControls};
//! use std::sync::Arc;
//!
//! let addr = Arc::new(LduAddressing::new(n_cells, owner, neighbour, vec![])?);
//! let matrix = LduMatrix::symmetric(addr, diag, face_coeffs);
//!
//! let controls = SolverControls::default();
//! let perf = solve(&matrix, &mut psi, &source, "p", &controls, &SerialComm)?;
//! println!("{perf}");
//! ```

pub mod comm;
pub mod controls;
pub mod dense;
pub mod gamg;
pub mod iterative;
pub mod ldu;
pub mod performance;
pub mod preconditioners;
pub mod registry;
pub mod smoothers;
pub mod traits;

// Re-export the matrix layer
pub use ldu::{
    AddressingError, CyclicInterface, LduAddressing, LduInterface, LduMatrix, ProcessorInterface,
    ScheduleEvent,
};

// Re-export the solver entry points
pub use gamg::{gamg_solve, GamgSolver};
pub use iterative::{fpcg, pbicg, pcg, smooth_solve};
pub use registry::{solve, PreconditionerFactory, SmootherFactory, SolverRegistry};

// Re-export configuration and outcomes
pub use controls::{ControlsError, CycleType, GamgControls, SolverControls, SolverName};
pub use performance::{SolverPerformance, SolverPerformanceList};

// Re-export preconditioners and smoothers
pub use dense::{DenseLu, DenseLuError};
pub use preconditioners::{
    DiagonalPreconditioner, DicPreconditioner, DiluPreconditioner, GamgPreconditioner,
};
pub use smoothers::{GaussSeidelSmoother, JacobiSmoother, SymGaussSeidelSmoother};

// Re-export the communication and trait seams
pub use comm::{Communicator, SerialComm, ThreadComm};
pub use traits::{LduPreconditioner, NonePreconditioner, Scalar, Smoother};
