//! Agglomeration multigrid: hierarchy construction, cycling and the
//! multigrid-as-solver entry point.

pub mod agglomeration;
pub mod solver;

pub use agglomeration::{
    agglomerate_matrix, coarsen_addressing, pairwise_agglomerate, prolong_field, restrict_field,
    Agglomeration, FaceTarget, LevelMap,
};
pub use solver::{gamg_solve, GamgSolver};
