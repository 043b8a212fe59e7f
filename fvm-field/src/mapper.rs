//! Field mapping between mesh topology states
//!
//! After refinement, redistribution or patch changes, field data has to be
//! carried from the old cell layout to the new one. A [`FieldMapper`]
//! describes that transfer for one target layout: either direct (one
//! source index per target entry, with a sentinel for targets that have no
//! source) or interpolative (several weighted source contributions per
//! target). The two modes are mutually exclusive capability sets; asking a
//! mapper for the other mode's data is a programming error and panics.

use fvm_solvers::Scalar;
use ndarray::Array1;
use thiserror::Error;

/// Sentinel in direct addressing for a target entry with no source.
pub const UNMAPPED: usize = usize::MAX;

#[derive(Debug, Error)]
pub enum MappingError {
    #[error("interpolative mapper: {addresses} address lists against {weights} weight lists")]
    TargetCountMismatch { addresses: usize, weights: usize },
    #[error(
        "interpolative mapper: target {target} has {addresses} addresses but {weights} weights"
    )]
    WeightLengthMismatch {
        target: usize,
        addresses: usize,
        weights: usize,
    },
    #[error("distribution map: {sends} send lists against {receives} receive lists")]
    RankCountMismatch { sends: usize, receives: usize },
}

#[derive(Debug)]
enum MapperMode {
    Direct { addressing: Vec<usize> },
    Interpolative {
        addressing: Vec<Vec<usize>>,
        weights: Vec<Vec<f64>>,
    },
}

/// Transfer description for one target field layout.
#[derive(Debug)]
pub struct FieldMapper {
    mode: MapperMode,
}

impl FieldMapper {
    /// Direct mapper: `target[i] = source[addressing[i]]`, with
    /// [`UNMAPPED`] entries producing zero.
    pub fn direct(addressing: Vec<usize>) -> Self {
        Self {
            mode: MapperMode::Direct { addressing },
        }
    }

    /// Interpolative mapper:
    /// `target[i] = Σ_k weights[i][k] · source[addressing[i][k]]`.
    ///
    /// Address and weight lists must pair up exactly; a target with no
    /// contributions at all is legal and reads as unmapped.
    pub fn interpolative(
        addressing: Vec<Vec<usize>>,
        weights: Vec<Vec<f64>>,
    ) -> Result<Self, MappingError> {
        if addressing.len() != weights.len() {
            return Err(MappingError::TargetCountMismatch {
                addresses: addressing.len(),
                weights: weights.len(),
            });
        }
        for (target, (a, w)) in addressing.iter().zip(&weights).enumerate() {
            if a.len() != w.len() {
                return Err(MappingError::WeightLengthMismatch {
                    target,
                    addresses: a.len(),
                    weights: w.len(),
                });
            }
        }
        Ok(Self {
            mode: MapperMode::Interpolative { addressing, weights },
        })
    }

    pub fn target_size(&self) -> usize {
        match &self.mode {
            MapperMode::Direct { addressing } => addressing.len(),
            MapperMode::Interpolative { addressing, .. } => addressing.len(),
        }
    }

    pub fn is_direct(&self) -> bool {
        matches!(self.mode, MapperMode::Direct { .. })
    }

    /// Whether any target entry has no source contribution. Callers that
    /// need fully populated output must consult this before trusting the
    /// mapped field.
    pub fn has_unmapped(&self) -> bool {
        match &self.mode {
            MapperMode::Direct { addressing } => addressing.iter().any(|&a| a == UNMAPPED),
            MapperMode::Interpolative { addressing, .. } => {
                addressing.iter().any(|a| a.is_empty())
            }
        }
    }

    /// The one-to-one source indices of a direct mapper.
    pub fn direct_addressing(&self) -> &[usize] {
        match &self.mode {
            MapperMode::Direct { addressing } => addressing,
            MapperMode::Interpolative { .. } => {
                panic!("FieldMapper: direct addressing requested from an interpolative mapper")
            }
        }
    }

    /// The per-target source index lists of an interpolative mapper.
    pub fn addressing(&self) -> &[Vec<usize>] {
        match &self.mode {
            MapperMode::Interpolative { addressing, .. } => addressing,
            MapperMode::Direct { .. } => {
                panic!("FieldMapper: addressing requested from a direct mapper")
            }
        }
    }

    /// The per-target weight lists of an interpolative mapper.
    pub fn weights(&self) -> &[Vec<f64>] {
        match &self.mode {
            MapperMode::Interpolative { weights, .. } => weights,
            MapperMode::Direct { .. } => {
                panic!("FieldMapper: weights requested from a direct mapper")
            }
        }
    }

    /// Carry a source field onto the target layout. Pure: the same source
    /// always produces the same output.
    pub fn map<S: Scalar>(&self, source: &Array1<S>) -> Array1<S> {
        match &self.mode {
            MapperMode::Direct { addressing } => Array1::from_shape_fn(addressing.len(), |i| {
                let a = addressing[i];
                if a == UNMAPPED {
                    S::zero()
                } else {
                    source[a]
                }
            }),
            MapperMode::Interpolative { addressing, weights } => {
                let mut out = Array1::zeros(addressing.len());
                for i in 0..addressing.len() {
                    let mut v = S::zero();
                    for (&a, &w) in addressing[i].iter().zip(&weights[i]) {
                        v += S::from_config(w) * source[a];
                    }
                    out[i] = v;
                }
                out
            }
        }
    }
}
