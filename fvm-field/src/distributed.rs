//! Cross-rank field redistribution
//!
//! When the target layout draws on cells owned by other ranks, mapping is
//! a two-step affair: first gather every needed remote value into a local
//! stacked field, then apply an ordinary [`FieldMapper`] whose indices
//! refer to the stacked layout. [`DistributionMap`] performs the gather;
//! [`DistributedFieldMapper`] bundles the two steps.

use fvm_solvers::{Communicator, Scalar};
use ndarray::Array1;

use crate::mapper::{FieldMapper, MappingError};

/// Per-rank exchange schedule for gathering a stacked field.
///
/// `sub_map[r]` lists the local indices whose values this rank sends to
/// rank `r`; `construct_map[r]` lists the stacked positions where values
/// arriving from rank `r` are placed. The diagonal entries describe the
/// local copy. The schedules on the two sides of an exchange must agree:
/// `sub_map[r]` here pairs element-for-element with `construct_map[me]`
/// on rank `r`.
#[derive(Debug)]
pub struct DistributionMap {
    sub_map: Vec<Vec<usize>>,
    construct_map: Vec<Vec<usize>>,
    constructed_size: usize,
    tag: usize,
}

impl DistributionMap {
    pub fn new(
        sub_map: Vec<Vec<usize>>,
        construct_map: Vec<Vec<usize>>,
        tag: usize,
    ) -> Result<Self, MappingError> {
        if sub_map.len() != construct_map.len() {
            return Err(MappingError::RankCountMismatch {
                sends: sub_map.len(),
                receives: construct_map.len(),
            });
        }
        let constructed_size = construct_map
            .iter()
            .flatten()
            .map(|&pos| pos + 1)
            .max()
            .unwrap_or(0);
        Ok(Self {
            sub_map,
            construct_map,
            constructed_size,
            tag,
        })
    }

    /// Length of the stacked field `distribute` produces.
    pub fn constructed_size(&self) -> usize {
        self.constructed_size
    }

    pub fn sub_map(&self) -> &[Vec<usize>] {
        &self.sub_map
    }

    pub fn construct_map(&self) -> &[Vec<usize>] {
        &self.construct_map
    }

    /// Gather a stacked field from the local field and its remote
    /// counterparts. Every rank sharing the communicator must call this
    /// with its side of the schedule.
    pub fn distribute<S: Scalar>(
        &self,
        local: &Array1<S>,
        comm: &dyn Communicator<S>,
    ) -> Array1<S> {
        assert_eq!(
            self.sub_map.len(),
            comm.size(),
            "DistributionMap: schedule covers {} ranks but the communicator has {}",
            self.sub_map.len(),
            comm.size(),
        );
        let me = comm.rank();
        assert_eq!(
            self.sub_map[me].len(),
            self.construct_map[me].len(),
            "DistributionMap: self entry sends {} values into {} slots",
            self.sub_map[me].len(),
            self.construct_map[me].len(),
        );

        // Sends are buffered, so post them all before any receive.
        for rank in 0..comm.size() {
            if rank == me || self.sub_map[rank].is_empty() {
                continue;
            }
            let payload: Vec<S> = self.sub_map[rank].iter().map(|&i| local[i]).collect();
            comm.send(rank, self.tag, payload);
        }

        let mut stacked = Array1::zeros(self.constructed_size);
        for (&i, &pos) in self.sub_map[me].iter().zip(&self.construct_map[me]) {
            stacked[pos] = local[i];
        }

        for rank in 0..comm.size() {
            if rank == me || self.construct_map[rank].is_empty() {
                continue;
            }
            let payload = comm.recv(rank, self.tag);
            assert_eq!(
                payload.len(),
                self.construct_map[rank].len(),
                "DistributionMap: rank {} sent {} values for {} slots",
                rank,
                payload.len(),
                self.construct_map[rank].len(),
            );
            for (&value, &pos) in payload.iter().zip(&self.construct_map[rank]) {
                stacked[pos] = value;
            }
        }
        stacked
    }
}

/// A field mapper whose sources live on several ranks.
///
/// Gathers the stacked source with a [`DistributionMap`], then maps it
/// with a local [`FieldMapper`] whose indices refer to the stacked
/// layout.
pub struct DistributedFieldMapper {
    distribution: DistributionMap,
    local: FieldMapper,
}

impl DistributedFieldMapper {
    pub fn new(distribution: DistributionMap, local: FieldMapper) -> Self {
        Self {
            distribution,
            local,
        }
    }

    pub fn has_unmapped(&self) -> bool {
        self.local.has_unmapped()
    }

    pub fn map<S: Scalar>(&self, source: &Array1<S>, comm: &dyn Communicator<S>) -> Array1<S> {
        let stacked = self.distribution.distribute(source, comm);
        self.local.map(&stacked)
    }
}
