//! Sparse addressing for face-based matrices
//!
//! [`LduAddressing`] describes the non-zero pattern of a matrix arising from
//! a mesh's face-cell connectivity: one owner/neighbour cell pair per
//! internal face, one cell per boundary face of each patch, and the schedule
//! in which coupled patches are evaluated.
//!
//! Construction normalizes faces into canonical upper-triangular order
//! (owner index below neighbour index, faces sorted owner-major) and derives
//! the secondary orderings the factorization sweeps rely on. After
//! construction the addressing is immutable until a topology change replaces
//! it wholesale.

use thiserror::Error;

/// Errors raised when externally assembled addressing arrays are malformed.
#[derive(Debug, Error)]
pub enum AddressingError {
    #[error("owner and neighbour arrays differ in length: {owner} vs {neighbour}")]
    FaceCountMismatch { owner: usize, neighbour: usize },
    #[error("face {face} references cell {cell} but the mesh has {n_cells} cells")]
    CellOutOfRange {
        face: usize,
        cell: usize,
        n_cells: usize,
    },
    #[error("face {face} couples cell {cell} to itself")]
    SelfCoupling { face: usize, cell: usize },
    #[error("patch {patch} face {face} references cell {cell} but the mesh has {n_cells} cells")]
    PatchCellOutOfRange {
        patch: usize,
        face: usize,
        cell: usize,
        n_cells: usize,
    },
    #[error("evaluation schedule must initialise patch {patch} exactly once before updating it")]
    InvalidSchedule { patch: usize },
}

/// One entry of the coupled-boundary evaluation schedule.
///
/// `init == true` starts the patch's exchange (non-blocking send);
/// `init == false` completes it (blocking receive plus coefficient update).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleEvent {
    pub patch: usize,
    pub init: bool,
}

/// Non-zero pattern of an LDU matrix: internal-face cell pairs, per-patch
/// boundary addressing and the coupled-patch evaluation schedule.
#[derive(Debug, Clone)]
pub struct LduAddressing {
    n_cells: usize,
    lower: Vec<usize>,
    upper: Vec<usize>,
    patch_addr: Vec<Vec<usize>>,
    schedule: Vec<ScheduleEvent>,
    // Canonical order s holds assembly face face_order[s]; face_flipped[s]
    // records whether owner and neighbour swapped during normalization.
    face_order: Vec<usize>,
    face_flipped: Vec<bool>,
    losort: Vec<usize>,
    owner_start: Vec<usize>,
    losort_start: Vec<usize>,
}

impl LduAddressing {
    /// Build addressing from raw assembly arrays with the default schedule
    /// (initialise every patch in index order, then update every patch in
    /// index order).
    pub fn new(
        n_cells: usize,
        owner: Vec<usize>,
        neighbour: Vec<usize>,
        patch_addr: Vec<Vec<usize>>,
    ) -> Result<Self, AddressingError> {
        let n_patches = patch_addr.len();
        let mut schedule = Vec::with_capacity(2 * n_patches);
        for patch in 0..n_patches {
            schedule.push(ScheduleEvent { patch, init: true });
        }
        for patch in 0..n_patches {
            schedule.push(ScheduleEvent { patch, init: false });
        }
        Self::with_schedule(n_cells, owner, neighbour, patch_addr, schedule)
    }

    /// Build addressing with an explicit evaluation schedule.
    pub fn with_schedule(
        n_cells: usize,
        owner: Vec<usize>,
        neighbour: Vec<usize>,
        patch_addr: Vec<Vec<usize>>,
        schedule: Vec<ScheduleEvent>,
    ) -> Result<Self, AddressingError> {
        if owner.len() != neighbour.len() {
            return Err(AddressingError::FaceCountMismatch {
                owner: owner.len(),
                neighbour: neighbour.len(),
            });
        }
        let n_faces = owner.len();

        for face in 0..n_faces {
            for cell in [owner[face], neighbour[face]] {
                if cell >= n_cells {
                    return Err(AddressingError::CellOutOfRange {
                        face,
                        cell,
                        n_cells,
                    });
                }
            }
            if owner[face] == neighbour[face] {
                return Err(AddressingError::SelfCoupling {
                    face,
                    cell: owner[face],
                });
            }
        }

        for (patch, addr) in patch_addr.iter().enumerate() {
            for (face, &cell) in addr.iter().enumerate() {
                if cell >= n_cells {
                    return Err(AddressingError::PatchCellOutOfRange {
                        patch,
                        face,
                        cell,
                        n_cells,
                    });
                }
            }
        }

        Self::validate_schedule(&schedule, patch_addr.len())?;

        // Canonical orientation, then owner-major face order with the
        // assembly index as a stable tie-break.
        let mut face_order: Vec<usize> = (0..n_faces).collect();
        let key = |f: usize| {
            let (lo, hi) = if owner[f] < neighbour[f] {
                (owner[f], neighbour[f])
            } else {
                (neighbour[f], owner[f])
            };
            (lo, hi, f)
        };
        face_order.sort_by_key(|&f| key(f));

        let mut lower = Vec::with_capacity(n_faces);
        let mut upper = Vec::with_capacity(n_faces);
        let mut face_flipped = Vec::with_capacity(n_faces);
        for &f in &face_order {
            let flipped = owner[f] > neighbour[f];
            let (lo, hi) = if flipped {
                (neighbour[f], owner[f])
            } else {
                (owner[f], neighbour[f])
            };
            lower.push(lo);
            upper.push(hi);
            face_flipped.push(flipped);
        }

        let owner_start = start_offsets(&lower, n_cells);

        let mut losort: Vec<usize> = (0..n_faces).collect();
        losort.sort_by_key(|&s| (upper[s], s));
        let upper_of_losort: Vec<usize> = losort.iter().map(|&s| upper[s]).collect();
        let losort_start = start_offsets(&upper_of_losort, n_cells);

        Ok(Self {
            n_cells,
            lower,
            upper,
            patch_addr,
            schedule,
            face_order,
            face_flipped,
            losort,
            owner_start,
            losort_start,
        })
    }

    fn validate_schedule(
        schedule: &[ScheduleEvent],
        n_patches: usize,
    ) -> Result<(), AddressingError> {
        for patch in 0..n_patches {
            let init_pos = schedule.iter().position(|e| e.patch == patch && e.init);
            let update_pos = schedule.iter().position(|e| e.patch == patch && !e.init);
            let init_count = schedule.iter().filter(|e| e.patch == patch && e.init).count();
            let update_count = schedule
                .iter()
                .filter(|e| e.patch == patch && !e.init)
                .count();
            match (init_pos, update_pos) {
                (Some(i), Some(u)) if i < u && init_count == 1 && update_count == 1 => {}
                _ => return Err(AddressingError::InvalidSchedule { patch }),
            }
        }
        if schedule.iter().any(|e| e.patch >= n_patches) {
            let patch = schedule
                .iter()
                .map(|e| e.patch)
                .find(|&p| p >= n_patches)
                .unwrap_or(n_patches);
            return Err(AddressingError::InvalidSchedule { patch });
        }
        Ok(())
    }

    pub fn n_cells(&self) -> usize {
        self.n_cells
    }

    pub fn n_faces(&self) -> usize {
        self.lower.len()
    }

    pub fn n_patches(&self) -> usize {
        self.patch_addr.len()
    }

    /// Owner cell per internal face, canonical order.
    pub fn lower_addr(&self) -> &[usize] {
        &self.lower
    }

    /// Neighbour cell per internal face, canonical order.
    pub fn upper_addr(&self) -> &[usize] {
        &self.upper
    }

    /// Cell adjacent to each boundary face of `patch`.
    ///
    /// Out-of-range patch access is a programming error and aborts.
    pub fn patch_addr(&self, patch: usize) -> &[usize] {
        assert!(
            patch < self.patch_addr.len(),
            "LduAddressing: patch index {} out of range ({} patches)",
            patch,
            self.patch_addr.len()
        );
        &self.patch_addr[patch]
    }

    /// Coupled-patch evaluation schedule.
    pub fn schedule(&self) -> &[ScheduleEvent] {
        &self.schedule
    }

    /// Face indices reordered by ascending neighbour cell (row-major
    /// traversal of the lower triangle).
    pub fn losort_addr(&self) -> &[usize] {
        &self.losort
    }

    /// Start offsets into the canonical face list per owner cell;
    /// `owner_start()[c]..owner_start()[c + 1]` are the faces owned by `c`.
    pub fn owner_start(&self) -> &[usize] {
        &self.owner_start
    }

    /// Start offsets into `losort_addr()` per neighbour cell.
    pub fn losort_start(&self) -> &[usize] {
        &self.losort_start
    }

    /// Assembly face index stored at each canonical position.
    pub fn face_order(&self) -> &[usize] {
        &self.face_order
    }

    /// Whether normalization swapped owner and neighbour at each canonical
    /// position; coefficient arrays given in assembly order must swap their
    /// lower/upper entries for these faces.
    pub fn face_flipped(&self) -> &[bool] {
        &self.face_flipped
    }
}

fn start_offsets(sorted_cells: &[usize], n_cells: usize) -> Vec<usize> {
    let mut starts = vec![0usize; n_cells + 1];
    for &c in sorted_cells {
        starts[c + 1] += 1;
    }
    for c in 0..n_cells {
        starts[c + 1] += starts[c];
    }
    starts
}
