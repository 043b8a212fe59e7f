//! Pairwise agglomeration and level transfer
//!
//! One coarsening pass pairs each ungrouped cell with the ungrouped
//! neighbour across its heaviest face; cells left over join their
//! heaviest neighbouring cluster, and cells with no couplings at all
//! become their own coarse cell. Visitation is in ascending cell order and
//! equal-weight candidates resolve to the lowest face index, so the
//! grouping is reproducible run to run.
//!
//! The rest of the module turns a grouping into a coarse level: merged
//! addressing, the per-face restriction targets, the Galerkin coefficient
//! sum, and the field transfer operations the cycle uses.

use crate::ldu::{LduAddressing, LduMatrix};
use crate::traits::Scalar;
use ndarray::Array1;
use std::collections::BTreeMap;
use std::sync::Arc;

const UNGROUPED: usize = usize::MAX;

/// Fine-to-coarse cell grouping produced by one pairing pass.
#[derive(Debug, Clone)]
pub struct Agglomeration {
    pub cell_map: Vec<usize>,
    pub n_coarse: usize,
}

/// Where a fine face's coefficients land on the coarse level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaceTarget {
    /// The face survives as coarse face `index`; `flipped` when the fine
    /// owner's group is the coarse neighbour.
    Face { index: usize, flipped: bool },
    /// Both cells agglomerate together; the coefficients fold into the
    /// coarse diagonal of `cell`.
    Diagonal { cell: usize },
}

/// One level's worth of transfer data: the cell grouping, the coarse
/// addressing and the per-fine-face restriction targets.
#[derive(Debug, Clone)]
pub struct LevelMap {
    pub cell_map: Vec<usize>,
    pub n_coarse: usize,
    pub face_map: Vec<FaceTarget>,
    pub addr: Arc<LduAddressing>,
}

/// Pair cells across their heaviest faces.
pub fn pairwise_agglomerate<S: Scalar>(addr: &LduAddressing, weights: &[S]) -> Agglomeration {
    assert_eq!(
        weights.len(),
        addr.n_faces(),
        "pairwise_agglomerate: one weight per internal face required"
    );

    let n = addr.n_cells();
    let l = addr.lower_addr();
    let u = addr.upper_addr();
    let own_start = addr.owner_start();
    let losort = addr.losort_addr();
    let losort_start = addr.losort_start();

    let mut cell_map = vec![UNGROUPED; n];
    let mut n_coarse = 0usize;

    for cell in 0..n {
        if cell_map[cell] != UNGROUPED {
            continue;
        }

        let faces_of_cell = (own_start[cell]..own_start[cell + 1])
            .chain((losort_start[cell]..losort_start[cell + 1]).map(|k| losort[k]));

        // Strongest face to a still-ungrouped neighbour; on equal weight
        // the lowest face index wins.
        let mut match_face = UNGROUPED;
        let mut max_weight = -S::great();
        for f in faces_of_cell.clone() {
            let other = l[f] + u[f] - cell;
            if cell_map[other] != UNGROUPED {
                continue;
            }
            let w = weights[f];
            if w > max_weight || (w == max_weight && f < match_face) {
                max_weight = w;
                match_face = f;
            }
        }

        if match_face != UNGROUPED {
            let other = l[match_face] + u[match_face] - cell;
            cell_map[cell] = n_coarse;
            cell_map[other] = n_coarse;
            n_coarse += 1;
        } else {
            // Every neighbour is grouped already; join the strongest
            // neighbouring cluster.
            let mut cluster_face = UNGROUPED;
            let mut cluster_weight = -S::great();
            for f in faces_of_cell {
                let w = weights[f];
                if w > cluster_weight || (w == cluster_weight && f < cluster_face) {
                    cluster_weight = w;
                    cluster_face = f;
                }
            }
            if cluster_face != UNGROUPED {
                let other = l[cluster_face] + u[cluster_face] - cell;
                cell_map[cell] = cell_map[other];
            }
        }
    }

    // Cells with no couplings become their own coarse cell.
    for group in cell_map.iter_mut() {
        if *group == UNGROUPED {
            *group = n_coarse;
            n_coarse += 1;
        }
    }

    Agglomeration { cell_map, n_coarse }
}

/// Merge fine addressing under a grouping: faces between distinct groups
/// combine into coarse faces, faces internal to a group fold into the
/// diagonal, and patch addressing maps through the cell map face by face.
pub fn coarsen_addressing(fine: &LduAddressing, aggl: &Agglomeration) -> LevelMap {
    let l = fine.lower_addr();
    let u = fine.upper_addr();

    // Coarse faces numbered in owner-major order of their cell pairs.
    let mut pairs: BTreeMap<(usize, usize), usize> = BTreeMap::new();
    for f in 0..fine.n_faces() {
        let cl = aggl.cell_map[l[f]];
        let cu = aggl.cell_map[u[f]];
        if cl != cu {
            let key = if cl < cu { (cl, cu) } else { (cu, cl) };
            pairs.entry(key).or_insert(0);
        }
    }
    for (index, slot) in pairs.values_mut().enumerate() {
        *slot = index;
    }

    let mut face_map = Vec::with_capacity(fine.n_faces());
    for f in 0..fine.n_faces() {
        let cl = aggl.cell_map[l[f]];
        let cu = aggl.cell_map[u[f]];
        if cl == cu {
            face_map.push(FaceTarget::Diagonal { cell: cl });
        } else {
            let flipped = cl > cu;
            let key = if flipped { (cu, cl) } else { (cl, cu) };
            face_map.push(FaceTarget::Face {
                index: pairs[&key],
                flipped,
            });
        }
    }

    let mut coarse_lower = vec![0usize; pairs.len()];
    let mut coarse_upper = vec![0usize; pairs.len()];
    for (&(lo, hi), &index) in &pairs {
        coarse_lower[index] = lo;
        coarse_upper[index] = hi;
    }

    let coarse_patch: Vec<Vec<usize>> = (0..fine.n_patches())
        .map(|p| {
            fine.patch_addr(p)
                .iter()
                .map(|&c| aggl.cell_map[c])
                .collect()
        })
        .collect();

    let addr = LduAddressing::with_schedule(
        aggl.n_coarse,
        coarse_lower,
        coarse_upper,
        coarse_patch,
        fine.schedule().to_vec(),
    )
    .expect("merged addressing arrays are consistent by construction");

    LevelMap {
        cell_map: aggl.cell_map.clone(),
        n_coarse: aggl.n_coarse,
        face_map,
        addr: Arc::new(addr),
    }
}

/// Galerkin coefficient restriction: sum fine coefficients onto their
/// coarse targets. Interfaces carry over one boundary face at a time with
/// their coupling restricted through the cell map.
pub fn agglomerate_matrix<S: Scalar>(fine: &LduMatrix<S>, level: &LevelMap) -> LduMatrix<S> {
    let n_coarse_faces = level.addr.n_faces();
    let mut diag = vec![S::zero(); level.n_coarse];
    for (c, &d) in fine.diag().iter().enumerate() {
        diag[level.cell_map[c]] += d;
    }

    let mut coarse = if fine.is_symmetric() {
        let mut upper = vec![S::zero(); n_coarse_faces];
        for (f, &target) in level.face_map.iter().enumerate() {
            match target {
                FaceTarget::Diagonal { cell } => {
                    diag[cell] += fine.lower()[f] + fine.upper()[f];
                }
                FaceTarget::Face { index, .. } => {
                    upper[index] += fine.upper()[f];
                }
            }
        }
        LduMatrix::symmetric(Arc::clone(&level.addr), diag, upper)
    } else {
        let mut lower = vec![S::zero(); n_coarse_faces];
        let mut upper = vec![S::zero(); n_coarse_faces];
        for (f, &target) in level.face_map.iter().enumerate() {
            match target {
                FaceTarget::Diagonal { cell } => {
                    diag[cell] += fine.lower()[f] + fine.upper()[f];
                }
                FaceTarget::Face { index, flipped } => {
                    if flipped {
                        lower[index] += fine.upper()[f];
                        upper[index] += fine.lower()[f];
                    } else {
                        lower[index] += fine.lower()[f];
                        upper[index] += fine.upper()[f];
                    }
                }
            }
        }
        LduMatrix::asymmetric(Arc::clone(&level.addr), diag, lower, upper)
    };

    for patch in 0..fine.addressing().n_patches() {
        if let Some(iface) = fine.interface(patch) {
            coarse.set_interface(
                patch,
                iface.coupling.restrict(&level.cell_map),
                iface.int_coeffs.clone(),
                iface.bou_coeffs.clone(),
            );
        }
    }
    coarse
}

/// Sum fine values into their coarse cells.
pub fn restrict_field<S: Scalar>(coarse: &mut Array1<S>, fine: &Array1<S>, cell_map: &[usize]) {
    coarse.fill(S::zero());
    for (c, &v) in fine.iter().enumerate() {
        coarse[cell_map[c]] += v;
    }
}

/// Inject coarse values into their fine cells.
pub fn prolong_field<S: Scalar>(fine: &mut Array1<S>, coarse: &Array1<S>, cell_map: &[usize]) {
    for (c, v) in fine.iter_mut().enumerate() {
        *v = coarse[cell_map[c]];
    }
}
