//! LDU sparse matrix
//!
//! [`LduMatrix`] stores one diagonal coefficient per cell and one lower and
//! upper coefficient per internal face of its [`LduAddressing`], plus the
//! per-patch interface coefficient pairs for coupled boundaries. Symmetric
//! matrices store the upper array once; `lower()` then aliases it.
//!
//! Operations are pure transforms over existing storage: `amul`/`tmul`
//! (matrix-vector products), `residual`, `sum_a` (row sums), and the
//! normalization factor shared by every solver's convergence checks.
//! Coupled-boundary contributions run through the two-phase interface
//! protocol in schedule order, overlapping communication with the local
//! face loop.

use crate::comm::{gaverage, Communicator};
use crate::ldu::interfaces::LduInterface;
use crate::ldu::LduAddressing;
use crate::traits::Scalar;
use ndarray::{Array1, Array2};
use std::sync::Arc;

#[cfg(feature = "rayon")]
const RAYON_MIN_LEN: usize = 1024;

/// Which of a patch's coefficient arrays an interface update applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CoeffSide {
    Boundary,
    Internal,
}

/// Coupled-patch state attached to a matrix: the coupling behaviour plus
/// the internal-side and boundary-side coefficient arrays, one entry per
/// boundary face of the patch. Both arrays store the coupling negated, per
/// the assembly convention.
pub struct MatrixInterface<S: Scalar> {
    pub coupling: Box<dyn LduInterface<S>>,
    pub int_coeffs: Vec<S>,
    pub bou_coeffs: Vec<S>,
}

/// Sparse matrix over LDU addressing.
///
/// The addressing is shared, not owned; a matrix never outlives or mutates
/// it. Coefficients are mutable through the `_mut` accessors for external
/// assembly and relaxation.
pub struct LduMatrix<S: Scalar> {
    addr: Arc<LduAddressing>,
    diag: Vec<S>,
    lower: Option<Vec<S>>,
    upper: Vec<S>,
    interfaces: Vec<Option<MatrixInterface<S>>>,
}

impl<S: Scalar> LduMatrix<S> {
    /// Build a symmetric matrix: one shared coefficient per internal face.
    ///
    /// `face_coeffs` is given in assembly face order and is reordered to
    /// the addressing's canonical order internally.
    pub fn symmetric(addr: Arc<LduAddressing>, diag: Vec<S>, face_coeffs: Vec<S>) -> Self {
        assert_eq!(
            diag.len(),
            addr.n_cells(),
            "LduMatrix: diagonal length must match cell count"
        );
        assert_eq!(
            face_coeffs.len(),
            addr.n_faces(),
            "LduMatrix: face coefficient length must match face count"
        );

        let upper: Vec<S> = addr.face_order().iter().map(|&f| face_coeffs[f]).collect();
        let n_patches = addr.n_patches();
        Self {
            addr,
            diag,
            lower: None,
            upper,
            interfaces: (0..n_patches).map(|_| None).collect(),
        }
    }

    /// Build an asymmetric matrix with distinct lower and upper arrays.
    ///
    /// Arrays are given in assembly face order; faces whose owner and
    /// neighbour were swapped during addressing normalization swap their
    /// lower/upper entries here, so callers never see the canonical order.
    pub fn asymmetric(
        addr: Arc<LduAddressing>,
        diag: Vec<S>,
        lower: Vec<S>,
        upper: Vec<S>,
    ) -> Self {
        assert_eq!(
            diag.len(),
            addr.n_cells(),
            "LduMatrix: diagonal length must match cell count"
        );
        assert_eq!(
            lower.len(),
            addr.n_faces(),
            "LduMatrix: lower coefficient length must match face count"
        );
        assert_eq!(
            upper.len(),
            addr.n_faces(),
            "LduMatrix: upper coefficient length must match face count"
        );

        let mut lower_c = Vec::with_capacity(addr.n_faces());
        let mut upper_c = Vec::with_capacity(addr.n_faces());
        for (s, &f) in addr.face_order().iter().enumerate() {
            if addr.face_flipped()[s] {
                lower_c.push(upper[f]);
                upper_c.push(lower[f]);
            } else {
                lower_c.push(lower[f]);
                upper_c.push(upper[f]);
            }
        }

        let n_patches = addr.n_patches();
        Self {
            addr,
            diag,
            lower: Some(lower_c),
            upper: upper_c,
            interfaces: (0..n_patches).map(|_| None).collect(),
        }
    }

    /// Attach a coupled-boundary interface to `patch`.
    pub fn set_interface(
        &mut self,
        patch: usize,
        coupling: Box<dyn LduInterface<S>>,
        int_coeffs: Vec<S>,
        bou_coeffs: Vec<S>,
    ) {
        let n_patch_faces = self.addr.patch_addr(patch).len();
        assert_eq!(
            int_coeffs.len(),
            n_patch_faces,
            "LduMatrix: internal coefficient length must match patch face count"
        );
        assert_eq!(
            bou_coeffs.len(),
            n_patch_faces,
            "LduMatrix: boundary coefficient length must match patch face count"
        );
        self.interfaces[patch] = Some(MatrixInterface {
            coupling,
            int_coeffs,
            bou_coeffs,
        });
    }

    pub fn addressing(&self) -> &LduAddressing {
        &self.addr
    }

    pub fn shared_addressing(&self) -> Arc<LduAddressing> {
        Arc::clone(&self.addr)
    }

    pub fn n_cells(&self) -> usize {
        self.addr.n_cells()
    }

    /// A matrix is symmetric when lower and upper coefficients are the same
    /// array; solvers and preconditioners dispatch on this.
    pub fn is_symmetric(&self) -> bool {
        self.lower.is_none()
    }

    pub fn is_asymmetric(&self) -> bool {
        self.lower.is_some()
    }

    pub fn diag(&self) -> &[S] {
        &self.diag
    }

    pub fn diag_mut(&mut self) -> &mut [S] {
        &mut self.diag
    }

    pub fn upper(&self) -> &[S] {
        &self.upper
    }

    pub fn upper_mut(&mut self) -> &mut [S] {
        &mut self.upper
    }

    /// Lower coefficients; for a symmetric matrix this is the upper array.
    pub fn lower(&self) -> &[S] {
        self.lower.as_deref().unwrap_or(&self.upper)
    }

    pub fn interface(&self, patch: usize) -> Option<&MatrixInterface<S>> {
        self.interfaces[patch].as_ref()
    }

    /// Matrix-vector product `apsi = A·psi`, including coupled-boundary
    /// contributions.
    pub fn amul(&self, apsi: &mut Array1<S>, psi: &Array1<S>, comm: &dyn Communicator<S>) {
        assert_eq!(
            psi.len(),
            self.n_cells(),
            "LduMatrix: vector length must match cell count"
        );
        assert_eq!(
            apsi.len(),
            self.n_cells(),
            "LduMatrix: result length must match cell count"
        );

        self.init_interfaces(psi, comm);

        self.diag_multiply(apsi, psi);

        let l = self.addr.lower_addr();
        let u = self.addr.upper_addr();
        let lower = self.lower();
        for f in 0..self.addr.n_faces() {
            apsi[u[f]] += lower[f] * psi[l[f]];
            apsi[l[f]] += self.upper[f] * psi[u[f]];
        }

        self.update_interfaces(apsi, psi, comm, CoeffSide::Boundary, false);
    }

    /// Transpose matrix-vector product `tpsi = Aᵀ·psi`.
    ///
    /// Lower and upper exchange roles, and interface updates apply the
    /// internal-side coefficients.
    pub fn tmul(&self, tpsi: &mut Array1<S>, psi: &Array1<S>, comm: &dyn Communicator<S>) {
        assert_eq!(
            psi.len(),
            self.n_cells(),
            "LduMatrix: vector length must match cell count"
        );
        assert_eq!(
            tpsi.len(),
            self.n_cells(),
            "LduMatrix: result length must match cell count"
        );

        self.init_interfaces(psi, comm);

        self.diag_multiply(tpsi, psi);

        let l = self.addr.lower_addr();
        let u = self.addr.upper_addr();
        let lower = self.lower();
        for f in 0..self.addr.n_faces() {
            tpsi[u[f]] += self.upper[f] * psi[l[f]];
            tpsi[l[f]] += lower[f] * psi[u[f]];
        }

        self.update_interfaces(tpsi, psi, comm, CoeffSide::Internal, false);
    }

    /// Explicit residual `r = source − A·psi`.
    pub fn residual(
        &self,
        psi: &Array1<S>,
        source: &Array1<S>,
        comm: &dyn Communicator<S>,
    ) -> Array1<S> {
        assert_eq!(
            psi.len(),
            self.n_cells(),
            "LduMatrix: vector length must match cell count"
        );
        assert_eq!(
            source.len(),
            self.n_cells(),
            "LduMatrix: source length must match cell count"
        );

        self.init_interfaces(psi, comm);

        let mut r = source.clone();
        for c in 0..self.n_cells() {
            r[c] -= self.diag[c] * psi[c];
        }

        let l = self.addr.lower_addr();
        let u = self.addr.upper_addr();
        let lower = self.lower();
        for f in 0..self.addr.n_faces() {
            r[u[f]] -= lower[f] * psi[l[f]];
            r[l[f]] -= self.upper[f] * psi[u[f]];
        }

        self.update_interfaces(&mut r, psi, comm, CoeffSide::Boundary, true);
        r
    }

    /// Per-cell row sums: diagonal plus off-diagonal plus interface
    /// internal coefficients. Purely local.
    pub fn sum_a(&self) -> Array1<S> {
        let mut s = Array1::zeros(self.n_cells());
        for c in 0..self.n_cells() {
            s[c] = self.diag[c];
        }

        let l = self.addr.lower_addr();
        let u = self.addr.upper_addr();
        let lower = self.lower();
        for f in 0..self.addr.n_faces() {
            s[u[f]] += lower[f];
            s[l[f]] += self.upper[f];
        }

        for (patch, iface) in self.interfaces.iter().enumerate() {
            if let Some(iface) = iface {
                for (k, &cell) in self.addr.patch_addr(patch).iter().enumerate() {
                    s[cell] -= iface.int_coeffs[k];
                }
            }
        }
        s
    }

    /// Per-cell sum of off-diagonal coefficient magnitudes.
    pub fn sum_mag_off_diag(&self) -> Array1<S> {
        let mut s = Array1::zeros(self.n_cells());
        let l = self.addr.lower_addr();
        let u = self.addr.upper_addr();
        let lower = self.lower();
        for f in 0..self.addr.n_faces() {
            s[u[f]] += lower[f].abs();
            s[l[f]] += self.upper[f].abs();
        }
        s
    }

    /// Normalization factor for residual norms:
    /// `Σ|A·psi − A·x̄| + Σ|source − A·x̄| + small`, with `x̄` the global
    /// field average. Every solver scales its reported residuals by this.
    pub fn norm_factor(
        &self,
        psi: &Array1<S>,
        source: &Array1<S>,
        apsi: &Array1<S>,
        comm: &dyn Communicator<S>,
    ) -> S {
        let xref = gaverage(psi, comm);
        let aref = self.sum_a();

        let mut local = S::zero();
        for c in 0..self.n_cells() {
            let ax = aref[c] * xref;
            local += (apsi[c] - ax).abs() + (source[c] - ax).abs();
        }
        comm.sum(local) + S::small()
    }

    /// Dense copy of the local coefficients (diagonal plus internal faces;
    /// interface coefficients are not represented). Used by the
    /// coarsest-level direct solve and by tests.
    pub fn to_dense(&self) -> Array2<S> {
        let n = self.n_cells();
        let mut a = Array2::zeros((n, n));
        for c in 0..n {
            a[[c, c]] = self.diag[c];
        }
        let l = self.addr.lower_addr();
        let u = self.addr.upper_addr();
        let lower = self.lower();
        for f in 0..self.addr.n_faces() {
            a[[u[f], l[f]]] += lower[f];
            a[[l[f], u[f]]] += self.upper[f];
        }
        a
    }

    /// Fold coupled-boundary source contributions into `b_prime`:
    /// `b_prime[cell] += bou_coeffs[k] * pnf[k]` per coupled patch, with
    /// the full init-then-update schedule. Smoothers call this once per
    /// sweep.
    pub fn add_coupled_source(
        &self,
        b_prime: &mut Array1<S>,
        psi: &Array1<S>,
        comm: &dyn Communicator<S>,
    ) {
        self.init_interfaces(psi, comm);
        self.update_interfaces(b_prime, psi, comm, CoeffSide::Boundary, true);
    }

    /// Issue the init phase for every coupled patch, in schedule order.
    fn init_interfaces(&self, psi: &Array1<S>, comm: &dyn Communicator<S>) {
        for event in self.addr.schedule() {
            if !event.init {
                continue;
            }
            if let Some(iface) = &self.interfaces[event.patch] {
                iface
                    .coupling
                    .init_matrix_update(psi, self.addr.patch_addr(event.patch), comm);
            }
        }
    }

    /// Complete the update phase for every coupled patch, in schedule
    /// order. `negate` flips the coefficient sign (residual-style updates).
    pub(crate) fn update_interfaces(
        &self,
        result: &mut Array1<S>,
        psi: &Array1<S>,
        comm: &dyn Communicator<S>,
        side: CoeffSide,
        negate: bool,
    ) {
        for event in self.addr.schedule() {
            if event.init {
                continue;
            }
            if let Some(iface) = &self.interfaces[event.patch] {
                let coeffs = match side {
                    CoeffSide::Boundary => &iface.bou_coeffs,
                    CoeffSide::Internal => &iface.int_coeffs,
                };
                let patch_cells = self.addr.patch_addr(event.patch);
                if negate {
                    let negated: Vec<S> = coeffs.iter().map(|&c| -c).collect();
                    iface
                        .coupling
                        .complete_matrix_update(result, psi, patch_cells, &negated, comm);
                } else {
                    iface
                        .coupling
                        .complete_matrix_update(result, psi, patch_cells, coeffs, comm);
                }
            }
        }
    }

    #[cfg(not(feature = "rayon"))]
    fn diag_multiply(&self, out: &mut Array1<S>, psi: &Array1<S>) {
        for c in 0..self.n_cells() {
            out[c] = self.diag[c] * psi[c];
        }
    }

    #[cfg(feature = "rayon")]
    fn diag_multiply(&self, out: &mut Array1<S>, psi: &Array1<S>) {
        use rayon::prelude::*;

        let n = self.n_cells();
        if n < RAYON_MIN_LEN {
            for c in 0..n {
                out[c] = self.diag[c] * psi[c];
            }
        } else {
            let values: Vec<S> = (0..n).into_par_iter().map(|c| self.diag[c] * psi[c]).collect();
            *out = Array1::from_vec(values);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::SerialComm;
    use approx::assert_relative_eq;
    use ndarray::array;

    // 1-D chain of three cells:
    //   [ 2 -1  0 ]
    //   [-1  2 -1 ]
    //   [ 0 -1  2 ]
    fn chain3() -> LduMatrix<f64> {
        let addr = Arc::new(LduAddressing::new(3, vec![0, 1], vec![1, 2], vec![]).unwrap());
        LduMatrix::symmetric(addr, vec![2.0; 3], vec![-1.0, -1.0])
    }

    #[test]
    fn amul_matches_hand_computation() {
        let m = chain3();
        let comm = SerialComm;
        let psi = array![1.0_f64, 2.0, 3.0];
        let mut apsi = Array1::zeros(3);
        m.amul(&mut apsi, &psi, &comm);
        assert_relative_eq!(apsi[0], 0.0);
        assert_relative_eq!(apsi[1], 0.0);
        assert_relative_eq!(apsi[2], 4.0);
    }

    #[test]
    fn amul_is_linear() {
        let m = chain3();
        let comm = SerialComm;
        let x1 = array![1.0_f64, -2.0, 0.5];
        let x2 = array![0.25_f64, 3.0, -1.0];

        let mut a_sum = Array1::zeros(3);
        m.amul(&mut a_sum, &(&x1 + &x2), &comm);

        let mut a1 = Array1::zeros(3);
        let mut a2 = Array1::zeros(3);
        m.amul(&mut a1, &x1, &comm);
        m.amul(&mut a2, &x2, &comm);

        for c in 0..3 {
            assert_relative_eq!(a_sum[c], a1[c] + a2[c], epsilon = 1e-12);
        }
    }

    #[test]
    fn tmul_is_the_true_transpose() {
        // Asymmetric chain: lower -2, upper -1.
        let addr = Arc::new(LduAddressing::new(3, vec![0, 1], vec![1, 2], vec![]).unwrap());
        let m = LduMatrix::asymmetric(addr, vec![3.0; 3], vec![-2.0, -2.0], vec![-1.0, -1.0]);
        let comm = SerialComm;

        let x = array![1.0_f64, 2.0, -1.0];
        let y = array![0.5_f64, -1.5, 2.0];

        let mut ax = Array1::zeros(3);
        let mut aty = Array1::zeros(3);
        m.amul(&mut ax, &x, &comm);
        m.tmul(&mut aty, &y, &comm);

        // <A·x, y> == <x, Aᵀ·y>
        let lhs: f64 = (0..3).map(|c| ax[c] * y[c]).sum();
        let rhs: f64 = (0..3).map(|c| x[c] * aty[c]).sum();
        assert_relative_eq!(lhs, rhs, epsilon = 1e-12);
    }

    #[test]
    fn asymmetric_coefficients_follow_face_orientation() {
        // One face given neighbour-to-owner; the coefficient pair must swap.
        let addr = Arc::new(LduAddressing::new(2, vec![1], vec![0], vec![]).unwrap());
        let m = LduMatrix::asymmetric(addr, vec![1.0; 2], vec![-2.0], vec![-5.0]);
        let comm = SerialComm;

        // A = [1 -2; -5 1]: row 0 couples to cell 1 with the original
        // "lower" coefficient, because the face was flipped.
        let x = array![1.0_f64, 1.0];
        let mut ax = Array1::zeros(2);
        m.amul(&mut ax, &x, &comm);
        assert_relative_eq!(ax[0], -1.0);
        assert_relative_eq!(ax[1], -4.0);
    }

    #[test]
    fn residual_is_source_minus_ax() {
        let m = chain3();
        let comm = SerialComm;
        let psi = array![1.0_f64, 0.0, -1.0];
        let source = array![1.0_f64, 2.0, 3.0];

        let r = m.residual(&psi, &source, &comm);
        let mut apsi = Array1::zeros(3);
        m.amul(&mut apsi, &psi, &comm);
        for c in 0..3 {
            assert_relative_eq!(r[c], source[c] - apsi[c], epsilon = 1e-12);
        }
    }

    #[test]
    fn sum_a_gives_row_sums() {
        let m = chain3();
        let s = m.sum_a();
        assert_relative_eq!(s[0], 1.0);
        assert_relative_eq!(s[1], 0.0);
        assert_relative_eq!(s[2], 1.0);
    }

    #[test]
    fn sum_mag_off_diag_ignores_signs() {
        let m = chain3();
        let s = m.sum_mag_off_diag();
        assert_relative_eq!(s[0], 1.0);
        assert_relative_eq!(s[1], 2.0);
        assert_relative_eq!(s[2], 1.0);
    }

    #[test]
    fn symmetry_query() {
        let m = chain3();
        assert!(m.is_symmetric());
        assert!(!m.is_asymmetric());

        let addr = Arc::new(LduAddressing::new(2, vec![0], vec![1], vec![]).unwrap());
        let a = LduMatrix::asymmetric(addr, vec![1.0; 2], vec![-2.0], vec![-1.0]);
        assert!(a.is_asymmetric());
    }

    #[test]
    fn to_dense_round_trips_amul() {
        let m = chain3();
        let comm = SerialComm;
        let dense = m.to_dense();
        let x = array![0.3_f64, -1.2, 2.0];
        let mut ax = Array1::zeros(3);
        m.amul(&mut ax, &x, &comm);
        let dx = dense.dot(&x);
        for c in 0..3 {
            assert_relative_eq!(ax[c], dx[c], epsilon = 1e-12);
        }
    }

    #[test]
    fn cyclic_interface_closes_the_ring() {
        // Periodic 4-cell chain: cell 3 couples back to cell 0 through a
        // cyclic patch pair.
        let addr = Arc::new(
            LduAddressing::new(
                4,
                vec![0, 1, 2],
                vec![1, 2, 3],
                vec![vec![0], vec![3]],
            )
            .unwrap(),
        );
        let mut m = LduMatrix::symmetric(addr, vec![2.0; 4], vec![-1.0; 3]);
        use crate::ldu::interfaces::CyclicInterface;
        m.set_interface(0, Box::new(CyclicInterface::new(vec![3])), vec![1.0], vec![1.0]);
        m.set_interface(1, Box::new(CyclicInterface::new(vec![0])), vec![1.0], vec![1.0]);

        let comm = SerialComm;
        // Constant field lies in the null space of the periodic Laplacian.
        let psi = Array1::from_elem(4, 5.0);
        let mut apsi = Array1::zeros(4);
        m.amul(&mut apsi, &psi, &comm);
        for c in 0..4 {
            assert_relative_eq!(apsi[c], 0.0, epsilon = 1e-12);
        }
    }
}
