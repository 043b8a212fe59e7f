//! Simplified diagonal-based incomplete LU
//!
//! The asymmetric counterpart of DIC: only the diagonal is modified during
//! factorization, lower and upper coefficients are used unchanged in the
//! substitution sweeps. The forward sweep must visit faces in ascending
//! neighbour order, which is what the losort addressing provides; the
//! transposed apply mirrors the sweeps for the transposed system that
//! bi-conjugate gradient iterates against.

use crate::comm::Communicator;
use crate::ldu::{LduAddressing, LduMatrix};
use crate::traits::{LduPreconditioner, Scalar};
use ndarray::Array1;
use std::sync::Arc;

pub struct DiluPreconditioner<S: Scalar> {
    addr: Arc<LduAddressing>,
    lower: Vec<S>,
    upper: Vec<S>,
    r_d: Vec<S>,
}

impl<S: Scalar> DiluPreconditioner<S> {
    pub fn new(matrix: &LduMatrix<S>) -> Self {
        assert!(
            matrix.is_asymmetric(),
            "DiluPreconditioner: matrix must be asymmetric (DIC handles symmetric systems)"
        );
        let addr = matrix.shared_addressing();
        let lower = matrix.lower().to_vec();
        let upper = matrix.upper().to_vec();

        let own_start = addr.owner_start();
        let u = addr.upper_addr();
        let mut r_d = matrix.diag().to_vec();
        for cell in 0..addr.n_cells() {
            let pivot = r_d[cell];
            assert!(
                pivot.abs() >= S::vsmall(),
                "DiluPreconditioner: zero pivot at cell {cell} during factorization"
            );
            let rp = S::one() / pivot;
            r_d[cell] = rp;
            for f in own_start[cell]..own_start[cell + 1] {
                r_d[u[f]] -= upper[f] * lower[f] * rp;
            }
        }

        Self {
            addr,
            lower,
            upper,
            r_d,
        }
    }
}

impl<S: Scalar> LduPreconditioner<S> for DiluPreconditioner<S> {
    fn precondition(&self, w: &mut Array1<S>, r: &Array1<S>, _comm: &dyn Communicator<S>) {
        let l = self.addr.lower_addr();
        let u = self.addr.upper_addr();
        let losort = self.addr.losort_addr();
        let n_faces = self.addr.n_faces();

        for cell in 0..self.addr.n_cells() {
            w[cell] = self.r_d[cell] * r[cell];
        }
        // Forward substitution walks rows in ascending neighbour order.
        for &f in losort.iter() {
            let wl = w[l[f]];
            w[u[f]] -= self.r_d[u[f]] * self.lower[f] * wl;
        }
        for f in (0..n_faces).rev() {
            let wu = w[u[f]];
            w[l[f]] -= self.r_d[l[f]] * self.upper[f] * wu;
        }
    }

    fn precondition_transpose(&self, w: &mut Array1<S>, r: &Array1<S>, _comm: &dyn Communicator<S>) {
        let l = self.addr.lower_addr();
        let u = self.addr.upper_addr();
        let losort = self.addr.losort_addr();
        let n_faces = self.addr.n_faces();

        for cell in 0..self.addr.n_cells() {
            w[cell] = self.r_d[cell] * r[cell];
        }
        // Lower and upper swap roles for the transposed factors.
        for f in 0..n_faces {
            let wl = w[l[f]];
            w[u[f]] -= self.r_d[u[f]] * self.upper[f] * wl;
        }
        for &f in losort.iter().rev() {
            let wu = w[u[f]];
            w[l[f]] -= self.r_d[l[f]] * self.lower[f] * wu;
        }
    }

    fn name(&self) -> &str {
        "DILU"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::SerialComm;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn convection_diffusion_1d(n: usize) -> LduMatrix<f64> {
        let owner: Vec<usize> = (0..n - 1).collect();
        let neighbour: Vec<usize> = (1..n).collect();
        let addr = Arc::new(LduAddressing::new(n, owner, neighbour, vec![]).unwrap());
        let mut diag = vec![3.0; n];
        diag[0] += 1.0;
        diag[n - 1] += 1.0;
        LduMatrix::asymmetric(addr, diag, vec![-2.0; n - 1], vec![-1.0; n - 1])
    }

    #[test]
    fn exact_on_tridiagonal_systems() {
        let m = convection_diffusion_1d(7);
        let p = DiluPreconditioner::new(&m);
        let comm = SerialComm;

        let r = array![2.0_f64, -1.0, 0.25, 4.0, -3.5, 1.5, 0.0];
        let mut w = Array1::zeros(7);
        p.precondition(&mut w, &r, &comm);

        let mut aw = Array1::zeros(7);
        m.amul(&mut aw, &w, &comm);
        for c in 0..7 {
            assert_relative_eq!(aw[c], r[c], epsilon = 1e-12);
        }
    }

    #[test]
    fn transpose_apply_inverts_the_transpose() {
        let m = convection_diffusion_1d(7);
        let p = DiluPreconditioner::new(&m);
        let comm = SerialComm;

        let r = array![1.0_f64, 0.5, -2.0, 3.0, 0.0, -1.25, 2.0];
        let mut w = Array1::zeros(7);
        p.precondition_transpose(&mut w, &r, &comm);

        let mut atw = Array1::zeros(7);
        m.tmul(&mut atw, &w, &comm);
        for c in 0..7 {
            assert_relative_eq!(atw[c], r[c], epsilon = 1e-12);
        }
    }

    #[test]
    #[should_panic(expected = "matrix must be asymmetric")]
    fn symmetric_matrices_are_rejected() {
        let addr = Arc::new(LduAddressing::new(2, vec![0], vec![1], vec![]).unwrap());
        let m = LduMatrix::symmetric(addr, vec![2.0; 2], vec![-1.0]);
        let _ = DiluPreconditioner::new(&m);
    }
}
