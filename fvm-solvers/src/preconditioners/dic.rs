//! Simplified diagonal-based incomplete Cholesky
//!
//! Factorization over the matrix's own sparsity pattern: only the diagonal
//! changes, the off-diagonal coefficients are reused as-is. For matrices
//! whose pattern has no fill-in (1-D chains) this is the exact Cholesky
//! solve; elsewhere it is the usual cheap approximation.
//!
//! Requires a symmetric matrix. What the factorization keeps is the
//! reciprocal of the modified diagonal, so a zero pivot is fatal at
//! construction.

use crate::comm::Communicator;
use crate::ldu::{LduAddressing, LduMatrix};
use crate::traits::{LduPreconditioner, Scalar};
use ndarray::Array1;
use std::sync::Arc;

pub struct DicPreconditioner<S: Scalar> {
    addr: Arc<LduAddressing>,
    upper: Vec<S>,
    r_d: Vec<S>,
}

impl<S: Scalar> DicPreconditioner<S> {
    pub fn new(matrix: &LduMatrix<S>) -> Self {
        assert!(
            matrix.is_symmetric(),
            "DicPreconditioner: matrix must be symmetric (DILU handles asymmetric systems)"
        );
        let addr = matrix.shared_addressing();
        let upper = matrix.upper().to_vec();

        let own_start = addr.owner_start();
        let u = addr.upper_addr();
        let mut r_d = matrix.diag().to_vec();
        // Owner-major order finalizes each pivot before any face reads it.
        for cell in 0..addr.n_cells() {
            let pivot = r_d[cell];
            assert!(
                pivot.abs() >= S::vsmall(),
                "DicPreconditioner: zero pivot at cell {cell} during factorization"
            );
            let rp = S::one() / pivot;
            r_d[cell] = rp;
            for f in own_start[cell]..own_start[cell + 1] {
                r_d[u[f]] -= upper[f] * upper[f] * rp;
            }
        }

        Self { addr, upper, r_d }
    }
}

impl<S: Scalar> LduPreconditioner<S> for DicPreconditioner<S> {
    fn precondition(&self, w: &mut Array1<S>, r: &Array1<S>, _comm: &dyn Communicator<S>) {
        let l = self.addr.lower_addr();
        let u = self.addr.upper_addr();
        let n_faces = self.addr.n_faces();

        for cell in 0..self.addr.n_cells() {
            w[cell] = self.r_d[cell] * r[cell];
        }
        for f in 0..n_faces {
            let wl = w[l[f]];
            w[u[f]] -= self.r_d[u[f]] * self.upper[f] * wl;
        }
        for f in (0..n_faces).rev() {
            let wu = w[u[f]];
            w[l[f]] -= self.r_d[l[f]] * self.upper[f] * wu;
        }
    }

    fn name(&self) -> &str {
        "DIC"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::SerialComm;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn laplacian_1d(n: usize) -> LduMatrix<f64> {
        let owner: Vec<usize> = (0..n - 1).collect();
        let neighbour: Vec<usize> = (1..n).collect();
        let addr = Arc::new(LduAddressing::new(n, owner, neighbour, vec![]).unwrap());
        let mut diag = vec![2.0; n];
        diag[0] += 1.0;
        diag[n - 1] += 1.0;
        LduMatrix::symmetric(addr, diag, vec![-1.0; n - 1])
    }

    #[test]
    fn exact_on_tridiagonal_systems() {
        // A 1-D chain has no fill-in, so the incomplete factorization is
        // the complete one: precondition must invert the matrix.
        let m = laplacian_1d(9);
        let p = DicPreconditioner::new(&m);
        let comm = SerialComm;

        let r = array![1.0_f64, -2.0, 0.5, 3.0, 0.0, -1.5, 2.25, 1.0, -0.75];
        let mut w = Array1::zeros(9);
        p.precondition(&mut w, &r, &comm);

        let mut aw = Array1::zeros(9);
        m.amul(&mut aw, &w, &comm);
        for c in 0..9 {
            assert_relative_eq!(aw[c], r[c], epsilon = 1e-12);
        }
    }

    #[test]
    #[should_panic(expected = "zero pivot at cell 0")]
    fn zero_diagonal_is_fatal() {
        let addr = Arc::new(LduAddressing::new(2, vec![0], vec![1], vec![]).unwrap());
        let m = LduMatrix::symmetric(addr, vec![0.0, 2.0], vec![-1.0]);
        let _ = DicPreconditioner::new(&m);
    }

    #[test]
    #[should_panic(expected = "matrix must be symmetric")]
    fn asymmetric_matrices_are_rejected() {
        let addr = Arc::new(LduAddressing::new(2, vec![0], vec![1], vec![]).unwrap());
        let m = LduMatrix::asymmetric(addr, vec![2.0; 2], vec![-2.0], vec![-1.0]);
        let _ = DicPreconditioner::new(&m);
    }
}
