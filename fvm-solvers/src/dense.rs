//! Dense LU factorization
//!
//! Direct solve for small dense systems. The multigrid solver factorizes
//! its coarsest-level matrix once and reuses the factorization every cycle;
//! tests use it as the reference solve for small fixtures.

use crate::traits::Scalar;
use ndarray::{Array1, Array2};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DenseLuError {
    #[error("matrix is not square: {rows}x{cols}")]
    NotSquare { rows: usize, cols: usize },
    #[error("matrix is singular: no usable pivot in column {column}")]
    SingularPivot { column: usize },
}

/// LU factorization with partial pivoting, `P·A = L·U` with unit-diagonal
/// `L` and `U` packed into one array.
#[derive(Debug)]
pub struct DenseLu<S: Scalar> {
    lu: Array2<S>,
    // Row swapped with k at elimination step k.
    swaps: Vec<usize>,
    n: usize,
}

impl<S: Scalar> DenseLu<S> {
    pub fn factorize(a: &Array2<S>) -> Result<Self, DenseLuError> {
        let (rows, cols) = a.dim();
        if rows != cols {
            return Err(DenseLuError::NotSquare { rows, cols });
        }
        let n = rows;
        let mut lu = a.clone();
        let mut swaps = vec![0usize; n];

        for k in 0..n {
            let mut p = k;
            let mut max = lu[[k, k]].abs();
            for i in (k + 1)..n {
                let v = lu[[i, k]].abs();
                if v > max {
                    max = v;
                    p = i;
                }
            }
            if max < S::vsmall() {
                return Err(DenseLuError::SingularPivot { column: k });
            }
            swaps[k] = p;
            if p != k {
                for j in 0..n {
                    let tmp = lu[[k, j]];
                    lu[[k, j]] = lu[[p, j]];
                    lu[[p, j]] = tmp;
                }
            }

            let pivot = lu[[k, k]];
            for i in (k + 1)..n {
                let m = lu[[i, k]] / pivot;
                lu[[i, k]] = m;
                for j in (k + 1)..n {
                    let lkj = lu[[k, j]];
                    lu[[i, j]] -= m * lkj;
                }
            }
        }

        Ok(Self { lu, swaps, n })
    }

    pub fn n(&self) -> usize {
        self.n
    }

    /// Solve `A·x = b` using the stored factorization.
    pub fn solve(&self, b: &Array1<S>) -> Array1<S> {
        assert_eq!(
            b.len(),
            self.n,
            "DenseLu: right-hand side length must match factorized size"
        );
        let mut x = b.clone();
        for k in 0..self.n {
            let p = self.swaps[k];
            if p != k {
                let tmp = x[k];
                x[k] = x[p];
                x[p] = tmp;
            }
        }

        // Forward substitution (unit lower triangle).
        for i in 1..self.n {
            let mut sum = x[i];
            for j in 0..i {
                sum -= self.lu[[i, j]] * x[j];
            }
            x[i] = sum;
        }

        // Back substitution.
        for i in (0..self.n).rev() {
            let mut sum = x[i];
            for j in (i + 1)..self.n {
                sum -= self.lu[[i, j]] * x[j];
            }
            x[i] = sum / self.lu[[i, i]];
        }
        x
    }
}
