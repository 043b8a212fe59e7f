//! Diagonal (Jacobi) preconditioner
//!
//! Scales the residual by the reciprocal diagonal. Element-wise, so it
//! parallelizes trivially and costs one multiply per cell.

use crate::comm::Communicator;
use crate::ldu::LduMatrix;
use crate::traits::{LduPreconditioner, Scalar};
use ndarray::Array1;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

#[cfg(feature = "rayon")]
const RAYON_MIN_LEN: usize = 1000;

/// Reciprocal-diagonal scaling, `w = D⁻¹·r`.
#[derive(Debug, Clone)]
pub struct DiagonalPreconditioner<S: Scalar> {
    r_d: Array1<S>,
}

impl<S: Scalar> DiagonalPreconditioner<S> {
    /// Cache the reciprocal diagonal of `matrix`.
    ///
    /// A numerically zero diagonal entry is a fatal error; a reciprocal is
    /// structurally required for every cell.
    pub fn new(matrix: &LduMatrix<S>) -> Self {
        let mut r_d = Array1::zeros(matrix.n_cells());
        for (cell, &d) in matrix.diag().iter().enumerate() {
            assert!(
                d.abs() >= S::vsmall(),
                "DiagonalPreconditioner: zero diagonal at cell {cell}"
            );
            r_d[cell] = S::one() / d;
        }
        Self { r_d }
    }
}

impl<S: Scalar> LduPreconditioner<S> for DiagonalPreconditioner<S> {
    fn precondition(&self, w: &mut Array1<S>, r: &Array1<S>, _comm: &dyn Communicator<S>) {
        #[cfg(feature = "rayon")]
        {
            if r.len() >= RAYON_MIN_LEN {
                let r_slice = r.as_slice().expect("residual array should be contiguous");
                let d_slice = self
                    .r_d
                    .as_slice()
                    .expect("reciprocal diagonal should be contiguous");
                let values: Vec<S> = r_slice
                    .par_iter()
                    .zip(d_slice.par_iter())
                    .map(|(&ri, &di)| ri * di)
                    .collect();
                *w = Array1::from_vec(values);
                return;
            }
        }
        for (wi, (&ri, &di)) in w.iter_mut().zip(r.iter().zip(self.r_d.iter())) {
            *wi = ri * di;
        }
    }

    fn name(&self) -> &str {
        "diagonal"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::SerialComm;
    use crate::ldu::LduAddressing;
    use approx::assert_relative_eq;
    use ndarray::array;
    use std::sync::Arc;

    #[test]
    fn scales_by_the_reciprocal_diagonal() {
        let addr = Arc::new(LduAddressing::new(3, vec![], vec![], vec![]).unwrap());
        let m = LduMatrix::symmetric(addr, vec![2.0, 4.0, 1.0], vec![]);
        let p = DiagonalPreconditioner::new(&m);

        let comm = SerialComm;
        let r = array![2.0_f64, 8.0, 3.0];
        let mut w = Array1::zeros(3);
        p.precondition(&mut w, &r, &comm);

        assert_relative_eq!(w[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(w[1], 2.0, epsilon = 1e-12);
        assert_relative_eq!(w[2], 3.0, epsilon = 1e-12);
    }

    #[test]
    #[should_panic(expected = "zero diagonal at cell 1")]
    fn zero_diagonal_is_fatal() {
        let addr = Arc::new(LduAddressing::new(2, vec![], vec![], vec![]).unwrap());
        let m = LduMatrix::symmetric(addr, vec![1.0, 0.0], vec![]);
        let _ = DiagonalPreconditioner::new(&m);
    }
}
