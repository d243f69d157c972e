//! Floating-point comparison between tensors.
//!
//! Two implementations of the same operator rarely agree bit-for-bit once
//! summation order differs, so agreement is judged against a [`Tolerance`].

use serde::{Deserialize, Serialize};

use crate::dtype::Float;
use crate::error::{TensorError, TensorResult};
use crate::tensor::Tensor;

/// Summary of the element-wise difference between two tensors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiffStats {
    pub mean_abs: f64,
    pub max_abs: f64,
    pub max_rel: f64,
    pub mse: f64,
}

impl DiffStats {
    /// Compare `actual` against `expected`; shapes must match exactly.
    pub fn between<T: Float>(actual: &Tensor<T>, expected: &Tensor<T>) -> TensorResult<Self> {
        if actual.shape() != expected.shape() {
            return Err(TensorError::ShapeMismatch {
                expected: expected.shape_vec(),
                got: actual.shape_vec(),
            });
        }

        let mut sum_abs = 0.0f64;
        let mut max_abs = 0.0f64;
        let mut max_rel = 0.0f64;
        let mut mse = 0.0f64;

        for (&lhs, &rhs) in actual.data().iter().zip(expected.data().iter()) {
            let (lhs, rhs) = (lhs.to_f64(), rhs.to_f64());
            let abs = (lhs - rhs).abs();
            sum_abs += abs;
            max_abs = max_abs.max(abs);
            if rhs.abs() > f64::EPSILON {
                max_rel = max_rel.max(abs / rhs.abs());
            }
            mse += abs * abs;
        }

        let len = actual.numel().max(1) as f64;
        Ok(DiffStats {
            mean_abs: sum_abs / len,
            max_abs,
            max_rel,
            mse: mse / len,
        })
    }
}

/// Acceptance band for `|actual - expected| <= abs + rel * |expected|`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tolerance {
    pub abs: f64,
    pub rel: f64,
}

impl Tolerance {
    pub const fn new(abs: f64, rel: f64) -> Self {
        Tolerance { abs, rel }
    }

    pub fn accepts(&self, actual: f64, expected: f64) -> bool {
        (actual - expected).abs() <= self.abs + self.rel * expected.abs()
    }
}

impl Default for Tolerance {
    /// Band used for f64 kernels that differ only in accumulation order.
    fn default() -> Self {
        Tolerance::new(1e-10, 1e-8)
    }
}

impl<T: Float> Tensor<T> {
    /// Element-wise closeness check. NaN never compares close.
    pub fn allclose(&self, other: &Tensor<T>, tol: Tolerance) -> TensorResult<bool> {
        if self.shape() != other.shape() {
            return Err(TensorError::ShapeMismatch {
                expected: other.shape_vec(),
                got: self.shape_vec(),
            });
        }
        Ok(self
            .data()
            .iter()
            .zip(other.data().iter())
            .all(|(&a, &b)| tol.accepts(a.to_f64(), b.to_f64())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_diff_stats() {
        let a: Tensor<f64> = Tensor::new(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2]).unwrap();
        let b: Tensor<f64> = Tensor::new(vec![1.0, 2.5, 3.0, 3.0], vec![2, 2]).unwrap();
        let stats = DiffStats::between(&a, &b).unwrap();
        assert_abs_diff_eq!(stats.max_abs, 1.0);
        assert_abs_diff_eq!(stats.mean_abs, 0.375);
        assert_abs_diff_eq!(stats.mse, 1.25 / 4.0);
        assert_abs_diff_eq!(stats.max_rel, 1.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_diff_stats_shape_mismatch() {
        let a: Tensor<f64> = Tensor::zeros(vec![4]);
        let b: Tensor<f64> = Tensor::zeros(vec![2, 2]);
        assert!(DiffStats::between(&a, &b).is_err());
        assert!(a.allclose(&b, Tolerance::default()).is_err());
    }

    #[test]
    fn test_allclose() {
        let a: Tensor<f64> = Tensor::new(vec![1.0, 1e6], vec![2]).unwrap();
        let b: Tensor<f64> = Tensor::new(vec![1.0 + 1e-12, 1e6 + 1e-3], vec![2]).unwrap();
        assert!(a.allclose(&b, Tolerance::default()).unwrap());
        assert!(!a.allclose(&b, Tolerance::new(1e-10, 0.0)).unwrap());

        let nan: Tensor<f64> = Tensor::full(vec![2], f64::NAN);
        assert!(!nan.allclose(&nan, Tolerance::default()).unwrap());
    }
}
