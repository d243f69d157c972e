use dilconv_core::{Float, Tensor, TensorResult};

use crate::error::{OptimError, OptimResult};

/// A penalty term added to the training loss, applied through its gradient.
pub trait Regularizer<T: Float> {
    /// Value of the penalty for `param`.
    fn penalty(&self, param: &Tensor<T>) -> T;

    /// Add the penalty's gradient w.r.t. `param` into `grad`.
    fn apply(&self, param: &Tensor<T>, grad: &mut Tensor<T>) -> TensorResult<()>;
}

/// L2 weight penalty.
///
/// penalty = c/2 * Σ w²
/// grad   += c * w
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct L2<T: Float> {
    coefficient: T,
}

impl<T: Float> L2<T> {
    pub fn new(coefficient: T) -> OptimResult<Self> {
        if !coefficient.is_finite() || coefficient < T::ZERO {
            return Err(OptimError::InvalidCoefficient(coefficient.to_f64()));
        }
        Ok(L2 { coefficient })
    }

    pub fn coefficient(&self) -> T {
        self.coefficient
    }
}

impl<T: Float> Regularizer<T> for L2<T> {
    fn penalty(&self, param: &Tensor<T>) -> T {
        let sq: T = param.data().iter().map(|&w| w * w).sum();
        self.coefficient * sq / T::TWO
    }

    fn apply(&self, param: &Tensor<T>, grad: &mut Tensor<T>) -> TensorResult<()> {
        grad.add_scaled(param, self.coefficient)
    }
}
