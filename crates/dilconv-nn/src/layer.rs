use dilconv_core::{Float, Tensor};

use crate::error::ConvResult;

/// A trainable parameter together with its accumulated gradient.
pub struct ParamMut<'a, T: Float> {
    pub name: &'static str,
    pub value: &'a mut Tensor<T>,
    pub grad: &'a Tensor<T>,
}

/// Trait for a neural network layer with an explicit backward pass.
pub trait Layer<T: Float> {
    /// Forward pass.
    fn forward(&self, input: &Tensor<T>) -> ConvResult<Tensor<T>>;

    /// Gradient w.r.t. `input`; parameter gradients are accumulated into the
    /// layer's own buffers.
    fn backward(&mut self, input: &Tensor<T>, grad_output: &Tensor<T>) -> ConvResult<Tensor<T>>;

    /// Reset all accumulated parameter gradients to zero.
    fn zero_grad(&mut self);

    /// Return all trainable parameters.
    fn parameters(&mut self) -> Vec<ParamMut<'_, T>>;
}
