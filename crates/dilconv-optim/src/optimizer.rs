use dilconv_core::Float;
use dilconv_nn::Layer;
use log::debug;

use crate::error::{OptimError, OptimResult};
use crate::regularizer::Regularizer;

/// Trait for optimizers.
pub trait Optimizer<T: Float> {
    /// Update every parameter of `layer` from its accumulated gradient.
    fn step(&mut self, layer: &mut dyn Layer<T>) -> OptimResult<()>;
}

/// Plain stochastic gradient descent with an optional regularizer.
///
/// grad' = grad + regularizer gradient
/// param -= lr * grad'
///
/// The regularizer is applied to a copy of the gradient; the layer's
/// accumulators are left as they are.
pub struct SGD<T: Float> {
    lr: T,
    regularizer: Option<Box<dyn Regularizer<T>>>,
    regularize_bias: bool,
}

impl<T: Float> SGD<T> {
    pub fn new(lr: T) -> OptimResult<Self> {
        if !lr.is_finite() || lr < T::ZERO {
            return Err(OptimError::InvalidLearningRate(lr.to_f64()));
        }
        Ok(SGD {
            lr,
            regularizer: None,
            regularize_bias: false,
        })
    }

    pub fn with_regularizer<R: Regularizer<T> + 'static>(mut self, regularizer: R) -> Self {
        self.regularizer = Some(Box::new(regularizer));
        self
    }

    /// Also regularize parameters named `bias` (weights only by default).
    pub fn regularize_bias(mut self, enabled: bool) -> Self {
        self.regularize_bias = enabled;
        self
    }

    pub fn lr(&self) -> T {
        self.lr
    }

    fn regularizes(&self, name: &str) -> bool {
        name != "bias" || self.regularize_bias
    }

    /// Total regularization penalty over the parameters this optimizer
    /// regularizes. Zero without a regularizer.
    pub fn penalty(&self, layer: &mut dyn Layer<T>) -> T {
        let Some(reg) = &self.regularizer else {
            return T::ZERO;
        };
        layer
            .parameters()
            .iter()
            .filter(|p| self.regularizes(p.name))
            .map(|p| reg.penalty(&*p.value))
            .sum()
    }
}

impl<T: Float> Optimizer<T> for SGD<T> {
    fn step(&mut self, layer: &mut dyn Layer<T>) -> OptimResult<()> {
        for param in layer.parameters() {
            let mut grad = param.grad.clone();
            if let Some(reg) = &self.regularizer {
                if self.regularizes(param.name) {
                    reg.apply(&*param.value, &mut grad)?;
                }
            }
            debug!("sgd step on {} (lr={})", param.name, self.lr);
            param.value.add_scaled(&grad, -self.lr)?;
        }
        Ok(())
    }
}
