use dilconv_core::TensorError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OptimError {
    #[error("Learning rate must be finite and non-negative, got {0}")]
    InvalidLearningRate(f64),

    #[error("Regularization coefficient must be finite and non-negative, got {0}")]
    InvalidCoefficient(f64),

    #[error(transparent)]
    Tensor(#[from] TensorError),
}

pub type OptimResult<T> = Result<T, OptimError>;
