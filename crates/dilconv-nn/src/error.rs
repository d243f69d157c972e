use dilconv_core::TensorError;
use thiserror::Error;

/// Errors raised by convolution layers. Every variant is reported before any
/// arithmetic runs, so a failed call never leaves partial output behind.
#[derive(Debug, Error)]
pub enum ConvError {
    #[error("Invalid convolution config: {0}")]
    InvalidConfig(String),

    #[error("Input has {got} channels, layer expects {expected}")]
    ChannelMismatch { expected: usize, got: usize },

    #[error(
        "Input {input:?} (padded {padded:?}) is smaller than the dilated kernel extent {extent:?}"
    )]
    InputTooSmall {
        input: [usize; 2],
        padded: [usize; 2],
        extent: [usize; 2],
    },

    #[error("Expected a 3D [C, H, W] or 4D [N, C, H, W] input, got rank {0}")]
    InvalidRank(usize),

    #[error("Gradient of output has shape {got:?}, forward output shape is {expected:?}")]
    GradOutputShape {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("Parameter {name} has shape {got:?}, expected {expected:?}")]
    ParameterShape {
        name: &'static str,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error(transparent)]
    Tensor(#[from] TensorError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type ConvResult<T> = Result<T, ConvError>;
