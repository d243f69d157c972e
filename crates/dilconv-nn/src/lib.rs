pub mod config;
pub mod conv;
pub mod error;
pub mod gradcheck;
pub mod im2col;
pub mod layer;
pub mod reference;
pub mod state;

pub use config::{Conv2dConfig, InputDims};
pub use conv::DilatedConv2d;
pub use error::{ConvError, ConvResult};
pub use gradcheck::{GradCheck, GradCheckEntry, GradCheckReport};
pub use layer::{Layer, ParamMut};
pub use state::ConvState;
