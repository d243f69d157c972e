pub mod error;
pub mod optimizer;
pub mod regularizer;

pub use error::{OptimError, OptimResult};
pub use optimizer::{Optimizer, SGD};
pub use regularizer::{Regularizer, L2};
