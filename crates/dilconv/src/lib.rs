//! # dilconv
//!
//! Dilated 2D convolution with an explicit forward/backward contract.
//!
//! ## Modules
//!
//! - **core**: shared-storage tensors, shapes and tolerance-based comparison
//! - **nn**: `DilatedConv2d` with shape inference and im2col kernels, plus a
//!   direct reference kernel, gradient check and JSON state
//! - **optim**: `SGD` with an optional `L2` regularizer hook

/// Core tensor engine.
pub use dilconv_core as core;

/// Convolution layer, kernels and gradient check.
pub use dilconv_nn as nn;

/// Optimizers and regularizers.
pub use dilconv_optim as optim;
