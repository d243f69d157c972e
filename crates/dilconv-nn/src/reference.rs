//! Direct nested-loop convolution.
//!
//! Evaluates the forward and adjoint formulas element by element with no
//! unrolling, so it shares nothing with the im2col path except the config.
//! Slow; meant for cross-checking [`crate::DilatedConv2d`].

use dilconv_core::{Float, Tensor};

use crate::config::Conv2dConfig;
use crate::error::ConvResult;

/// Gradients produced by [`conv2d_backward`].
#[derive(Debug, Clone)]
pub struct DirectGradients<T: Float> {
    pub input: Tensor<T>,
    pub weight: Tensor<T>,
    pub bias: Tensor<T>,
}

/// Input coordinate along `axis` for output `out` at kernel tap `tap`, if not padding.
fn source(
    config: &Conv2dConfig,
    axis: usize,
    out: usize,
    tap: usize,
    size: usize,
) -> Option<usize> {
    let pos = (out * config.stride[axis] + tap * config.dilation[axis]) as isize
        - config.padding[axis] as isize;
    (pos >= 0 && (pos as usize) < size).then_some(pos as usize)
}

/// Promote a 3D input to a batch of one.
fn as_batch<T: Float>(input: &Tensor<T>) -> ConvResult<Tensor<T>> {
    Ok(if input.ndim() == 3 {
        input.unsqueeze(0)?
    } else {
        input.clone()
    })
}

pub fn conv2d_forward<T: Float>(
    config: &Conv2dConfig,
    weight: &Tensor<T>,
    bias: Option<&Tensor<T>>,
    input: &Tensor<T>,
) -> ConvResult<Tensor<T>> {
    let out_shape = config.output_shape(input.dims())?;
    let x = as_batch(input)?;
    let (batch, h, w) = (x.dims()[0], x.dims()[2], x.dims()[3]);
    let [kh, kw] = config.kernel;
    let [out_h, out_w] = config.output_size(h, w)?;

    let mut output = Tensor::zeros(vec![batch, config.out_channels, out_h, out_w]);
    for b in 0..batch {
        for oc in 0..config.out_channels {
            for oh in 0..out_h {
                for ow in 0..out_w {
                    let mut sum = match bias {
                        Some(bias) => bias.get(&[oc])?,
                        None => T::ZERO,
                    };
                    for ic in 0..config.in_channels {
                        for ky in 0..kh {
                            let Some(ih) = source(config, 0, oh, ky, h) else {
                                continue;
                            };
                            for kx in 0..kw {
                                if let Some(iw) = source(config, 1, ow, kx, w) {
                                    sum +=
                                        weight.get(&[oc, ic, ky, kx])? * x.get(&[b, ic, ih, iw])?;
                                }
                            }
                        }
                    }
                    output.set(&[b, oc, oh, ow], sum)?;
                }
            }
        }
    }
    Ok(output.reshape(out_shape)?)
}

/// Gradients of `Σ grad_output ⊙ conv(input)` w.r.t. input, weight and bias.
pub fn conv2d_backward<T: Float>(
    config: &Conv2dConfig,
    weight: &Tensor<T>,
    input: &Tensor<T>,
    grad_output: &Tensor<T>,
) -> ConvResult<DirectGradients<T>> {
    config.output_shape(input.dims())?;
    let x = as_batch(input)?;
    let gy = as_batch(grad_output)?;
    let (batch, h, w) = (x.dims()[0], x.dims()[2], x.dims()[3]);
    let [kh, kw] = config.kernel;
    let [out_h, out_w] = config.output_size(h, w)?;

    let mut grad_input = Tensor::zeros(x.shape_vec());
    let mut grad_weight = Tensor::zeros(config.weight_shape());
    let mut grad_bias = Tensor::zeros(config.bias_shape());

    for b in 0..batch {
        for oc in 0..config.out_channels {
            for oh in 0..out_h {
                for ow in 0..out_w {
                    let g = gy.get(&[b, oc, oh, ow])?;
                    grad_bias.set(&[oc], grad_bias.get(&[oc])? + g)?;
                    for ic in 0..config.in_channels {
                        for ky in 0..kh {
                            let Some(ih) = source(config, 0, oh, ky, h) else {
                                continue;
                            };
                            for kx in 0..kw {
                                let Some(iw) = source(config, 1, ow, kx, w) else {
                                    continue;
                                };
                                let w_idx = [oc, ic, ky, kx];
                                let x_idx = [b, ic, ih, iw];
                                let gi = grad_input.get(&x_idx)? + weight.get(&w_idx)? * g;
                                grad_input.set(&x_idx, gi)?;
                                let gw = grad_weight.get(&w_idx)? + x.get(&x_idx)? * g;
                                grad_weight.set(&w_idx, gw)?;
                            }
                        }
                    }
                }
            }
        }
    }

    Ok(DirectGradients {
        input: grad_input.reshape(input.shape_vec())?,
        weight: grad_weight,
        bias: grad_bias,
    })
}
