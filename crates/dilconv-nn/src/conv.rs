use std::fmt;

use dilconv_core::{Float, Tensor};
use log::{debug, trace};
use rand::Rng;

use crate::config::{Conv2dConfig, InputDims};
use crate::error::{ConvError, ConvResult};
use crate::im2col::{col2im, gemm, im2col, ConvGeometry, Trans};
use crate::layer::{Layer, ParamMut};

/// 2D convolution with configurable stride, zero padding and dilation.
///
/// Input shape:  `[in_channels, H, W]` or `[batch, in_channels, H, W]`
/// Output shape: `[out_channels, oh, ow]` or `[batch, out_channels, oh, ow]`
///
/// Each output element is
/// `bias[o] + Σ_{i,ky,kx} weight[o,i,ky,kx] * input[i, y*sh + ky*dh - ph, x*sw + kx*dw - pw]`
/// with reads outside the input treated as zero.
///
/// Parameter gradients accumulate across [`DilatedConv2d::backward`] calls
/// until [`DilatedConv2d::zero_grad`] is called.
#[derive(Debug, Clone)]
pub struct DilatedConv2d<T: Float> {
    config: Conv2dConfig,
    weight: Tensor<T>,       // [out_channels, in_channels, kH, kW]
    bias: Option<Tensor<T>>, // [out_channels]
    grad_weight: Tensor<T>,
    grad_bias: Option<Tensor<T>>,
}

impl<T: Float> DilatedConv2d<T> {
    /// Create a layer with weights drawn from `rng` (see [`Self::reset`]).
    pub fn new<R: Rng + ?Sized>(config: Conv2dConfig, rng: &mut R) -> ConvResult<Self> {
        config.validate()?;
        let mut layer = DilatedConv2d {
            weight: Tensor::zeros(config.weight_shape()),
            bias: config.bias.then(|| Tensor::zeros(config.bias_shape())),
            grad_weight: Tensor::zeros(config.weight_shape()),
            grad_bias: config.bias.then(|| Tensor::zeros(config.bias_shape())),
            config,
        };
        layer.reset(rng);
        Ok(layer)
    }

    /// Create a layer from explicit parameters.
    pub fn from_parameters(
        config: Conv2dConfig,
        weight: Tensor<T>,
        bias: Option<Tensor<T>>,
    ) -> ConvResult<Self> {
        config.validate()?;
        check_param_shape("weight", &weight, config.weight_shape())?;
        match (&bias, config.bias) {
            (Some(b), true) => check_param_shape("bias", b, config.bias_shape())?,
            (None, false) => {}
            (Some(_), false) => {
                return Err(ConvError::InvalidConfig(
                    "bias tensor supplied for a layer configured without bias".to_string(),
                ))
            }
            (None, true) => {
                return Err(ConvError::InvalidConfig(
                    "layer configured with bias but no bias tensor supplied".to_string(),
                ))
            }
        }
        Ok(DilatedConv2d {
            grad_weight: Tensor::zeros(config.weight_shape()),
            grad_bias: config.bias.then(|| Tensor::zeros(config.bias_shape())),
            weight,
            bias,
            config,
        })
    }

    /// Redraw weight and bias from `U(-stdv, stdv)`, `stdv = 1 / sqrt(kW * kH * in_channels)`.
    pub fn reset<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let stdv = T::ONE / T::from_usize(self.config.fan_in()).sqrt();
        self.weight = Tensor::rand_uniform(self.config.weight_shape(), -stdv, stdv, rng);
        if let Some(bias) = self.bias.as_mut() {
            *bias = Tensor::rand_uniform(self.config.bias_shape(), -stdv, stdv, rng);
        }
    }

    // ─── Accessors ──────────────────────────────────────────────────────────

    pub fn config(&self) -> &Conv2dConfig {
        &self.config
    }

    pub fn weight(&self) -> &Tensor<T> {
        &self.weight
    }

    pub fn weight_mut(&mut self) -> &mut Tensor<T> {
        &mut self.weight
    }

    pub fn bias(&self) -> Option<&Tensor<T>> {
        self.bias.as_ref()
    }

    pub fn bias_mut(&mut self) -> Option<&mut Tensor<T>> {
        self.bias.as_mut()
    }

    pub fn grad_weight(&self) -> &Tensor<T> {
        &self.grad_weight
    }

    pub fn grad_bias(&self) -> Option<&Tensor<T>> {
        self.grad_bias.as_ref()
    }

    /// Direct access to the weight gradient accumulator, e.g. to add a
    /// penalty term by hand before an optimizer step.
    pub fn grad_weight_mut(&mut self) -> &mut Tensor<T> {
        &mut self.grad_weight
    }

    // ─── Forward / Backward ─────────────────────────────────────────────────

    /// Output shape for `input_shape`, without running the convolution.
    pub fn output_shape(&self, input_shape: &[usize]) -> ConvResult<Vec<usize>> {
        self.config.output_shape(input_shape)
    }

    /// Forward pass over a 3D sample or a 4D batch.
    pub fn forward(&self, input: &Tensor<T>) -> ConvResult<Tensor<T>> {
        let dims = self.config.input_dims(input.dims())?;
        let geom = ConvGeometry::new(&self.config, dims.height, dims.width)?;
        debug!("{self}: forward {} -> {:?}", input.shape(), geom.output);

        let batch = dims.batch.unwrap_or(1);
        let in_len = geom.input_len();
        let out_len = self.config.out_channels * geom.column_cols();
        let mut output = vec![T::ZERO; batch * out_len];
        let mut columns = vec![T::ZERO; geom.column_rows() * geom.column_cols()];

        for (b, out) in output.chunks_exact_mut(out_len).enumerate() {
            trace!("forward sample {b}");
            im2col(&input.data()[b * in_len..(b + 1) * in_len], &geom, &mut columns);
            gemm(
                Trans::No,
                Trans::No,
                self.config.out_channels,
                geom.column_cols(),
                geom.column_rows(),
                T::ONE,
                self.weight.data(),
                &columns,
                T::ZERO,
                out,
            );
            if let Some(bias) = &self.bias {
                for (plane, &bv) in out.chunks_exact_mut(geom.column_cols()).zip(bias.data()) {
                    for v in plane.iter_mut() {
                        *v += bv;
                    }
                }
            }
        }

        Ok(Tensor::new(output, self.output_dims(&dims, &geom))?)
    }

    /// Gradient of the loss w.r.t. `input`, given the gradient w.r.t. the
    /// output of `forward(input)`.
    pub fn backward_input(
        &self,
        input: &Tensor<T>,
        grad_output: &Tensor<T>,
    ) -> ConvResult<Tensor<T>> {
        let (dims, geom) = self.check_backward(input, grad_output)?;
        debug!("{self}: backward_input {}", input.shape());

        let in_len = geom.input_len();
        let out_len = self.config.out_channels * geom.column_cols();
        let mut grad_input = vec![T::ZERO; dims.batch.unwrap_or(1) * in_len];
        let mut columns = vec![T::ZERO; geom.column_rows() * geom.column_cols()];

        for (b, grad_in) in grad_input.chunks_exact_mut(in_len).enumerate() {
            trace!("backward_input sample {b}");
            gemm(
                Trans::Yes,
                Trans::No,
                geom.column_rows(),
                geom.column_cols(),
                self.config.out_channels,
                T::ONE,
                self.weight.data(),
                &grad_output.data()[b * out_len..(b + 1) * out_len],
                T::ZERO,
                &mut columns,
            );
            col2im(&columns, &geom, grad_in);
        }

        Ok(Tensor::new(grad_input, input.shape_vec())?)
    }

    /// Add `scale * dL/dweight` and `scale * dL/dbias` into the gradient
    /// buffers. Existing contents are kept.
    pub fn accumulate_grad_parameters(
        &mut self,
        input: &Tensor<T>,
        grad_output: &Tensor<T>,
        scale: T,
    ) -> ConvResult<()> {
        let (dims, geom) = self.check_backward(input, grad_output)?;
        debug!("{self}: accumulate_grad_parameters {} scale={scale}", input.shape());

        let in_len = geom.input_len();
        let out_channels = self.config.out_channels;
        let out_len = out_channels * geom.column_cols();
        let mut columns = vec![T::ZERO; geom.column_rows() * geom.column_cols()];
        let grad_weight = self.grad_weight.data_mut();
        let mut grad_bias = self.grad_bias.as_mut().map(|g| g.data_mut());

        for b in 0..dims.batch.unwrap_or(1) {
            trace!("accumulate_grad_parameters sample {b}");
            let grad_out = &grad_output.data()[b * out_len..(b + 1) * out_len];
            im2col(&input.data()[b * in_len..(b + 1) * in_len], &geom, &mut columns);
            gemm(
                Trans::No,
                Trans::Yes,
                out_channels,
                geom.column_rows(),
                geom.column_cols(),
                scale,
                grad_out,
                &columns,
                T::ONE,
                grad_weight,
            );
            if let Some(gb) = grad_bias.as_deref_mut() {
                for (g, plane) in gb.iter_mut().zip(grad_out.chunks_exact(geom.column_cols())) {
                    *g += scale * plane.iter().copied().sum::<T>();
                }
            }
        }
        Ok(())
    }

    /// `backward_input` followed by `accumulate_grad_parameters` with scale 1.
    pub fn backward(
        &mut self,
        input: &Tensor<T>,
        grad_output: &Tensor<T>,
    ) -> ConvResult<Tensor<T>> {
        let grad_input = self.backward_input(input, grad_output)?;
        self.accumulate_grad_parameters(input, grad_output, T::ONE)?;
        Ok(grad_input)
    }

    pub fn zero_grad(&mut self) {
        self.grad_weight.fill(T::ZERO);
        if let Some(gb) = self.grad_bias.as_mut() {
            gb.fill(T::ZERO);
        }
    }

    fn output_dims(&self, dims: &InputDims, geom: &ConvGeometry) -> Vec<usize> {
        let [oh, ow] = geom.output;
        match dims.batch {
            Some(n) => vec![n, self.config.out_channels, oh, ow],
            None => vec![self.config.out_channels, oh, ow],
        }
    }

    fn check_backward(
        &self,
        input: &Tensor<T>,
        grad_output: &Tensor<T>,
    ) -> ConvResult<(InputDims, ConvGeometry)> {
        let dims = self.config.input_dims(input.dims())?;
        let geom = ConvGeometry::new(&self.config, dims.height, dims.width)?;
        let expected = self.output_dims(&dims, &geom);
        if grad_output.dims() != expected.as_slice() {
            return Err(ConvError::GradOutputShape {
                expected,
                got: grad_output.shape_vec(),
            });
        }
        Ok((dims, geom))
    }
}

fn check_param_shape<T: Float>(
    name: &'static str,
    tensor: &Tensor<T>,
    expected: Vec<usize>,
) -> ConvResult<()> {
    if tensor.dims() != expected.as_slice() {
        return Err(ConvError::ParameterShape {
            name,
            expected,
            got: tensor.shape_vec(),
        });
    }
    Ok(())
}

impl<T: Float> Layer<T> for DilatedConv2d<T> {
    fn forward(&self, input: &Tensor<T>) -> ConvResult<Tensor<T>> {
        DilatedConv2d::forward(self, input)
    }

    fn backward(&mut self, input: &Tensor<T>, grad_output: &Tensor<T>) -> ConvResult<Tensor<T>> {
        DilatedConv2d::backward(self, input, grad_output)
    }

    fn zero_grad(&mut self) {
        DilatedConv2d::zero_grad(self)
    }

    fn parameters(&mut self) -> Vec<ParamMut<'_, T>> {
        let mut params = vec![ParamMut {
            name: "weight",
            value: &mut self.weight,
            grad: &self.grad_weight,
        }];
        if let (Some(value), Some(grad)) = (self.bias.as_mut(), self.grad_bias.as_ref()) {
            params.push(ParamMut {
                name: "bias",
                value,
                grad,
            });
        }
        params
    }
}

impl<T: Float> fmt::Display for DilatedConv2d<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = &self.config;
        write!(
            f,
            "nn.SpatialDilatedConvolution({} -> {}, {}x{}",
            c.in_channels, c.out_channels, c.kernel[1], c.kernel[0]
        )?;
        if c.stride != [1, 1] || c.padding != [0, 0] {
            write!(f, ", {},{}", c.stride[1], c.stride[0])?;
        }
        if c.padding != [0, 0] {
            write!(f, ", {},{}", c.padding[1], c.padding[0])?;
        }
        write!(f, ", {},{})", c.dilation[1], c.dilation[0])?;
        if !c.bias {
            write!(f, " without bias")?;
        }
        Ok(())
    }
}
