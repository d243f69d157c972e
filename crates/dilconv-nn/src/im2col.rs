//! Column-unrolling kernels behind [`crate::DilatedConv2d`].
//!
//! `im2col` lays every receptive field of one sample out as a column of a
//! `[C * kh * kw, oh * ow]` matrix so the convolution becomes a single GEMM
//! against the `[out, C * kh * kw]` weight matrix. `col2im` is its adjoint:
//! it scatters column entries back onto the input positions they were read
//! from, summing where receptive fields overlap.

use dilconv_core::Float;

use crate::config::Conv2dConfig;
use crate::error::ConvResult;

/// Spatial bookkeeping for one sample of a convolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvGeometry {
    pub channels: usize,
    pub input: [usize; 2],
    pub kernel: [usize; 2],
    pub stride: [usize; 2],
    pub padding: [usize; 2],
    pub dilation: [usize; 2],
    pub output: [usize; 2],
}

impl ConvGeometry {
    pub fn new(config: &Conv2dConfig, height: usize, width: usize) -> ConvResult<Self> {
        let output = config.output_size(height, width)?;
        Ok(ConvGeometry {
            channels: config.in_channels,
            input: [height, width],
            kernel: config.kernel,
            stride: config.stride,
            padding: config.padding,
            dilation: config.dilation,
            output,
        })
    }

    /// Rows of the column matrix: one per (channel, kernel row, kernel col).
    pub fn column_rows(&self) -> usize {
        self.channels * self.kernel[0] * self.kernel[1]
    }

    /// Columns of the column matrix: one per output position.
    pub fn column_cols(&self) -> usize {
        self.output[0] * self.output[1]
    }

    pub fn input_len(&self) -> usize {
        self.channels * self.input[0] * self.input[1]
    }

    /// Input coordinate read by output index `out` at kernel tap `tap` along
    /// `axis`, or `None` when it falls in the zero padding.
    #[inline]
    fn source(&self, axis: usize, out: usize, tap: usize) -> Option<usize> {
        let pos = out * self.stride[axis] + tap * self.dilation[axis];
        pos.checked_sub(self.padding[axis])
            .filter(|&p| p < self.input[axis])
    }
}

/// Unroll one `[C, H, W]` sample into `columns` (`column_rows × column_cols`).
pub fn im2col<T: Float>(input: &[T], geom: &ConvGeometry, columns: &mut [T]) {
    debug_assert_eq!(input.len(), geom.input_len());
    debug_assert_eq!(columns.len(), geom.column_rows() * geom.column_cols());

    let [height, width] = geom.input;
    let [kh, kw] = geom.kernel;
    let [oh, ow] = geom.output;
    let cols = geom.column_cols();

    for c in 0..geom.channels {
        let plane = &input[c * height * width..(c + 1) * height * width];
        for ky in 0..kh {
            for kx in 0..kw {
                let row = (c * kh + ky) * kw + kx;
                let dst = &mut columns[row * cols..(row + 1) * cols];
                for oy in 0..oh {
                    let line = &mut dst[oy * ow..(oy + 1) * ow];
                    let Some(iy) = geom.source(0, oy, ky) else {
                        line.fill(T::ZERO);
                        continue;
                    };
                    for (ox, v) in line.iter_mut().enumerate() {
                        *v = match geom.source(1, ox, kx) {
                            Some(ix) => plane[iy * width + ix],
                            None => T::ZERO,
                        };
                    }
                }
            }
        }
    }
}

/// Scatter-add `columns` back onto a `[C, H, W]` gradient buffer.
pub fn col2im<T: Float>(columns: &[T], geom: &ConvGeometry, grad_input: &mut [T]) {
    debug_assert_eq!(grad_input.len(), geom.input_len());
    debug_assert_eq!(columns.len(), geom.column_rows() * geom.column_cols());

    let [height, width] = geom.input;
    let [kh, kw] = geom.kernel;
    let [oh, ow] = geom.output;
    let cols = geom.column_cols();

    for c in 0..geom.channels {
        let plane = &mut grad_input[c * height * width..(c + 1) * height * width];
        for ky in 0..kh {
            for kx in 0..kw {
                let row = (c * kh + ky) * kw + kx;
                let src = &columns[row * cols..(row + 1) * cols];
                for oy in 0..oh {
                    let Some(iy) = geom.source(0, oy, ky) else {
                        continue;
                    };
                    for ox in 0..ow {
                        if let Some(ix) = geom.source(1, ox, kx) {
                            plane[iy * width + ix] += src[oy * ow + ox];
                        }
                    }
                }
            }
        }
    }
}

/// Whether a GEMM operand is read transposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trans {
    No,
    Yes,
}

/// Row-major `C = alpha * op(A) * op(B) + beta * C`, `op(A)` is `m × k`,
/// `op(B)` is `k × n`. With `beta == 0` the previous contents of `C` are
/// ignored.
#[allow(clippy::too_many_arguments)]
pub fn gemm<T: Float>(
    trans_a: Trans,
    trans_b: Trans,
    m: usize,
    n: usize,
    k: usize,
    alpha: T,
    a: &[T],
    b: &[T],
    beta: T,
    c: &mut [T],
) {
    debug_assert_eq!(a.len(), m * k);
    debug_assert_eq!(b.len(), k * n);
    debug_assert_eq!(c.len(), m * n);

    if beta == T::ZERO {
        c.fill(T::ZERO);
    } else if beta != T::ONE {
        for v in c.iter_mut() {
            *v *= beta;
        }
    }

    for i in 0..m {
        let row = &mut c[i * n..(i + 1) * n];
        for p in 0..k {
            let a_ip = match trans_a {
                Trans::No => a[i * k + p],
                Trans::Yes => a[p * m + i],
            };
            let scaled = alpha * a_ip;
            match trans_b {
                Trans::No => {
                    for (cv, &bv) in row.iter_mut().zip(&b[p * n..(p + 1) * n]) {
                        *cv += scaled * bv;
                    }
                }
                Trans::Yes => {
                    for (j, cv) in row.iter_mut().enumerate() {
                        *cv += scaled * b[j * k + p];
                    }
                }
            }
        }
    }
}
