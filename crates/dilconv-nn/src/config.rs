use serde::{Deserialize, Serialize};

use crate::error::{ConvError, ConvResult};

fn unit_pair() -> [usize; 2] {
    [1, 1]
}

fn enabled() -> bool {
    true
}

/// Immutable parameters of a dilated 2D convolution.
///
/// Spatial pairs are ordered `[height, width]`. Fields other than the channel
/// counts and kernel fall back to the standard-convolution defaults when
/// omitted from a serialized config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conv2dConfig {
    pub in_channels: usize,
    pub out_channels: usize,
    pub kernel: [usize; 2],
    #[serde(default = "unit_pair")]
    pub stride: [usize; 2],
    #[serde(default)]
    pub padding: [usize; 2],
    #[serde(default = "unit_pair")]
    pub dilation: [usize; 2],
    #[serde(default = "enabled")]
    pub bias: bool,
}

/// Batch size (if the input is 4D) and spatial size of a validated input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputDims {
    pub batch: Option<usize>,
    pub height: usize,
    pub width: usize,
}

impl Conv2dConfig {
    /// Stride 1, no padding, no dilation, with bias.
    pub fn new(in_channels: usize, out_channels: usize, kernel: [usize; 2]) -> Self {
        Conv2dConfig {
            in_channels,
            out_channels,
            kernel,
            stride: [1, 1],
            padding: [0, 0],
            dilation: [1, 1],
            bias: true,
        }
    }

    /// The eight-integer form: width before height for every pair.
    #[allow(clippy::too_many_arguments)]
    pub fn spatial(
        n_input_plane: usize,
        n_output_plane: usize,
        kw: usize,
        kh: usize,
        dw: usize,
        dh: usize,
        pad_w: usize,
        pad_h: usize,
    ) -> Self {
        Self::new(n_input_plane, n_output_plane, [kh, kw])
            .with_stride([dh, dw])
            .with_padding([pad_h, pad_w])
    }

    /// The ten-integer form: [`Conv2dConfig::spatial`] plus dilation.
    #[allow(clippy::too_many_arguments)]
    pub fn dilated(
        n_input_plane: usize,
        n_output_plane: usize,
        kw: usize,
        kh: usize,
        dw: usize,
        dh: usize,
        pad_w: usize,
        pad_h: usize,
        dilation_w: usize,
        dilation_h: usize,
    ) -> Self {
        Self::spatial(n_input_plane, n_output_plane, kw, kh, dw, dh, pad_w, pad_h)
            .with_dilation([dilation_h, dilation_w])
    }

    pub fn with_stride(mut self, stride: [usize; 2]) -> Self {
        self.stride = stride;
        self
    }

    pub fn with_padding(mut self, padding: [usize; 2]) -> Self {
        self.padding = padding;
        self
    }

    pub fn with_dilation(mut self, dilation: [usize; 2]) -> Self {
        self.dilation = dilation;
        self
    }

    pub fn without_bias(mut self) -> Self {
        self.bias = false;
        self
    }

    pub fn validate(&self) -> ConvResult<()> {
        let checks = [
            ("in_channels", self.in_channels),
            ("out_channels", self.out_channels),
            ("kernel height", self.kernel[0]),
            ("kernel width", self.kernel[1]),
            ("stride height", self.stride[0]),
            ("stride width", self.stride[1]),
            ("dilation height", self.dilation[0]),
            ("dilation width", self.dilation[1]),
        ];
        for (name, value) in checks {
            if value == 0 {
                return Err(ConvError::InvalidConfig(format!("{name} must be at least 1")));
            }
        }
        Ok(())
    }

    /// Receptive field of the dilated kernel: `dilation * (k - 1) + 1`.
    /// A zero-sized kernel axis counts as extent 1; [`Self::validate`] rejects it.
    pub fn kernel_extent(&self) -> [usize; 2] {
        [
            self.dilation[0] * self.kernel[0].saturating_sub(1) + 1,
            self.dilation[1] * self.kernel[1].saturating_sub(1) + 1,
        ]
    }

    /// Number of inputs feeding one output element.
    pub fn fan_in(&self) -> usize {
        self.in_channels * self.kernel[0] * self.kernel[1]
    }

    pub fn weight_shape(&self) -> Vec<usize> {
        vec![self.out_channels, self.in_channels, self.kernel[0], self.kernel[1]]
    }

    pub fn bias_shape(&self) -> Vec<usize> {
        vec![self.out_channels]
    }

    /// `floor((size + 2 * padding - extent) / stride) + 1` per axis.
    ///
    /// An empty spatial axis is too small whatever the padding.
    pub fn output_size(&self, height: usize, width: usize) -> ConvResult<[usize; 2]> {
        self.validate()?;
        let extent = self.kernel_extent();
        let padded = [height + 2 * self.padding[0], width + 2 * self.padding[1]];
        if height == 0 || width == 0 || padded[0] < extent[0] || padded[1] < extent[1] {
            return Err(ConvError::InputTooSmall {
                input: [height, width],
                padded,
                extent,
            });
        }
        Ok([
            (padded[0] - extent[0]) / self.stride[0] + 1,
            (padded[1] - extent[1]) / self.stride[1] + 1,
        ])
    }

    /// Checks rank, channel count and spatial size of an input shape.
    pub fn input_dims(&self, dims: &[usize]) -> ConvResult<InputDims> {
        let (batch, rest) = match dims.len() {
            3 => (None, dims),
            4 => (Some(dims[0]), &dims[1..]),
            rank => return Err(ConvError::InvalidRank(rank)),
        };
        if rest[0] != self.in_channels {
            return Err(ConvError::ChannelMismatch {
                expected: self.in_channels,
                got: rest[0],
            });
        }
        self.output_size(rest[1], rest[2])?;
        Ok(InputDims {
            batch,
            height: rest[1],
            width: rest[2],
        })
    }

    /// Output shape for an input shape, keeping the batch axis if present.
    pub fn output_shape(&self, input_shape: &[usize]) -> ConvResult<Vec<usize>> {
        let dims = self.input_dims(input_shape)?;
        let [oh, ow] = self.output_size(dims.height, dims.width)?;
        Ok(match dims.batch {
            Some(n) => vec![n, self.out_channels, oh, ow],
            None => vec![self.out_channels, oh, ow],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn floor_formula(size: usize, k: usize, s: usize, p: usize, d: usize) -> usize {
        ((size + 2 * p) as f64 - (d * (k - 1)) as f64 - 1.0).div_euclid(s as f64) as usize + 1
    }

    #[test]
    fn test_output_size_matches_floor_formula() {
        for size in [5, 6, 7, 11] {
            for k in 1..=3 {
                for s in 1..=3 {
                    for p in 0..=2 {
                        for d in 1..=3 {
                            let cfg = Conv2dConfig::new(1, 1, [k, k])
                                .with_stride([s, s])
                                .with_padding([p, p])
                                .with_dilation([d, d]);
                            match cfg.output_size(size, size) {
                                Ok([oh, ow]) => {
                                    let expected = floor_formula(size, k, s, p, d);
                                    assert_eq!((oh, ow), (expected, expected));
                                }
                                Err(ConvError::InputTooSmall { .. }) => {
                                    assert!(size + 2 * p < d * (k - 1) + 1);
                                }
                                Err(e) => panic!("unexpected error {e}"),
                            }
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_padded_3x3_on_6x6() {
        // floor((6 + 4 - 2 - 1) / 1) + 1
        let cfg = Conv2dConfig::spatial(3, 5, 3, 3, 1, 1, 2, 2);
        assert_eq!(cfg.output_shape(&[3, 6, 6]).unwrap(), vec![5, 8, 8]);
    }

    #[test]
    fn test_strided_3x3_on_6x6() {
        // floor((6 + 2 - 2 - 1) / 2) + 1
        let cfg = Conv2dConfig::spatial(3, 5, 3, 3, 2, 2, 1, 1);
        assert_eq!(cfg.output_size(6, 6).unwrap(), [3, 3]);
    }

    #[test]
    fn test_asymmetric_dilated() {
        let cfg = Conv2dConfig::dilated(2, 4, 3, 2, 1, 2, 0, 1, 2, 3);
        assert_eq!(cfg.kernel, [2, 3]);
        assert_eq!(cfg.stride, [2, 1]);
        assert_eq!(cfg.padding, [1, 0]);
        assert_eq!(cfg.dilation, [3, 2]);
        assert_eq!(cfg.kernel_extent(), [4, 5]);
        // h: (7 + 2 - 4) / 2 + 1 = 3, w: (9 - 5) / 1 + 1 = 5
        assert_eq!(cfg.output_shape(&[8, 2, 7, 9]).unwrap(), vec![8, 4, 3, 5]);
    }

    #[test]
    fn test_shape_errors() {
        let cfg = Conv2dConfig::new(3, 2, [3, 3]).with_dilation([3, 3]);
        assert!(matches!(
            cfg.output_shape(&[4, 6, 6]),
            Err(ConvError::ChannelMismatch { expected: 3, got: 4 })
        ));
        assert!(matches!(
            cfg.output_shape(&[3, 6, 6]),
            Err(ConvError::InputTooSmall { extent: [7, 7], .. })
        ));
        assert!(matches!(cfg.output_shape(&[3, 6]), Err(ConvError::InvalidRank(2))));
        assert!(matches!(
            cfg.output_shape(&[1, 1, 3, 9, 9]),
            Err(ConvError::InvalidRank(5))
        ));
    }

    #[test]
    fn test_empty_spatial_axis_is_too_small() {
        let cfg = Conv2dConfig::spatial(1, 1, 3, 3, 1, 1, 2, 2);
        for dims in [[1, 0, 0], [1, 0, 5], [1, 5, 0]] {
            assert!(matches!(cfg.output_shape(&dims), Err(ConvError::InputTooSmall { .. })));
        }
        assert!(matches!(
            cfg.output_shape(&[2, 1, 0, 4]),
            Err(ConvError::InputTooSmall { input: [0, 4], .. })
        ));
    }

    #[test]
    fn test_shape_inference_rejects_invalid_config() {
        let zero_stride = Conv2dConfig::new(1, 1, [3, 3]).with_stride([0, 1]);
        let zero_kernel = Conv2dConfig::new(1, 1, [0, 3]);
        let zero_dilation = Conv2dConfig::new(1, 1, [3, 3]).with_dilation([1, 0]);
        for cfg in [zero_stride, zero_kernel, zero_dilation] {
            assert!(matches!(cfg.output_shape(&[1, 6, 6]), Err(ConvError::InvalidConfig(_))));
            assert!(matches!(cfg.output_size(6, 6), Err(ConvError::InvalidConfig(_))));
        }
        assert_eq!(zero_kernel.kernel_extent(), [1, 3]);
    }

    #[test]
    fn test_validate() {
        assert!(Conv2dConfig::new(3, 2, [3, 3]).validate().is_ok());
        assert!(Conv2dConfig::new(0, 2, [3, 3]).validate().is_err());
        assert!(Conv2dConfig::new(3, 2, [3, 0]).validate().is_err());
        assert!(Conv2dConfig::new(3, 2, [3, 3]).with_stride([1, 0]).validate().is_err());
        assert!(Conv2dConfig::new(3, 2, [3, 3]).with_dilation([0, 1]).validate().is_err());
    }

    #[test]
    fn test_serde_defaults() {
        let cfg: Conv2dConfig =
            serde_json::from_str(r#"{"in_channels":3,"out_channels":5,"kernel":[3,3]}"#).unwrap();
        assert_eq!(cfg, Conv2dConfig::new(3, 5, [3, 3]));

        let dilated = Conv2dConfig::dilated(3, 5, 3, 3, 1, 1, 2, 2, 2, 2).without_bias();
        let json = serde_json::to_string(&dilated).unwrap();
        assert_eq!(serde_json::from_str::<Conv2dConfig>(&json).unwrap(), dilated);
    }
}
