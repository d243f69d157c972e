//! Finite-difference gradient check for [`DilatedConv2d`].
//!
//! The scalar loss is `L = Σ forward(x) ⊙ probe` for a random probe tensor,
//! which makes `dL/doutput = probe`. Analytic gradients from `backward` are
//! compared with central differences `(L(θ + ε) - L(θ - ε)) / 2ε` taken
//! over every element of the input, weight and bias.

use dilconv_core::{DiffStats, Float, Tensor, Tolerance};
use log::{debug, warn};
use rand::Rng;

use crate::conv::DilatedConv2d;
use crate::error::ConvResult;

/// Comparison result for one gradient.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradCheckEntry {
    pub stats: DiffStats,
    pub within_tolerance: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradCheckReport {
    pub input: GradCheckEntry,
    pub weight: GradCheckEntry,
    pub bias: Option<GradCheckEntry>,
}

impl GradCheckReport {
    pub fn passed(&self) -> bool {
        self.input.within_tolerance
            && self.weight.within_tolerance
            && self.bias.map_or(true, |b| b.within_tolerance)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradCheck {
    pub epsilon: f64,
    pub tolerance: Tolerance,
}

impl Default for GradCheck {
    fn default() -> Self {
        GradCheck {
            epsilon: 1e-6,
            tolerance: Tolerance::new(1e-6, 1e-5),
        }
    }
}

impl GradCheck {
    pub fn new(epsilon: f64, tolerance: Tolerance) -> Self {
        GradCheck { epsilon, tolerance }
    }

    /// Check every gradient of `layer` at `input`. `layer` itself is not
    /// modified; the probe tensor is drawn from `rng`.
    pub fn run<T: Float, R: Rng + ?Sized>(
        &self,
        layer: &DilatedConv2d<T>,
        input: &Tensor<T>,
        rng: &mut R,
    ) -> ConvResult<GradCheckReport> {
        let probe = Tensor::randn(layer.output_shape(input.dims())?, rng);
        debug!("gradient check of {layer} at {}", input.shape());

        let mut analytic = layer.clone();
        analytic.zero_grad();
        let grad_input = analytic.backward(input, &probe)?;

        let numeric_input = self.numeric(input, |x| loss(layer, x, &probe))?;
        let numeric_weight = self.numeric(layer.weight(), |w| {
            let mut perturbed = layer.clone();
            *perturbed.weight_mut() = w.clone();
            loss(&perturbed, input, &probe)
        })?;
        let numeric_bias = match layer.bias() {
            Some(bias) => Some(self.numeric(bias, |b| {
                let mut perturbed = layer.clone();
                if let Some(slot) = perturbed.bias_mut() {
                    *slot = b.clone();
                }
                loss(&perturbed, input, &probe)
            })?),
            None => None,
        };

        let report = GradCheckReport {
            input: self.entry(&grad_input, &numeric_input)?,
            weight: self.entry(analytic.grad_weight(), &numeric_weight)?,
            bias: match (analytic.grad_bias(), numeric_bias.as_ref()) {
                (Some(a), Some(n)) => Some(self.entry(a, n)?),
                _ => None,
            },
        };
        if !report.passed() {
            warn!("gradient check of {layer} failed: {report:?}");
        }
        Ok(report)
    }

    /// Central-difference gradient of `f` w.r.t. every element of `at`.
    fn numeric<T: Float, F>(&self, at: &Tensor<T>, mut f: F) -> ConvResult<Tensor<T>>
    where
        F: FnMut(&Tensor<T>) -> ConvResult<T>,
    {
        let eps = T::from_f64(self.epsilon);
        let mut point = Tensor::new(at.data().to_vec(), at.shape_vec())?;
        let mut grad = Vec::with_capacity(at.numel());
        for i in 0..at.numel() {
            let original = at.data()[i];
            point.data_mut()[i] = original + eps;
            let plus = f(&point)?;
            point.data_mut()[i] = original - eps;
            let minus = f(&point)?;
            point.data_mut()[i] = original;
            grad.push((plus - minus) / (T::TWO * eps));
        }
        Ok(Tensor::new(grad, at.shape_vec())?)
    }

    fn entry<T: Float>(
        &self,
        analytic: &Tensor<T>,
        numeric: &Tensor<T>,
    ) -> ConvResult<GradCheckEntry> {
        Ok(GradCheckEntry {
            stats: DiffStats::between(analytic, numeric)?,
            within_tolerance: analytic.allclose(numeric, self.tolerance)?,
        })
    }
}

fn loss<T: Float>(layer: &DilatedConv2d<T>, input: &Tensor<T>, probe: &Tensor<T>) -> ConvResult<T> {
    Ok(layer.forward(input)?.dot(probe)?)
}
