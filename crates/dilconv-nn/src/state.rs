use std::fs;
use std::path::Path;

use dilconv_core::{Float, Tensor};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::Conv2dConfig;
use crate::conv::DilatedConv2d;
use crate::error::ConvResult;

/// Serializable snapshot of a layer: its config and parameters.
/// Gradient buffers are not part of the state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "T: Float")]
pub struct ConvState<T: Float> {
    pub config: Conv2dConfig,
    pub weight: Tensor<T>,
    #[serde(default)]
    pub bias: Option<Tensor<T>>,
}

impl<T: Float> DilatedConv2d<T> {
    pub fn state(&self) -> ConvState<T> {
        ConvState {
            config: *self.config(),
            weight: self.weight().clone(),
            bias: self.bias().cloned(),
        }
    }

    /// Rebuild a layer from a snapshot, re-checking every shape.
    pub fn from_state(state: ConvState<T>) -> ConvResult<Self> {
        DilatedConv2d::from_parameters(state.config, state.weight, state.bias)
    }

    /// Save config and parameters to a JSON file.
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> ConvResult<()> {
        let json = serde_json::to_string_pretty(&self.state())?;
        fs::write(path.as_ref(), json)?;
        debug!("saved {self} to {}", path.as_ref().display());
        Ok(())
    }

    /// Load a layer saved with [`DilatedConv2d::save_json`].
    pub fn load_json<P: AsRef<Path>>(path: P) -> ConvResult<Self> {
        let json = fs::read_to_string(path.as_ref())?;
        let state: ConvState<T> = serde_json::from_str(&json)?;
        let layer = DilatedConv2d::from_state(state)?;
        debug!("loaded {layer} from {}", path.as_ref().display());
        Ok(layer)
    }
}
