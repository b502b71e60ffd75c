use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::layer::batch_conv2d::ConvRouting;
use crate::model::hypernetwork::DEFAULT_HIDDEN_DIM;
use crate::utils::error::{HyperUnetError, Result};

/// Construction parameters for [`Unet`](crate::model::unet::Unet).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnetConfig {
    pub num_hyperparams: usize,
    /// Hidden channel width of every U-Net stage.
    pub nh: usize,
    /// Width of the hypernetwork's two hidden stages.
    pub hidden_dim: usize,
    pub residual: bool,
    /// Seed for hypernetwork initialisation. Resolved by `build` when unset.
    pub seed: Option<u64>,
    pub routing: ConvRouting,
}

impl UnetConfig {
    pub fn build(mut self) -> Result<Self> {
        self.validate()?;

        if self.seed.is_none() {
            self.seed = Some(rand::rng().random());
        }

        Ok(self)
    }

    fn validate(&self) -> Result<()> {
        if self.num_hyperparams == 0 {
            return Err(HyperUnetError::Config(
                "num_hyperparams must be positive".to_string(),
            ));
        }
        if self.nh == 0 {
            return Err(HyperUnetError::Config(
                "hidden channel width nh must be positive".to_string(),
            ));
        }
        if self.hidden_dim == 0 {
            return Err(HyperUnetError::Config(
                "hypernetwork hidden_dim must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for UnetConfig {
    fn default() -> Self {
        Self {
            num_hyperparams: 1,
            nh: 64,
            hidden_dim: DEFAULT_HIDDEN_DIM,
            residual: true,
            seed: None,
            routing: ConvRouting::Grouped,
        }
    }
}
