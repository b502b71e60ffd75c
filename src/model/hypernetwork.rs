use rand::Rng;
use tracing::debug;

use crate::{
    instruction::activation::tanh_f32_cpu,
    layer::linear::LinearLayer,
    model::{architecture::ArchitecturePlan, weight_init::WeightInit},
    tensor::Tensor,
    utils::error::{HyperUnetError, Result},
};

pub const DEFAULT_HIDDEN_DIM: usize = 32;

/// Maps a `(batch, num_hyperparams)` vector to one flat `(batch, out_dim)`
/// buffer of U-Net kernels and biases.
///
/// Three linear stages with no activation between them; the output stage is
/// bounded into [-1, 1] with tanh.
#[derive(Clone, Debug)]
pub struct HyperNetwork {
    lin1: LinearLayer,
    lin2: LinearLayer,
    lin_out: LinearLayer,
}

impl HyperNetwork {
    /// Network sized for `plan`, initialised with the width-scaled normal.
    pub fn new<R: Rng + ?Sized>(
        num_hyperparams: usize,
        hidden_dim: usize,
        plan: &ArchitecturePlan,
        rng: &mut R,
    ) -> Result<Self> {
        let init = WeightInit::ScaledNormal { width: plan.nh() };
        Self::new_with(num_hyperparams, hidden_dim, plan.out_dim(), init, rng)
    }

    pub fn new_with<R: Rng + ?Sized>(
        num_hyperparams: usize,
        hidden_dim: usize,
        out_dim: usize,
        init: WeightInit,
        rng: &mut R,
    ) -> Result<Self> {
        let lin1 = LinearLayer::new_with(num_hyperparams, hidden_dim, init, rng)?;
        let lin2 = LinearLayer::new_with(hidden_dim, hidden_dim, init, rng)?;
        let lin_out = LinearLayer::new_with(hidden_dim, out_dim, init, rng)?;

        debug!(num_hyperparams, hidden_dim, out_dim, "initialised hypernetwork");
        Ok(Self {
            lin1,
            lin2,
            lin_out,
        })
    }

    pub fn num_hyperparams(&self) -> usize {
        self.lin1.in_features
    }

    pub fn hidden_dim(&self) -> usize {
        self.lin1.out_features
    }

    pub fn out_dim(&self) -> usize {
        self.lin_out.out_features
    }

    pub fn parameter_count(&self) -> usize {
        self.stages().iter().map(|l| l.parameter_count()).sum()
    }

    pub fn stages(&self) -> [&LinearLayer; 3] {
        [&self.lin1, &self.lin2, &self.lin_out]
    }

    /// The three stages, for an external optimiser.
    pub fn stages_mut(&mut self) -> [&mut LinearLayer; 3] {
        [&mut self.lin1, &mut self.lin2, &mut self.lin_out]
    }

    pub fn forward(&self, hyperparams: &Tensor) -> Result<Tensor> {
        let dims = hyperparams.dims();
        if dims.len() != 2 || dims[1] != self.num_hyperparams() {
            return Err(HyperUnetError::shape(
                "hyperparameters",
                format!("(batch, {})", self.num_hyperparams()),
                dims,
            ));
        }

        let x = self
            .lin1
            .forward(hyperparams)
            .map_err(|e| e.in_context("hypernetwork lin1"))?;
        let x = self
            .lin2
            .forward(&x)
            .map_err(|e| e.in_context("hypernetwork lin2"))?;
        let mut x = self
            .lin_out
            .forward(&x)
            .map_err(|e| e.in_context("hypernetwork lin_out"))?;
        tanh_f32_cpu(x.data_mut());
        Ok(x)
    }
}
