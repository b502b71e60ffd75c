use rand::Rng;

use crate::{
    instruction::gemm,
    model::weight_init::WeightInit,
    tensor::{Tensor, TensorDesc},
    utils::error::{HyperUnetError, Result},
};

/// Fully connected stage: `y = x W^T + b` with `W` of shape (out, in).
#[derive(Clone, Debug)]
pub struct LinearLayer {
    pub in_features: usize,
    pub out_features: usize,
    weights: Tensor,
    bias: Tensor,
}

impl LinearLayer {
    pub fn new_with<R: Rng + ?Sized>(
        in_features: usize,
        out_features: usize,
        init: WeightInit,
        rng: &mut R,
    ) -> Result<Self> {
        let weight_desc = TensorDesc::new(vec![out_features, in_features]);

        let weight_values = init.init(&weight_desc, weight_desc.num_elements(), rng);
        let weights = Tensor::new(weight_desc.dims().to_vec(), weight_values)?;
        let bias = Tensor::new(vec![out_features], init.init(&weight_desc, out_features, rng))?;

        Ok(Self {
            in_features,
            out_features,
            weights,
            bias,
        })
    }

    pub fn weights(&self) -> &Tensor {
        &self.weights
    }

    pub fn bias(&self) -> &Tensor {
        &self.bias
    }

    /// Mutable weight and bias, for an external optimiser. Shapes are
    /// re-checked on every forward call.
    pub fn parameters_mut(&mut self) -> (&mut Tensor, &mut Tensor) {
        (&mut self.weights, &mut self.bias)
    }

    pub fn parameter_count(&self) -> usize {
        self.in_features * self.out_features + self.out_features
    }

    pub fn forward(&self, input: &Tensor) -> Result<Tensor> {
        if input.ndim() != 2 || input.dims()[1] != self.in_features {
            return Err(HyperUnetError::shape(
                "linear layer input",
                format!("(batch, {})", self.in_features),
                input.dims(),
            ));
        }

        if self.weights.dims() != [self.out_features, self.in_features] {
            return Err(HyperUnetError::shape(
                "linear layer weights",
                [self.out_features, self.in_features],
                self.weights.dims(),
            ));
        }
        if self.bias.dims() != [self.out_features] {
            return Err(HyperUnetError::shape(
                "linear layer bias",
                [self.out_features],
                self.bias.dims(),
            ));
        }

        let batch = input.dims()[0];
        let mut output = Tensor::zeros(vec![batch, self.out_features]);
        gemm::f32_cpu(
            [batch, self.in_features],
            [self.out_features, self.in_features],
            input.data(),
            self.weights.data(),
            Some(self.bias.data()),
            output.data_mut(),
        );
        Ok(output)
    }
}
