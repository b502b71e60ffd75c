use rand::Rng;

use crate::tensor::TensorDesc;
use crate::utils::math::normal_sample;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum WeightInit {
    /// Zero-mean normal with `std = 1/sqrt(fan_in * width)`. `width` is the
    /// generated network's channel width, so generated kernels keep a variance
    /// comparable to a directly initialised conv of that width.
    ScaledNormal { width: usize },
    Constant(f32),
}

impl WeightInit {
    pub fn std_dev(&self, fan_in: usize) -> f32 {
        match self {
            WeightInit::ScaledNormal { width } => 1.0 / ((fan_in * width) as f32).sqrt(),
            WeightInit::Constant(_) => 0.0,
        }
    }

    /// Values for `total_elements` entries belonging to a layer whose weight
    /// has shape `shape`. Biases pass the weight shape so they share its scale.
    pub fn init<R: Rng + ?Sized>(
        &self,
        shape: &TensorDesc,
        total_elements: usize,
        rng: &mut R,
    ) -> Vec<f32> {
        let (fan_in, _fan_out) = shape.calculate_fan_in_out();

        match self {
            WeightInit::ScaledNormal { .. } => {
                let std_dev = self.std_dev(fan_in);
                (0..total_elements)
                    .map(|_| normal_sample(rng, 0.0, std_dev))
                    .collect()
            }

            WeightInit::Constant(value) => vec![*value; total_elements],
        }
    }
}
