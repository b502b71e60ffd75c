use crate::{
    model::architecture::{ArchitecturePlan, LayerRole},
    tensor::Tensor,
    utils::error::{HyperUnetError, Result},
};

/// Generated weights for one conv layer, one row per sample.
#[derive(Clone, Debug, PartialEq)]
pub struct LayerWeights {
    pub role: LayerRole,
    /// (batch, out_ch, in_ch, kh, kw)
    pub kernel: Tensor,
    /// (batch, out_ch)
    pub bias: Tensor,
}

pub struct WeightSlicer;

impl WeightSlicer {
    /// Cut a `(batch, out_dim)` buffer into per-layer kernels and biases.
    ///
    /// Row `b` of the buffer only ever feeds sample `b`'s kernels.
    pub fn slice(buffer: &Tensor, plan: &ArchitecturePlan) -> Result<Vec<LayerWeights>> {
        let dims = buffer.dims();
        if dims.len() != 2 || dims[1] != plan.out_dim() {
            return Err(HyperUnetError::shape(
                format!("flat weight buffer for nh={}", plan.nh()),
                format!("(batch, {})", plan.out_dim()),
                dims,
            ));
        }
        let batch = dims[0];
        let offsets = plan.offsets();

        LayerRole::ALL
            .iter()
            .zip(plan.spec().layers())
            .map(|(&role, spec)| -> Result<LayerWeights> {
                let kernel_range = offsets.kernel_range(role.index());
                let bias_range = offsets.bias_range(role.index());

                let mut kernel_dims = vec![batch];
                kernel_dims.extend_from_slice(&spec.kernel_shape);
                let kernel = buffer
                    .narrow(1, kernel_range.start, kernel_range.len())?
                    .reshape(kernel_dims)
                    .map_err(|e| e.in_context(role))?;

                let bias = buffer
                    .narrow(1, bias_range.start, bias_range.len())?
                    .reshape(vec![batch, spec.bias_shape[0]])
                    .map_err(|e| e.in_context(role))?;

                Ok(LayerWeights { role, kernel, bias })
            })
            .collect()
    }

    /// Inverse of [`slice`](Self::slice): all kernels in order, then all biases.
    pub fn flatten(layers: &[LayerWeights]) -> Result<Tensor> {
        let first = layers
            .first()
            .ok_or_else(|| HyperUnetError::shape("flatten", "at least one layer", 0))?;
        let batch = first.kernel.dims()[0];

        let mut columns = Vec::with_capacity(layers.len() * 2);
        for layer in layers {
            let len = layer.kernel.num_elements() / batch.max(1);
            columns.push(layer.kernel.clone().reshape(vec![batch, len])?);
        }
        for layer in layers {
            columns.push(layer.bias.clone());
        }

        let refs: Vec<&Tensor> = columns.iter().collect();
        Tensor::concat(&refs, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::architecture::ArchitecturePlanner;

    #[test]
    fn shapes_follow_plan() {
        let plan = ArchitecturePlanner::plan(4).unwrap();
        let buffer = Tensor::zeros(vec![3, plan.out_dim()]);
        let layers = WeightSlicer::slice(&buffer, &plan).unwrap();

        assert_eq!(layers.len(), 15);
        assert_eq!(layers[0].kernel.dims(), &[3, 4, 2, 3, 3]);
        assert_eq!(layers[8].role, LayerRole::Up3_0);
        assert_eq!(layers[8].kernel.dims(), &[3, 4, 8, 3, 3]);
        assert_eq!(layers[14].kernel.dims(), &[3, 2, 4, 1, 1]);
        assert_eq!(layers[14].bias.dims(), &[3, 2]);
    }

    #[test]
    fn slicing_then_flattening_is_bit_exact() {
        let plan = ArchitecturePlanner::plan(3).unwrap();
        // distinct values, including signed zero and non-round fractions
        let buffer = Tensor::from_fn(vec![2, plan.out_dim()], |i| {
            if i == 5 { -0.0 } else { (i as f32 * 0.37).sin() }
        });

        let layers = WeightSlicer::slice(&buffer, &plan).unwrap();
        let rebuilt = WeightSlicer::flatten(&layers).unwrap();

        assert_eq!(rebuilt.dims(), buffer.dims());
        let same_bits = rebuilt
            .data()
            .iter()
            .zip(buffer.data())
            .all(|(a, b)| a.to_bits() == b.to_bits());
        assert!(same_bits);
    }

    #[test]
    fn rows_stay_with_their_sample() {
        let plan = ArchitecturePlanner::plan(2).unwrap();
        let out_dim = plan.out_dim();
        // row b is filled with b
        let buffer = Tensor::from_fn(vec![4, out_dim], |i| (i / out_dim) as f32);
        for layer in WeightSlicer::slice(&buffer, &plan).unwrap() {
            for b in 0..4 {
                let expected = b as f32;
                assert!(layer.kernel.select(b).unwrap().data().iter().all(|v| *v == expected));
                assert!(layer.bias.select(b).unwrap().data().iter().all(|v| *v == expected));
            }
        }
    }

    #[test]
    fn wrong_width_is_shape_mismatch() {
        let plan = ArchitecturePlanner::plan(4).unwrap();
        let buffer = Tensor::zeros(vec![1, plan.out_dim() - 1]);
        let err = WeightSlicer::slice(&buffer, &plan).unwrap_err();
        assert!(matches!(err, HyperUnetError::ShapeMismatch { .. }));
        assert!(err.to_string().contains("nh=4"));
    }
}
