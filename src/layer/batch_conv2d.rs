use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{
    instruction::conv::{self, Conv2dParams, conv_output_size},
    tensor::Tensor,
    utils::error::{HyperUnetError, Result},
};

/// How a per-sample convolution is dispatched to the conv kernel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvRouting {
    /// Fold the batch into channel groups and issue one grouped convolution.
    #[default]
    Grouped,
    /// One ordinary convolution per sample.
    PerSampleLoop,
}

/// 2D convolution where sample `b` of the batch uses kernel `b` and bias `b`.
///
/// Input is `(batch, group, in_channels, H, W)`; the `group` axis is carried
/// through untouched. Kernels are `(batch, out, in, kh, kw)`, biases
/// `(batch, out)`. Output is `(batch, group, out, H', W')`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchConv2DLayer {
    pub in_channels: usize,
    pub out_channels: usize,
    pub stride: usize,
    pub padding: usize,
    pub dilation: usize,
    pub routing: ConvRouting,
}

impl BatchConv2DLayer {
    pub fn new(in_channels: usize, out_channels: usize) -> Self {
        Self {
            in_channels,
            out_channels,
            stride: 1,
            padding: 0,
            dilation: 1,
            routing: ConvRouting::Grouped,
        }
    }

    pub fn new_with(
        in_channels: usize,
        out_channels: usize,
        stride: usize,
        padding: usize,
        dilation: usize,
        routing: ConvRouting,
    ) -> Self {
        Self {
            in_channels,
            out_channels,
            stride,
            padding,
            dilation,
            routing,
        }
    }

    /// Validate operands and return the output shape.
    pub fn output_shape(
        &self,
        input: &[usize],
        kernel: &[usize],
        bias: Option<&[usize]>,
    ) -> Result<[usize; 5]> {
        if input.len() != 5 {
            return Err(HyperUnetError::shape(
                "batch conv input",
                "(batch, group, channels, H, W)",
                input,
            ));
        }
        let [batch, group, channels, h, w] = [input[0], input[1], input[2], input[3], input[4]];
        // the grouped kernel needs at least one group
        if batch == 0 {
            return Err(HyperUnetError::shape(
                "batch conv input",
                "at least one sample",
                input,
            ));
        }

        let expected_kernel_prefix = [batch, self.out_channels, self.in_channels];
        if kernel.len() != 5 || kernel[..3] != expected_kernel_prefix || channels != self.in_channels
        {
            return Err(HyperUnetError::shape(
                "batch conv kernel",
                format!(
                    "({}, {}, {}, kh, kw) for input {:?}",
                    batch, self.out_channels, self.in_channels, input
                ),
                kernel,
            ));
        }

        if let Some(bias) = bias {
            if bias != [batch, self.out_channels] {
                return Err(HyperUnetError::shape(
                    "batch conv bias",
                    [batch, self.out_channels],
                    bias,
                ));
            }
        }

        let oh = conv_output_size(h, kernel[3], self.padding, self.stride, self.dilation)?;
        let ow = conv_output_size(w, kernel[4], self.padding, self.stride, self.dilation)?;

        Ok([batch, group, self.out_channels, oh, ow])
    }

    pub fn forward(&self, input: &Tensor, kernel: &Tensor, bias: Option<&Tensor>) -> Result<Tensor> {
        let out_shape = self.output_shape(input.dims(), kernel.dims(), bias.map(|b| b.dims()))?;

        trace!(
            input = ?input.dims(),
            kernel = ?kernel.dims(),
            routing = ?self.routing,
            "batch conv"
        );

        match self.routing {
            ConvRouting::Grouped => self.forward_grouped(input, kernel, bias, out_shape),
            ConvRouting::PerSampleLoop => self.forward_looped(input, kernel, bias, out_shape),
        }
    }

    fn params(&self, group: usize) -> Conv2dParams {
        Conv2dParams {
            stride: [self.stride; 2],
            padding: [self.padding; 2],
            dilation: [self.dilation; 2],
            group,
        }
    }

    // (b, g, c, h, w) -> (g, b*c, h, w), one conv with `b` groups, then back
    fn forward_grouped(
        &self,
        input: &Tensor,
        kernel: &Tensor,
        bias: Option<&Tensor>,
        out_shape: [usize; 5],
    ) -> Result<Tensor> {
        let [batch, group, c, h, w] = [
            input.dims()[0],
            input.dims()[1],
            input.dims()[2],
            input.dims()[3],
            input.dims()[4],
        ];
        let [_, _, m, oh, ow] = out_shape;
        let (kh, kw) = (kernel.dims()[3], kernel.dims()[4]);

        let folded = input
            .permute(&[1, 0, 2, 3, 4])?
            .reshape(vec![group, batch * c, h, w])?;

        let mut output = Tensor::zeros(vec![group, batch * m, oh, ow]);
        conv::f32_cpu(
            [group, batch * c, h, w],
            [batch * m, c, kh, kw],
            [group, batch * m, oh, ow],
            folded.data(),
            kernel.data(),
            bias.map(|b| b.data()),
            output.data_mut(),
            &self.params(batch),
        );

        output
            .reshape(vec![group, batch, m, oh, ow])?
            .permute(&[1, 0, 2, 3, 4])
    }

    fn forward_looped(
        &self,
        input: &Tensor,
        kernel: &Tensor,
        bias: Option<&Tensor>,
        out_shape: [usize; 5],
    ) -> Result<Tensor> {
        let batch = input.dims()[0];
        let mut samples = Vec::with_capacity(batch);

        for b in 0..batch {
            let sample_bias = bias.map(|t| t.select(b)).transpose()?;
            samples.push(conv2d(
                &input.select(b)?,
                &kernel.select(b)?,
                sample_bias.as_ref(),
                &self.params(1),
            )?);
        }

        let output = Tensor::stack(&samples)?;
        debug_assert_eq!(output.dims(), &out_shape);
        Ok(output)
    }
}

/// Ordinary convolution with one kernel shared by every item of the batch:
/// input `(N, C, H, W)`, weight `(M, C/group, kh, kw)`, bias `(M)`.
pub fn conv2d(
    input: &Tensor,
    weight: &Tensor,
    bias: Option<&Tensor>,
    params: &Conv2dParams,
) -> Result<Tensor> {
    if input.ndim() != 4 || weight.ndim() != 4 || params.group == 0 {
        return Err(HyperUnetError::shape(
            "conv2d",
            "4D input and weight",
            format!("input {:?}, weight {:?}", input.dims(), weight.dims()),
        ));
    }
    let [n, c, h, w] = [input.dims()[0], input.dims()[1], input.dims()[2], input.dims()[3]];
    let [m, c_per_group, kh, kw] = [
        weight.dims()[0],
        weight.dims()[1],
        weight.dims()[2],
        weight.dims()[3],
    ];

    if c % params.group != 0 || m % params.group != 0 || c / params.group != c_per_group {
        return Err(HyperUnetError::shape(
            "conv2d weight",
            format!("({}, {}, kh, kw) with {} groups", m, c / params.group, params.group),
            weight.dims(),
        ));
    }
    if let Some(bias) = bias {
        if bias.dims() != [m] {
            return Err(HyperUnetError::shape("conv2d bias", [m], bias.dims()));
        }
    }

    let oh = conv_output_size(h, kh, params.padding[0], params.stride[0], params.dilation[0])?;
    let ow = conv_output_size(w, kw, params.padding[1], params.stride[1], params.dilation[1])?;

    let mut output = Tensor::zeros(vec![n, m, oh, ow]);
    conv::f32_cpu(
        [n, c, h, w],
        [m, c_per_group, kh, kw],
        [n, m, oh, ow],
        input.data(),
        weight.data(),
        bias.map(|b| b.data()),
        output.data_mut(),
        params,
    );
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::{Rng, SeedableRng, rngs::StdRng};

    fn random(dims: Vec<usize>, rng: &mut StdRng) -> Tensor {
        Tensor::from_fn(dims, |_| rng.random_range(-1.0f32..1.0))
    }

    fn layer(
        in_ch: usize,
        out_ch: usize,
        stride: usize,
        padding: usize,
        dilation: usize,
        routing: ConvRouting,
    ) -> BatchConv2DLayer {
        BatchConv2DLayer::new_with(in_ch, out_ch, stride, padding, dilation, routing)
    }

    #[test]
    fn batch_of_one_equals_plain_conv() {
        let mut rng = StdRng::seed_from_u64(11);
        let x = random(vec![1, 1, 3, 6, 5], &mut rng);
        let k = random(vec![1, 4, 3, 3, 3], &mut rng);
        let b = random(vec![1, 4], &mut rng);

        let conv = layer(3, 4, 1, 1, 1, ConvRouting::Grouped);
        let out = conv.forward(&x, &k, Some(&b)).unwrap();

        let expected = conv2d(
            &x.select(0).unwrap(),
            &k.select(0).unwrap(),
            Some(&b.select(0).unwrap()),
            &conv.params(1),
        )
        .unwrap();

        assert_eq!(out.dims(), &[1, 1, 4, 6, 5]);
        assert_eq!(out.data(), expected.data());
    }

    #[test]
    fn shared_kernels_equal_shared_weight_conv() {
        let mut rng = StdRng::seed_from_u64(12);
        let batch = 3;
        let x = random(vec![batch, 1, 2, 5, 5], &mut rng);
        let k1 = random(vec![3, 2, 3, 3], &mut rng);
        let b1 = random(vec![3], &mut rng);

        let k = Tensor::stack(&vec![k1.clone(); batch]).unwrap();
        let b = Tensor::stack(&vec![b1.clone(); batch]).unwrap();

        let conv = layer(2, 3, 1, 1, 1, ConvRouting::Grouped);
        let out = conv.forward(&x, &k, Some(&b)).unwrap();

        let shared = conv2d(
            &x.clone().reshape(vec![batch, 2, 5, 5]).unwrap(),
            &k1,
            Some(&b1),
            &conv.params(1),
        )
        .unwrap();

        assert_eq!(out.dims(), &[batch, 1, 3, 5, 5]);
        assert_eq!(out.data(), shared.data());
    }

    #[test]
    fn each_sample_uses_its_own_kernel() {
        // 1x1 kernels scaling sample b by (b + 1)
        let x = Tensor::from_fn(vec![2, 1, 1, 2, 2], |_| 1.0);
        let k = Tensor::new(vec![2, 1, 1, 1, 1], vec![1.0, 2.0]).unwrap();
        let conv = layer(1, 1, 1, 0, 1, ConvRouting::Grouped);
        let out = conv.forward(&x, &k, None).unwrap();
        assert_eq!(out.data(), &[1.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0, 2.0]);
    }

    #[test]
    fn group_axis_is_carried_through() {
        let mut rng = StdRng::seed_from_u64(13);
        let x = random(vec![2, 3, 1, 4, 4], &mut rng);
        let k = random(vec![2, 2, 1, 3, 3], &mut rng);
        let b = random(vec![2, 2], &mut rng);

        let grouped = layer(1, 2, 1, 1, 1, ConvRouting::Grouped)
            .forward(&x, &k, Some(&b))
            .unwrap();
        assert_eq!(grouped.dims(), &[2, 3, 2, 4, 4]);

        // every (sample, group) slice is its own conv with the sample's kernel
        for s in 0..2 {
            let xs = x.select(s).unwrap();
            let expected = conv2d(
                &xs,
                &k.select(s).unwrap(),
                Some(&b.select(s).unwrap()),
                &Conv2dParams {
                    stride: [1, 1],
                    padding: [1, 1],
                    dilation: [1, 1],
                    group: 1,
                },
            )
            .unwrap();
            assert_eq!(grouped.select(s).unwrap().data(), expected.data());
        }
    }

    #[test]
    fn mismatched_operands_are_rejected() {
        let conv = layer(2, 4, 1, 1, 1, ConvRouting::Grouped);
        let x = Tensor::zeros(vec![2, 1, 2, 4, 4]);

        let wrong_batch = Tensor::zeros(vec![3, 4, 2, 3, 3]);
        assert!(matches!(
            conv.forward(&x, &wrong_batch, None),
            Err(HyperUnetError::ShapeMismatch { .. })
        ));

        let wrong_in = Tensor::zeros(vec![2, 4, 3, 3, 3]);
        assert!(conv.forward(&x, &wrong_in, None).is_err());

        let k = Tensor::zeros(vec![2, 4, 2, 3, 3]);
        let wrong_bias = Tensor::zeros(vec![2, 3]);
        assert!(conv.forward(&x, &k, Some(&wrong_bias)).is_err());

        let flat_input = Tensor::zeros(vec![2, 2, 4, 4]);
        assert!(conv.forward(&flat_input, &k, None).is_err());
    }

    #[test]
    fn empty_batch_is_rejected_by_both_routings() {
        let x = Tensor::zeros(vec![0, 1, 2, 4, 4]);
        let k = Tensor::zeros(vec![0, 3, 2, 3, 3]);
        let b = Tensor::zeros(vec![0, 3]);

        let grouped = layer(2, 3, 1, 1, 1, ConvRouting::Grouped).forward(&x, &k, Some(&b));
        let looped = layer(2, 3, 1, 1, 1, ConvRouting::PerSampleLoop).forward(&x, &k, Some(&b));

        assert!(matches!(grouped, Err(HyperUnetError::ShapeMismatch { .. })));
        assert_eq!(grouped, looped);
    }

    #[test]
    fn oversized_kernel_is_invalid_geometry() {
        let conv = layer(1, 1, 1, 0, 1, ConvRouting::Grouped);
        let x = Tensor::zeros(vec![1, 1, 1, 2, 2]);
        let k = Tensor::zeros(vec![1, 1, 1, 3, 3]);
        assert!(matches!(
            conv.forward(&x, &k, None),
            Err(HyperUnetError::InvalidGeometry(_))
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn grouped_routing_matches_per_sample_loop(
            batch in 0usize..5,
            group in 1usize..3,
            in_ch in 1usize..4,
            out_ch in 1usize..4,
            size in 3usize..8,
            kernel in prop::sample::select(vec![1usize, 3]),
            padding in 0usize..3,
            stride in 1usize..3,
            dilation in 1usize..3,
            seed in any::<u64>(),
        ) {
            let with_bias = seed % 2 == 0;
            let mut rng = StdRng::seed_from_u64(seed);
            let x = random(vec![batch, group, in_ch, size, size], &mut rng);
            let k = random(vec![batch, out_ch, in_ch, kernel, kernel], &mut rng);
            let b = random(vec![batch, out_ch], &mut rng);
            let bias = if with_bias { Some(&b) } else { None };

            let grouped = layer(in_ch, out_ch, stride, padding, dilation, ConvRouting::Grouped);
            let looped = layer(in_ch, out_ch, stride, padding, dilation, ConvRouting::PerSampleLoop);

            match (grouped.forward(&x, &k, bias), looped.forward(&x, &k, bias)) {
                (Ok(a), Ok(b)) => {
                    prop_assert_eq!(a.dims(), b.dims());
                    prop_assert_eq!(a.data(), b.data());
                }
                (Err(a), Err(b)) => prop_assert_eq!(a, b),
                (a, b) => prop_assert!(false, "routings disagree: {:?} vs {:?}", a, b),
            }
        }
    }
}
