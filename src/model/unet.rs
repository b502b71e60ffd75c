use std::sync::Arc;

use rand::{SeedableRng, rngs::StdRng};
use tracing::{debug, info, trace};

use crate::{
    compute::device::Device,
    instruction::activation::relu_f32_cpu,
    layer::{
        batch_conv2d::BatchConv2DLayer,
        resample::{MaxPool2D, Upsample2D},
    },
    model::{
        architecture::{ArchitecturePlan, ArchitecturePlanner, IN_CHANNELS, LayerRole, NUM_LAYERS},
        config::UnetConfig,
        hypernetwork::HyperNetwork,
        slicer::{LayerWeights, WeightSlicer},
    },
    tensor::Tensor,
    utils::error::{HyperUnetError, Result},
};

// Three 2x poolings must divide the input evenly
const SPATIAL_MULTIPLE: usize = 8;

/// Fixed processing sequence of one forward call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Down1,
    Down2,
    Down3,
    Down4,
    Up3,
    Up2,
    Up1,
    Final,
}

impl Stage {
    pub const SEQUENCE: [Stage; 8] = [
        Stage::Down1,
        Stage::Down2,
        Stage::Down3,
        Stage::Down4,
        Stage::Up3,
        Stage::Up2,
        Stage::Up1,
        Stage::Final,
    ];

    pub fn roles(self) -> &'static [LayerRole] {
        match self {
            Stage::Down1 => &[LayerRole::Down1_0, LayerRole::Down1_1],
            Stage::Down2 => &[LayerRole::Down2_0, LayerRole::Down2_1],
            Stage::Down3 => &[LayerRole::Down3_0, LayerRole::Down3_1],
            Stage::Down4 => &[LayerRole::Down4_0, LayerRole::Down4_1],
            Stage::Up3 => &[LayerRole::Up3_0, LayerRole::Up3_1],
            Stage::Up2 => &[LayerRole::Up2_0, LayerRole::Up2_1],
            Stage::Up1 => &[LayerRole::Up1_0, LayerRole::Up1_1],
            Stage::Final => &[LayerRole::Last],
        }
    }
}

/// U-Net whose kernels are generated per sample by a [`HyperNetwork`].
///
/// The only trainable parameters are the hypernetwork's. Layer shapes, the
/// hypernetwork's output width and the slicing offsets all come from one
/// shared [`ArchitecturePlan`].
pub struct Unet {
    device: Device,
    config: UnetConfig,
    plan: Arc<ArchitecturePlan>,
    hnet: HyperNetwork,
    convs: Vec<BatchConv2DLayer>,
    maxpool: MaxPool2D,
    upsample: Upsample2D,
}

impl Unet {
    pub fn new(device: Device, config: UnetConfig) -> Result<Self> {
        let config = config.build()?;
        let plan = Arc::new(ArchitecturePlanner::plan(config.nh)?);

        // build() always resolves the seed
        let mut rng = StdRng::seed_from_u64(config.seed.unwrap_or_default());
        let hnet = HyperNetwork::new(config.num_hyperparams, config.hidden_dim, &plan, &mut rng)?;

        let convs = plan
            .spec()
            .layers()
            .iter()
            .map(|spec| {
                BatchConv2DLayer::new_with(
                    spec.in_channels(),
                    spec.out_channels(),
                    1,
                    spec.same_padding(),
                    1,
                    config.routing,
                )
            })
            .collect();

        info!(
            nh = config.nh,
            num_hyperparams = config.num_hyperparams,
            out_dim = plan.out_dim(),
            parameters = hnet.parameter_count(),
            residual = config.residual,
            "built hyper U-Net"
        );

        Ok(Self {
            device,
            config,
            plan,
            hnet,
            convs,
            maxpool: MaxPool2D::new(2),
            upsample: Upsample2D::new(2),
        })
    }

    pub fn config(&self) -> &UnetConfig {
        &self.config
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn plan(&self) -> &Arc<ArchitecturePlan> {
        &self.plan
    }

    pub fn hypernetwork(&self) -> &HyperNetwork {
        &self.hnet
    }

    pub fn hypernetwork_mut(&mut self) -> &mut HyperNetwork {
        &mut self.hnet
    }

    pub fn residual(&self) -> bool {
        self.config.residual
    }

    /// Reconstruct `zf` of shape `(batch, H, W, 2)` using kernels generated
    /// from `hyperparams` of shape `(batch, num_hyperparams)`.
    ///
    /// `_measurement` is part of the interface for data-consistency variants
    /// and is not read here.
    pub fn forward(
        &self,
        zf: &Tensor,
        _measurement: Option<&Tensor>,
        hyperparams: &Tensor,
    ) -> Result<Tensor> {
        let [batch, h, w] = self.check_inputs(zf, hyperparams)?;
        debug!(batch, h, w, "hyper U-Net forward");

        let _reservation = self.device.reserve(self.estimate_forward_bytes(batch, h, w))?;

        let weights = self.hnet.forward(hyperparams)?;
        let layers = WeightSlicer::slice(&weights, &self.plan)?;
        drop(weights);

        let mut x = zf.permute(&[0, 3, 1, 2])?;
        let mut skips: Vec<Tensor> = Vec::with_capacity(3);
        for stage in Stage::SEQUENCE {
            trace!(?stage, dims = ?x.dims(), "stage");
            x = self.run_stage(stage, x, &mut skips, &layers)?;
        }
        debug_assert!(skips.is_empty());

        let delta = x.permute(&[0, 2, 3, 1])?;
        if self.config.residual {
            zf.add(&delta)
        } else {
            Ok(delta)
        }
    }

    fn check_inputs(&self, zf: &Tensor, hyperparams: &Tensor) -> Result<[usize; 3]> {
        let [batch, h, w, c] = match *zf.dims() {
            [b, h, w, c] => [b, h, w, c],
            _ => {
                return Err(HyperUnetError::shape(
                    "input feature map",
                    format!("(batch, H, W, {})", IN_CHANNELS),
                    zf.dims(),
                ));
            }
        };

        if batch == 0 {
            return Err(HyperUnetError::shape(
                "input feature map batch",
                "at least one sample",
                zf.dims(),
            ));
        }

        if c != IN_CHANNELS {
            return Err(HyperUnetError::shape(
                "input feature map channels",
                IN_CHANNELS,
                c,
            ));
        }

        if h == 0 || w == 0 || h % SPATIAL_MULTIPLE != 0 || w % SPATIAL_MULTIPLE != 0 {
            return Err(HyperUnetError::InvalidGeometry(format!(
                "input spatial size {}x{} must be a positive multiple of {}",
                h, w, SPATIAL_MULTIPLE
            )));
        }

        if hyperparams.dims().first() != Some(&batch) {
            return Err(HyperUnetError::shape(
                "hyperparameter batch",
                batch,
                hyperparams.dims(),
            ));
        }

        Ok([batch, h, w])
    }

    // Upper bound on host memory one call holds at once: the flat buffer and
    // its slices, plus a handful of 2*nh-wide activations per resolution.
    fn estimate_forward_bytes(&self, batch: usize, h: usize, w: usize) -> u64 {
        let nh = self.plan.nh();
        let levels: usize = (0..4).map(|l| (h >> l) * (w >> l)).sum();
        let elements = 2 * self.plan.out_dim() + 8 * nh * levels + 8 * IN_CHANNELS * h * w;
        (batch * elements * std::mem::size_of::<f32>()) as u64
    }

    fn run_stage(
        &self,
        stage: Stage,
        x: Tensor,
        skips: &mut Vec<Tensor>,
        layers: &[LayerWeights],
    ) -> Result<Tensor> {
        match stage {
            Stage::Down1 | Stage::Down2 | Stage::Down3 => {
                let features = self.double_conv(stage, x, layers)?;
                let pooled = self.maxpool.forward(&features)?;
                skips.push(features);
                Ok(pooled)
            }
            Stage::Down4 => {
                let features = self.double_conv(stage, x, layers)?;
                self.upsample.forward(&features)
            }
            Stage::Up3 | Stage::Up2 | Stage::Up1 => {
                let skip = skips.pop().ok_or_else(|| {
                    HyperUnetError::shape(format!("{:?} skip connection", stage), 1, 0)
                })?;
                let merged = Tensor::concat(&[&x, &skip], 1)?;
                drop(skip);

                let features = self.double_conv(stage, merged, layers)?;
                if stage == Stage::Up1 {
                    Ok(features)
                } else {
                    self.upsample.forward(&features)
                }
            }
            Stage::Final => self.conv(LayerRole::Last, &x, layers, false),
        }
    }

    fn double_conv(&self, stage: Stage, x: Tensor, layers: &[LayerWeights]) -> Result<Tensor> {
        stage
            .roles()
            .iter()
            .try_fold(x, |x, &role| self.conv(role, &x, layers, true))
    }

    // (batch, c, h, w) through the role's per-sample conv
    fn conv(
        &self,
        role: LayerRole,
        x: &Tensor,
        layers: &[LayerWeights],
        relu: bool,
    ) -> Result<Tensor> {
        debug_assert_eq!(layers.len(), NUM_LAYERS);
        let weights = &layers[role.index()];
        let dims = x.dims().to_vec();

        let grouped = x.clone().reshape(vec![dims[0], 1, dims[1], dims[2], dims[3]])?;
        let out = self.convs[role.index()]
            .forward(&grouped, &weights.kernel, Some(&weights.bias))
            .map_err(|e| e.in_context(role))?;

        let out_dims = out.dims().to_vec();
        let mut out = out.reshape(vec![out_dims[0], out_dims[2], out_dims[3], out_dims[4]])?;
        if relu {
            relu_f32_cpu(out.data_mut());
        }
        Ok(out)
    }
}
