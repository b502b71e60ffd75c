//! Fixed U-Net topology and the layout of its generated weights.
//!
//! Every kernel and bias the network needs lives in one flat per-sample
//! buffer: all kernels first, in layer order, then all biases in the same
//! order. [`ArchitecturePlan`] is the single source of truth for that layout;
//! both the hypernetwork (to size its output) and the slicer (to cut the
//! buffer apart) read it.

use std::ops::Range;

use tracing::debug;

use crate::utils::{
    error::{HyperUnetError, Result},
    math::volume,
};

pub const IN_CHANNELS: usize = 2;
pub const OUT_CHANNELS: usize = 2;
pub const NUM_LAYERS: usize = 15;

/// The fifteen convolutions in buffer order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LayerRole {
    Down1_0,
    Down1_1,
    Down2_0,
    Down2_1,
    Down3_0,
    Down3_1,
    Down4_0,
    Down4_1,
    Up3_0,
    Up3_1,
    Up2_0,
    Up2_1,
    Up1_0,
    Up1_1,
    Last,
}

impl LayerRole {
    pub const ALL: [LayerRole; NUM_LAYERS] = [
        LayerRole::Down1_0,
        LayerRole::Down1_1,
        LayerRole::Down2_0,
        LayerRole::Down2_1,
        LayerRole::Down3_0,
        LayerRole::Down3_1,
        LayerRole::Down4_0,
        LayerRole::Down4_1,
        LayerRole::Up3_0,
        LayerRole::Up3_1,
        LayerRole::Up2_0,
        LayerRole::Up2_1,
        LayerRole::Up1_0,
        LayerRole::Up1_1,
        LayerRole::Last,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            LayerRole::Down1_0 => "conv_down1_0",
            LayerRole::Down1_1 => "conv_down1_1",
            LayerRole::Down2_0 => "conv_down2_0",
            LayerRole::Down2_1 => "conv_down2_1",
            LayerRole::Down3_0 => "conv_down3_0",
            LayerRole::Down3_1 => "conv_down3_1",
            LayerRole::Down4_0 => "conv_down4_0",
            LayerRole::Down4_1 => "conv_down4_1",
            LayerRole::Up3_0 => "conv_up3_0",
            LayerRole::Up3_1 => "conv_up3_1",
            LayerRole::Up2_0 => "conv_up2_0",
            LayerRole::Up2_1 => "conv_up2_1",
            LayerRole::Up1_0 => "conv_up1_0",
            LayerRole::Up1_1 => "conv_up1_1",
            LayerRole::Last => "conv_last",
        }
    }

    // First conv of a decoder stage sees skip + upsampled features
    fn merges_skip(self) -> bool {
        matches!(self, LayerRole::Up3_0 | LayerRole::Up2_0 | LayerRole::Up1_0)
    }
}

impl std::fmt::Display for LayerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (layer {})", self.name(), self.index())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayerSpec {
    /// (out_ch, in_ch, kh, kw)
    pub kernel_shape: [usize; 4],
    /// (out_ch,)
    pub bias_shape: [usize; 1],
}

impl LayerSpec {
    pub fn new(out_ch: usize, in_ch: usize, kernel: usize) -> Self {
        Self {
            kernel_shape: [out_ch, in_ch, kernel, kernel],
            bias_shape: [out_ch],
        }
    }

    pub fn out_channels(&self) -> usize {
        self.kernel_shape[0]
    }

    pub fn in_channels(&self) -> usize {
        self.kernel_shape[1]
    }

    pub fn kernel_len(&self) -> usize {
        volume(&self.kernel_shape)
    }

    pub fn bias_len(&self) -> usize {
        self.bias_shape[0]
    }

    /// Padding that keeps spatial size at stride 1.
    pub fn same_padding(&self) -> usize {
        self.kernel_shape[2] / 2
    }
}

/// Ordered per-layer shapes for a given hidden width `nh`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchitectureSpec {
    nh: usize,
    layers: [LayerSpec; NUM_LAYERS],
}

impl ArchitectureSpec {
    pub fn nh(&self) -> usize {
        self.nh
    }

    pub fn layers(&self) -> &[LayerSpec; NUM_LAYERS] {
        &self.layers
    }

    pub fn layer(&self, role: LayerRole) -> &LayerSpec {
        &self.layers[role.index()]
    }
}

/// Cumulative end offsets into the flat buffer.
///
/// `kernel_offsets[i]` ends layer i's kernel slice; bias offsets continue
/// after the last kernel offset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OffsetTable {
    kernel_offsets: Vec<usize>,
    bias_offsets: Vec<usize>,
}

impl OffsetTable {
    pub fn from_spec(spec: &ArchitectureSpec) -> Self {
        let mut kernel_offsets = Vec::with_capacity(NUM_LAYERS);
        let mut bias_offsets = Vec::with_capacity(NUM_LAYERS);

        let mut end = 0usize;
        for layer in spec.layers() {
            end += layer.kernel_len();
            kernel_offsets.push(end);
        }
        for layer in spec.layers() {
            end += layer.bias_len();
            bias_offsets.push(end);
        }

        Self {
            kernel_offsets,
            bias_offsets,
        }
    }

    pub fn kernel_offsets(&self) -> &[usize] {
        &self.kernel_offsets
    }

    pub fn bias_offsets(&self) -> &[usize] {
        &self.bias_offsets
    }

    pub fn kernel_range(&self, layer: usize) -> Range<usize> {
        let start = if layer == 0 {
            0
        } else {
            self.kernel_offsets[layer - 1]
        };
        start..self.kernel_offsets[layer]
    }

    pub fn bias_range(&self, layer: usize) -> Range<usize> {
        let start = if layer == 0 {
            self.kernels_end()
        } else {
            self.bias_offsets[layer - 1]
        };
        start..self.bias_offsets[layer]
    }

    pub fn kernels_end(&self) -> usize {
        self.kernel_offsets.last().copied().unwrap_or(0)
    }

    /// Total width of the flat buffer.
    pub fn total(&self) -> usize {
        self.bias_offsets
            .last()
            .copied()
            .unwrap_or_else(|| self.kernels_end())
    }
}

/// Shapes, offsets and total buffer width, computed together.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchitecturePlan {
    spec: ArchitectureSpec,
    offsets: OffsetTable,
    out_dim: usize,
}

impl ArchitecturePlan {
    pub fn spec(&self) -> &ArchitectureSpec {
        &self.spec
    }

    pub fn offsets(&self) -> &OffsetTable {
        &self.offsets
    }

    pub fn out_dim(&self) -> usize {
        self.out_dim
    }

    pub fn nh(&self) -> usize {
        self.spec.nh
    }
}

pub struct ArchitecturePlanner;

impl ArchitecturePlanner {
    pub fn spec(nh: usize) -> Result<ArchitectureSpec> {
        if nh == 0 {
            return Err(HyperUnetError::Config(
                "hidden channel width nh must be positive".to_string(),
            ));
        }

        let layers = LayerRole::ALL.map(|role| match role {
            LayerRole::Down1_0 => LayerSpec::new(nh, IN_CHANNELS, 3),
            LayerRole::Last => LayerSpec::new(OUT_CHANNELS, nh, 1),
            r if r.merges_skip() => LayerSpec::new(nh, nh + nh, 3),
            _ => LayerSpec::new(nh, nh, 3),
        });

        Ok(ArchitectureSpec { nh, layers })
    }

    pub fn plan(nh: usize) -> Result<ArchitecturePlan> {
        let spec = Self::spec(nh)?;
        let offsets = OffsetTable::from_spec(&spec);
        let out_dim = offsets.total();

        debug!(nh, out_dim, "planned hypernetwork output layout");
        Ok(ArchitecturePlan {
            spec,
            offsets,
            out_dim,
        })
    }
}
