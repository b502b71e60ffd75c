//! hyperunet - a U-Net whose convolution kernels are generated per sample by a
//! hypernetwork from a low-dimensional hyperparameter vector.
//!
//! The flat weight layout is planned once ([`ArchitecturePlanner`]), filled by
//! the [`HyperNetwork`], cut into per-layer tensors by the [`WeightSlicer`],
//! and consumed by per-sample convolutions ([`BatchConv2DLayer`]) inside the
//! [`Unet`].

mod compute;

mod instruction;

mod layer;

mod model;

mod tensor;

mod utils;

pub use compute::{
    device::{Device, DeviceId},
    memory_tracker::{MemoryReservation, MemoryTracker},
};
pub use layer::batch_conv2d::{BatchConv2DLayer, ConvRouting, conv2d};
pub use instruction::conv::{Conv2dParams, conv_output_size};
pub use model::{
    architecture::{
        ArchitecturePlan, ArchitecturePlanner, ArchitectureSpec, IN_CHANNELS, LayerRole,
        LayerSpec, NUM_LAYERS, OUT_CHANNELS, OffsetTable,
    },
    config::UnetConfig,
    hypernetwork::{DEFAULT_HIDDEN_DIM, HyperNetwork},
    shared::SharedUnet,
    slicer::{LayerWeights, WeightSlicer},
    unet::{Stage, Unet},
    weight_init::WeightInit,
};
pub use layer::linear::LinearLayer;
pub use tensor::{Tensor, TensorDesc};
pub use utils::error::{HyperUnetError, Result};
