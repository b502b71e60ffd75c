pub mod architecture;
pub mod config;
pub mod hypernetwork;
pub mod shared;
pub mod slicer;
pub mod unet;
pub mod weight_init;
