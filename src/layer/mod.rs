pub mod batch_conv2d;
pub mod linear;
pub mod resample;
