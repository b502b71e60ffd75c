//! Plain f32 CPU kernels. Every kernel takes explicit dims and flat row-major slices.

pub mod activation;
pub mod concat;
pub mod conv;
pub mod gemm;
pub mod maxpool;
pub mod upsample;
