mod f32_cpu;
pub use f32_cpu::{Conv2dParams, f32_cpu};

use crate::utils::error::{HyperUnetError, Result};

/// Output length of one spatial axis:
/// `floor((in + 2*pad - dilation*(kernel - 1) - 1) / stride) + 1`.
pub fn conv_output_size(
    input: usize,
    kernel: usize,
    padding: usize,
    stride: usize,
    dilation: usize,
) -> Result<usize> {
    if stride == 0 || dilation == 0 || kernel == 0 {
        return Err(HyperUnetError::InvalidGeometry(format!(
            "stride, dilation and kernel must be positive (stride={}, dilation={}, kernel={})",
            stride, dilation, kernel
        )));
    }

    let padded = input + 2 * padding;
    let span = dilation * (kernel - 1) + 1;
    if padded < span {
        return Err(HyperUnetError::InvalidGeometry(format!(
            "kernel span {} exceeds padded input {} (input={}, padding={})",
            span, padded, input, padding
        )));
    }

    Ok((padded - span) / stride + 1)
}
