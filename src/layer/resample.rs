use crate::{
    instruction::{maxpool, upsample},
    tensor::Tensor,
    utils::error::{HyperUnetError, Result},
};

fn nchw(input: &Tensor, context: &str) -> Result<[usize; 4]> {
    match *input.dims() {
        [n, c, h, w] => Ok([n, c, h, w]),
        _ => Err(HyperUnetError::shape(context, "(batch, channels, H, W)", input.dims())),
    }
}

/// Max pooling with a square window, no padding, floor rounding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MaxPool2D {
    pub kernel: usize,
    pub stride: usize,
}

impl MaxPool2D {
    pub fn new(kernel: usize) -> Self {
        Self {
            kernel,
            stride: kernel,
        }
    }

    pub fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let [n, c, h, w] = nchw(input, "maxpool input")?;
        if self.kernel == 0 || self.stride == 0 || h < self.kernel || w < self.kernel {
            return Err(HyperUnetError::InvalidGeometry(format!(
                "maxpool window {} stride {} does not fit {}x{} input",
                self.kernel, self.stride, h, w
            )));
        }

        let oh = (h - self.kernel) / self.stride + 1;
        let ow = (w - self.kernel) / self.stride + 1;

        let mut output = Tensor::zeros(vec![n, c, oh, ow]);
        maxpool::f32_cpu(
            [n, c, h, w],
            [n, c, oh, ow],
            input.data(),
            output.data_mut(),
            [self.kernel; 2],
            [self.stride; 2],
        );
        Ok(output)
    }
}

/// Bilinear upsampling by an integer factor with aligned corners.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Upsample2D {
    pub scale_factor: usize,
}

impl Upsample2D {
    pub fn new(scale_factor: usize) -> Self {
        Self { scale_factor }
    }

    pub fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let [n, c, h, w] = nchw(input, "upsample input")?;
        if self.scale_factor == 0 {
            return Err(HyperUnetError::InvalidGeometry(
                "upsample scale factor must be positive".to_string(),
            ));
        }

        let (oh, ow) = (h * self.scale_factor, w * self.scale_factor);
        let mut output = Tensor::zeros(vec![n, c, oh, ow]);
        upsample::f32_cpu([n, c, h, w], [n, c, oh, ow], input.data(), output.data_mut());
        Ok(output)
    }
}
