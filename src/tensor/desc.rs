use crate::utils::error::{HyperUnetError, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TensorDesc {
    dims: Vec<usize>,
}

impl TensorDesc {
    pub fn new(dims: Vec<usize>) -> Self {
        assert!(!dims.is_empty(), "Tensor dimensions cannot be empty");
        Self { dims }
    }

    pub fn num_elements(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    // Reshape to new dimensions (preserving total elements)
    pub fn reshape(&mut self, new_dims: Vec<usize>) -> Result<()> {
        if new_dims.is_empty() {
            return Err(HyperUnetError::shape(
                "reshape",
                "at least one dimension",
                new_dims,
            ));
        }

        let new_elements: usize = new_dims.iter().product();
        if new_elements != self.num_elements() {
            return Err(HyperUnetError::shape(
                "reshape",
                format!("{} elements", self.num_elements()),
                format!("{:?} ({} elements)", new_dims, new_elements),
            ));
        }

        self.dims = new_dims;
        Ok(())
    }

    // Calculate strides for row-major memory layout
    pub fn strides(&self) -> Vec<usize> {
        Self::compute_strides(&self.dims)
    }

    pub fn calculate_fan_in_out(&self) -> (usize, usize) {
        // For 1D tensors, assume bias vector or similar
        if self.dims.len() == 1 {
            return (1, self.dims[0]);
        }

        let out_features = self.dims[0];
        let in_features = self.dims[1];

        // Remaining dimensions are kernel/spatial dimensions
        let kernel_size: usize = self.dims[2..].iter().product();

        (in_features * kernel_size, out_features * kernel_size)
    }

    pub fn compute_strides(dims: &[usize]) -> Vec<usize> {
        let mut s = vec![1; dims.len()];
        for i in (0..dims.len().saturating_sub(1)).rev() {
            s[i] = s[i + 1] * dims[i + 1];
        }
        s
    }

    pub fn offset(idxs: &[usize], strides: &[usize]) -> usize {
        idxs.iter().zip(strides.iter()).map(|(i, s)| i * s).sum()
    }
}
