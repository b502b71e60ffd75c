use crate::{
    instruction::concat,
    tensor::desc::TensorDesc,
    utils::error::{HyperUnetError, Result},
};

/// Dense row-major f32 tensor held in host memory.
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor {
    desc: TensorDesc,
    data: Vec<f32>,
}

impl Tensor {
    pub fn new(dims: Vec<usize>, data: Vec<f32>) -> Result<Self> {
        let desc = TensorDesc::new(dims);
        if desc.num_elements() != data.len() {
            return Err(HyperUnetError::shape(
                "tensor data",
                format!("{} elements for {:?}", desc.num_elements(), desc.dims()),
                format!("{} elements", data.len()),
            ));
        }
        Ok(Self { desc, data })
    }

    pub fn zeros(dims: Vec<usize>) -> Self {
        let desc = TensorDesc::new(dims);
        let data = vec![0.0; desc.num_elements()];
        Self { desc, data }
    }

    pub fn from_fn(dims: Vec<usize>, f: impl FnMut(usize) -> f32) -> Self {
        let desc = TensorDesc::new(dims);
        let data = (0..desc.num_elements()).map(f).collect();
        Self { desc, data }
    }

    pub fn dims(&self) -> &[usize] {
        self.desc.dims()
    }

    pub fn ndim(&self) -> usize {
        self.desc.ndim()
    }

    pub fn num_elements(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }

    pub fn reshape(mut self, dims: Vec<usize>) -> Result<Self> {
        self.desc.reshape(dims)?;
        Ok(self)
    }

    /// Reorder axes, e.g. `[0, 3, 1, 2]` turns NHWC into NCHW.
    pub fn permute(&self, axes: &[usize]) -> Result<Self> {
        let rank = self.ndim();
        let mut seen = vec![false; rank];
        let repeated_or_out_of_range = axes
            .iter()
            .any(|&a| a >= rank || std::mem::replace(&mut seen[a], true));
        if axes.len() != rank || repeated_or_out_of_range {
            return Err(HyperUnetError::shape(
                "permute",
                format!("a permutation of 0..{}", rank),
                axes,
            ));
        }

        let src_dims = self.dims();
        let src_strides = self.desc.strides();
        let dst_dims: Vec<usize> = axes.iter().map(|&a| src_dims[a]).collect();
        // Stride in the source for each destination axis
        let gather_strides: Vec<usize> = axes.iter().map(|&a| src_strides[a]).collect();

        let mut data = Vec::with_capacity(self.data.len());
        let mut idx = vec![0usize; rank];
        for _ in 0..self.data.len() {
            data.push(self.data[TensorDesc::offset(&idx, &gather_strides)]);

            // increment idx
            for d in (0..rank).rev() {
                idx[d] += 1;
                if idx[d] < dst_dims[d] {
                    break;
                }
                idx[d] = 0;
            }
        }

        Tensor::new(dst_dims, data)
    }

    /// Contiguous range `start..start + len` along `axis`.
    pub fn narrow(&self, axis: usize, start: usize, len: usize) -> Result<Self> {
        let dims = self.dims();
        if axis >= dims.len() || start + len > dims[axis] {
            return Err(HyperUnetError::shape(
                "narrow",
                format!("range within axis {} of {:?}", axis, dims),
                format!("{}..{}", start, start + len),
            ));
        }

        let outer: usize = dims[..axis].iter().product();
        let inner: usize = dims[axis + 1..].iter().product();
        let row = dims[axis] * inner;

        let mut data = Vec::with_capacity(outer * len * inner);
        for o in 0..outer {
            let begin = o * row + start * inner;
            data.extend_from_slice(&self.data[begin..begin + len * inner]);
        }

        let mut out_dims = dims.to_vec();
        out_dims[axis] = len;
        Tensor::new(out_dims, data)
    }

    /// Index along the leading axis, dropping it.
    pub fn select(&self, index: usize) -> Result<Self> {
        let dims = self.dims();
        if dims.len() < 2 || index >= dims[0] {
            return Err(HyperUnetError::shape(
                "select",
                format!("index below {} on a rank >= 2 tensor", dims[0]),
                format!("index {} on {:?}", index, dims),
            ));
        }
        let inner: usize = dims[1..].iter().product();
        let data = self.data[index * inner..(index + 1) * inner].to_vec();
        Tensor::new(dims[1..].to_vec(), data)
    }

    /// Stack equally shaped tensors along a new leading axis.
    pub fn stack(parts: &[Tensor]) -> Result<Self> {
        let first = parts
            .first()
            .ok_or_else(|| HyperUnetError::shape("stack", "at least one tensor", 0))?;

        let mut data = Vec::with_capacity(first.num_elements() * parts.len());
        for part in parts {
            if part.dims() != first.dims() {
                return Err(HyperUnetError::shape("stack", first.dims(), part.dims()));
            }
            data.extend_from_slice(part.data());
        }

        let mut dims = vec![parts.len()];
        dims.extend_from_slice(first.dims());
        Tensor::new(dims, data)
    }

    pub fn concat(parts: &[&Tensor], axis: usize) -> Result<Self> {
        let first = parts
            .first()
            .ok_or_else(|| HyperUnetError::shape("concat", "at least one tensor", 0))?;
        let rank = first.ndim();
        if axis >= rank {
            return Err(HyperUnetError::shape(
                "concat",
                format!("axis below {}", rank),
                axis,
            ));
        }

        let mut dst_dims = first.dims().to_vec();
        dst_dims[axis] = 0;
        for part in parts {
            let dims = part.dims();
            let compatible = dims.len() == rank
                && (0..rank).all(|i| i == axis || dims[i] == first.dims()[i]);
            if !compatible {
                return Err(HyperUnetError::shape(
                    format!("concat along axis {}", axis),
                    first.dims(),
                    dims,
                ));
            }
            dst_dims[axis] += dims[axis];
        }

        let mut dst = Tensor::zeros(dst_dims);
        let srcs: Vec<&[f32]> = parts.iter().map(|p| p.data()).collect();
        let src_dims: Vec<&[usize]> = parts.iter().map(|p| p.dims()).collect();
        let out_dims = dst.dims().to_vec();
        concat::f32_cpu(&srcs, &src_dims, axis, &out_dims, dst.data_mut());
        Ok(dst)
    }

    pub fn add(&self, other: &Tensor) -> Result<Self> {
        if self.dims() != other.dims() {
            return Err(HyperUnetError::shape("add", self.dims(), other.dims()));
        }
        let data = self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(a, b)| a + b)
            .collect();
        Tensor::new(self.dims().to_vec(), data)
    }
}
