pub fn f32_cpu(
    srcs: &[&[f32]],
    src_dims_vec: &[&[usize]],
    axis: usize,
    dst_dims: &[usize],
    dst: &mut [f32],
) {
    assert!(!srcs.is_empty(), "no source tensors provided to concat");

    let rank = dst_dims.len();
    assert!(axis < rank, "concat axis out of bounds");

    // Dims other than 'axis' must match the destination
    for src_dims in src_dims_vec {
        assert_eq!(src_dims.len(), rank, "source rank mismatch");
        for (i, &d) in src_dims.iter().enumerate() {
            if i != axis {
                assert_eq!(d, dst_dims[i], "non-concat dimension mismatch");
            }
        }
    }

    // outer = product of dims[0..axis]
    // inner = product of dims[axis+1..]
    let outer: usize = dst_dims[..axis].iter().product();
    let inner: usize = dst_dims[axis + 1..].iter().product();

    let total_elements: usize = dst_dims.iter().product();
    assert_eq!(dst.len(), total_elements, "dst buffer size mismatch");

    // For each outer index, copy one contiguous block per source
    let mut dst_offset = 0usize;
    for outer_idx in 0..outer {
        for (src, src_dims) in srcs.iter().zip(src_dims_vec.iter()) {
            let block = src_dims[axis] * inner;
            let src_start = outer_idx * block;

            dst[dst_offset..dst_offset + block].copy_from_slice(&src[src_start..src_start + block]);
            dst_offset += block;
        }
    }
}
