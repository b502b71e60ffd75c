use rayon::prelude::*;

/// 2D max pooling over `[N, C, H, W]` without padding. No indices are produced.
pub fn f32_cpu(
    src_dims: [usize; 4],
    dst_dims: [usize; 4],
    src: &[f32],
    dst: &mut [f32],
    kernel: [usize; 2],
    stride: [usize; 2],
) {
    let [_, _, h, w] = src_dims;
    let [_, _, oh, ow] = dst_dims;

    let plane = oh * ow;
    if plane == 0 {
        return;
    }

    dst.par_chunks_mut(plane)
        .enumerate()
        .for_each(|(plane_idx, out)| {
            let src_plane = &src[plane_idx * h * w..(plane_idx + 1) * h * w];

            for oy in 0..oh {
                for ox in 0..ow {
                    let mut max_val = f32::NEG_INFINITY;
                    for ky in 0..kernel[0] {
                        let iy = oy * stride[0] + ky;
                        if iy >= h {
                            continue;
                        }
                        for kx in 0..kernel[1] {
                            let ix = ox * stride[1] + kx;
                            if ix < w {
                                max_val = max_val.max(src_plane[iy * w + ix]);
                            }
                        }
                    }
                    out[oy * ow + ox] = max_val;
                }
            }
        });
}
