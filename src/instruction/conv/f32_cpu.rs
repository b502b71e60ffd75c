use rayon::prelude::*;

/// Geometry shared by every 2D convolution call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Conv2dParams {
    pub stride: [usize; 2],
    pub padding: [usize; 2],
    pub dilation: [usize; 2],
    pub group: usize,
}

/// Grouped 2D convolution for f32 tensors.
///
/// Layouts: src `[N, C, H, W]`, weight `[M, C/group, kh, kw]`, dst `[N, M, OH, OW]`.
/// Each output plane is filled independently, and every output element sums
/// over input channel, kernel row and kernel column in that order.
pub fn f32_cpu(
    src_dims: [usize; 4],
    weight_dims: [usize; 4],
    dst_dims: [usize; 4],
    src: &[f32],
    weight: &[f32],
    bias: Option<&[f32]>,
    dst: &mut [f32],
    params: &Conv2dParams,
) {
    let [_, c, h, w] = src_dims;
    let [m, c_per_group, kh, kw] = weight_dims;
    let [_, _, oh, ow] = dst_dims;
    let group = params.group;

    if group == 0 || c % group != 0 || m % group != 0 || c / group != c_per_group {
        panic!(
            "conv f32_cpu: unsupported group configuration: group={}, C={}, M={}, C/group={}",
            group, c, m, c_per_group
        );
    }
    let m_per_group = m / group;

    let [sy, sx] = params.stride;
    let [py, px] = params.padding;
    let [dy, dx] = params.dilation;

    let plane = oh * ow;
    if plane == 0 {
        return;
    }

    dst.par_chunks_mut(plane)
        .enumerate()
        .for_each(|(plane_idx, out)| {
            let ni = plane_idx / m;
            let mi = plane_idx % m;

            // input channel range for this output channel's group
            let c_start = (mi / m_per_group) * c_per_group;
            let b = bias.map_or(0.0, |b| b[mi]);

            for oy in 0..oh {
                for ox in 0..ow {
                    let mut acc: f32 = 0.0;

                    for ci in 0..c_per_group {
                        let src_base = (ni * c + c_start + ci) * h * w;
                        let w_base = (mi * c_per_group + ci) * kh * kw;

                        for ky in 0..kh {
                            // in_pos = out_pos*stride - pad + k*dilation
                            let iy = (oy * sy + ky * dy) as isize - py as isize;
                            if iy < 0 || iy >= h as isize {
                                continue;
                            }
                            let row = src_base + iy as usize * w;

                            for kx in 0..kw {
                                let ix = (ox * sx + kx * dx) as isize - px as isize;
                                if ix < 0 || ix >= w as isize {
                                    continue;
                                }
                                acc += src[row + ix as usize] * weight[w_base + ky * kw + kx];
                            }
                        }
                    }

                    out[oy * ow + ox] = acc + b;
                }
            }
        });
}
