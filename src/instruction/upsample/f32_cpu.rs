use rayon::prelude::*;

// Source coordinate for an aligned-corners resize
fn source_coord(dst_idx: usize, src_len: usize, dst_len: usize) -> (usize, usize, f32) {
    if dst_len <= 1 || src_len <= 1 {
        return (0, 0, 0.0);
    }
    let pos = dst_idx as f32 * (src_len - 1) as f32 / (dst_len - 1) as f32;
    let lo = (pos.floor() as usize).min(src_len - 1);
    let hi = (lo + 1).min(src_len - 1);
    (lo, hi, pos - lo as f32)
}

/// Bilinear resize of `[N, C, H, W]` with aligned corners: the corner pixels of
/// source and destination coincide.
pub fn f32_cpu(src_dims: [usize; 4], dst_dims: [usize; 4], src: &[f32], dst: &mut [f32]) {
    let [_, _, h, w] = src_dims;
    let [_, _, oh, ow] = dst_dims;

    let plane = oh * ow;
    if plane == 0 {
        return;
    }

    let rows: Vec<(usize, usize, f32)> = (0..oh).map(|y| source_coord(y, h, oh)).collect();
    let cols: Vec<(usize, usize, f32)> = (0..ow).map(|x| source_coord(x, w, ow)).collect();

    dst.par_chunks_mut(plane)
        .enumerate()
        .for_each(|(plane_idx, out)| {
            let src_plane = &src[plane_idx * h * w..(plane_idx + 1) * h * w];

            for (oy, &(y0, y1, fy)) in rows.iter().enumerate() {
                for (ox, &(x0, x1, fx)) in cols.iter().enumerate() {
                    let top = src_plane[y0 * w + x0] * (1.0 - fx) + src_plane[y0 * w + x1] * fx;
                    let bottom = src_plane[y1 * w + x0] * (1.0 - fx) + src_plane[y1 * w + x1] * fx;
                    out[oy * ow + ox] = top * (1.0 - fy) + bottom * fy;
                }
            }
        });
}
