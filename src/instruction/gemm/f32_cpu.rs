use rayon::prelude::*;

/// CPU GEMM for f32 computing `Y = A * B^T + C`.
///
/// A is `(M, K)`, B is `(N, K)` (row-major, one row per output feature as in a
/// linear layer's weight), C is an optional length-N row broadcast over M.
pub fn f32_cpu(
    a_dims: [usize; 2],
    b_dims: [usize; 2],
    a: &[f32],
    b: &[f32],
    c: Option<&[f32]>,
    y: &mut [f32],
) {
    let [m, k] = a_dims;
    let [n, k_b] = b_dims;

    assert_eq!(k, k_b, "GEMM: K dimensions must match");
    assert_eq!(y.len(), m * n, "GEMM: Y must be (M, N)");
    if let Some(c) = c {
        assert_eq!(c.len(), n, "GEMM: C must broadcast across rows");
    }

    if n == 0 {
        return;
    }

    y.par_chunks_mut(n).enumerate().for_each(|(i, row)| {
        let a_row = &a[i * k..(i + 1) * k];
        for (j, out) in row.iter_mut().enumerate() {
            let b_row = &b[j * k..(j + 1) * k];
            let sum: f32 = a_row.iter().zip(b_row).map(|(x, w)| x * w).sum();
            *out = sum + c.map_or(0.0, |c| c[j]);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_hand_computed_product() {
        // A (2x3), B (2x3) -> Y (2x2)
        let a = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let b = [1.0, 0.0, -1.0, 0.5, 0.5, 0.5];
        let c = [10.0, 0.0];
        let mut y = [0.0; 4];
        f32_cpu([2, 3], [2, 3], &a, &b, Some(&c), &mut y);
        assert_eq!(y, [8.0, 3.0, 8.0, 7.5]);
    }
}
