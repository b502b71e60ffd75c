pub fn relu_f32_cpu(data: &mut [f32]) {
    for v in data.iter_mut() {
        *v = v.max(0.0);
    }
}

/// tanh, bounding every value into [-1, 1]
pub fn tanh_f32_cpu(data: &mut [f32]) {
    for v in data.iter_mut() {
        *v = v.tanh().clamp(-1.0, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relu_zeroes_negatives() {
        let mut data = [-1.0, 0.0, 2.5];
        relu_f32_cpu(&mut data);
        assert_eq!(data, [0.0, 0.0, 2.5]);
    }

    #[test]
    fn tanh_is_bounded() {
        let mut data = [-1e6, -0.5, 0.0, 0.5, 1e6];
        tanh_f32_cpu(&mut data);
        assert!(data.iter().all(|v| (-1.0..=1.0).contains(v)));
        assert_eq!(data[2], 0.0);
    }
}
