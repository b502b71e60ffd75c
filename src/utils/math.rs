use rand::Rng;
use std::f32::consts::PI;

/// Box-Muller transform to generate normal distribution
pub fn normal_sample<R: Rng + ?Sized>(rng: &mut R, mean: f32, std_dev: f32) -> f32 {
    // Open interval at zero so ln() stays finite
    let u1: f32 = rng.random_range(f32::MIN_POSITIVE..1.0);
    let u2: f32 = rng.random_range(f32::MIN_POSITIVE..1.0);

    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos();
    mean + std_dev * z
}

/// Product of a shape's dimensions
pub fn volume(dims: &[usize]) -> usize {
    dims.iter().product()
}
