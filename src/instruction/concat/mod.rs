mod f32_cpu;
pub use f32_cpu::f32_cpu;
