pub mod error;
pub mod math;

pub use error::{HyperUnetError, Result};
