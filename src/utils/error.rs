use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HyperUnetError {
    #[error("Shape mismatch in {context}: expected {expected}, got {actual}")]
    ShapeMismatch {
        context: String,
        expected: String,
        actual: String,
    },

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Device error: {0}")]
    Device(String),

    #[error("Concurrency error: {0}")]
    Concurrency(String),
}

impl HyperUnetError {
    pub fn shape(
        context: impl Into<String>,
        expected: impl std::fmt::Debug,
        actual: impl std::fmt::Debug,
    ) -> Self {
        HyperUnetError::ShapeMismatch {
            context: context.into(),
            expected: describe(expected),
            actual: describe(actual),
        }
    }

    /// Prefix the error's location with an outer context, e.g. a layer name.
    pub fn in_context(self, outer: impl std::fmt::Display) -> Self {
        match self {
            HyperUnetError::ShapeMismatch {
                context,
                expected,
                actual,
            } => HyperUnetError::ShapeMismatch {
                context: format!("{}: {}", outer, context),
                expected,
                actual,
            },
            HyperUnetError::InvalidGeometry(msg) => {
                HyperUnetError::InvalidGeometry(format!("{}: {}", outer, msg))
            }
            other => other,
        }
    }
}

// Debug text, minus the quotes a plain string picks up
fn describe(value: impl std::fmt::Debug) -> String {
    let text = format!("{:?}", value);
    match text.strip_prefix('"').and_then(|t| t.strip_suffix('"')) {
        Some(inner) => inner.to_string(),
        None => text,
    }
}

pub type Result<T> = std::result::Result<T, HyperUnetError>;
