use std::{
    error::Error,
    fmt::{self, Display},
};

use ndarray::ShapeError;

/// The result type used in the entire optimizer crate.
pub type Result<T> = std::result::Result<T, PsgdErr>;

/// The optimizer crate's error type.
#[derive(Debug)]
pub enum PsgdErr {
    Shape {
        name: String,
        what: &'static str,
        got: Vec<usize>,
        expected: Vec<usize>,
    },
    RankTooLow {
        name: String,
        rank: usize,
    },
    NonFiniteGradient {
        name: String,
    },
    InvalidConfig {
        field: &'static str,
        reason: &'static str,
    },
    Reshape(ShapeError),
    Json(serde_json::Error),
}

impl Display for PsgdErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PsgdErr::Shape {
                name,
                what,
                got,
                expected,
            } => write!(
                f,
                "shape mismatch for {what} of parameter '{name}': got {got:?}, expected {expected:?}"
            ),
            PsgdErr::RankTooLow { name, rank } => write!(
                f,
                "the gradient of parameter '{name}' has {rank} dimension(s), at least 2 are required"
            ),
            PsgdErr::NonFiniteGradient { name } => {
                write!(f, "the gradient of parameter '{name}' contains NaN or Inf")
            }
            PsgdErr::InvalidConfig { field, reason } => {
                write!(f, "invalid optimizer config, {field} {reason}")
            }
            PsgdErr::Reshape(e) => write!(f, "reshape error: {e}"),
            PsgdErr::Json(e) => write!(f, "invalid JSON config: {e}"),
        }
    }
}

impl Error for PsgdErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PsgdErr::Reshape(e) => Some(e),
            PsgdErr::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ShapeError> for PsgdErr {
    fn from(value: ShapeError) -> Self {
        Self::Reshape(value)
    }
}

impl From<serde_json::Error> for PsgdErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}
