//! One-sided Kronecker factored PSGD.
//!
//! [`OneSidedKron`] keeps, for every matrix shaped parameter, a triangular whitening factor acting
//! on the smaller of its two trailing dimensions and descends along the whitened momentum.

pub mod config;
pub mod error;
pub mod linalg;
pub mod optimization;
pub mod shape;

pub use config::{FailurePolicy, KronConfig};
pub use error::{PsgdErr, Result};
pub use optimization::{GradientDescent, OneSidedKron, Optimizer, Parameter, StepReport};
pub use shape::MatrixShape;
