mod clip;
mod gradient_descent;
mod kron;
mod momentum;
mod optimizer;
mod preconditioner;

pub use clip::{CLIP_EPS, CLIP_TARGET_RMS, clip_update_rms, rms};
pub use gradient_descent::GradientDescent;
pub use kron::OneSidedKron;
pub use momentum::Momentum;
pub use optimizer::{Optimizer, Parameter, StepCounter, StepReport};
pub use preconditioner::{precond_update, precondition};
