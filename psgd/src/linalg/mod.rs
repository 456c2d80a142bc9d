//! Dense matrix primitives the optimizer needs on top of `ndarray`.

mod norm;
mod triangular;

pub use norm::{max_abs, norm_lower_bound};
pub use triangular::{Side, solve_upper_triangular, triu};
