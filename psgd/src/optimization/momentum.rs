use std::num::NonZeroU64;

use ndarray::{ArrayD, ArrayViewD, Zip};

/// Exponential moving average of the gradients with bias correction.
#[derive(Debug, Clone, Copy)]
pub struct Momentum {
    beta: f32,
}

impl Momentum {
    /// Creates a new `Momentum` tracker.
    ///
    /// # Arguments
    /// * `beta` - The decay of the moving average, must lie in `[0, 1)`.
    pub fn new(beta: f32) -> Self {
        Self { beta }
    }

    /// Folds `g` into the moving average `v` and returns the bias corrected estimate.
    ///
    /// # Arguments
    /// * `v` - The moving average, updated in place to `beta * v + (1 - beta) * g`.
    /// * `g` - The gradient of the current step, must have the shape of `v`.
    /// * `step` - The optimizer's step count, starting at one.
    ///
    /// # Returns
    /// `v / (1 - beta^step)`.
    pub fn update(&self, v: &mut ArrayD<f32>, g: ArrayViewD<f32>, step: NonZeroU64) -> ArrayD<f32> {
        let b = self.beta;

        Zip::from(&mut *v)
            .and(&g)
            .for_each(|v, &g| *v = b * *v + (1. - b) * g);

        let bc = 1. - b.powi(step.get().min(i32::MAX as u64) as i32);
        v.mapv(|v| v / bc)
    }
}
