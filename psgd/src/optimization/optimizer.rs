use std::num::NonZeroU64;

use ndarray::{ArrayD, ArrayViewD};

use crate::{PsgdErr, Result};

/// A named trainable tensor together with the gradient of the current step.
///
/// The caller owns its parameters, optimizers only borrow them mutably for the duration of a step.
#[derive(Debug, Clone)]
pub struct Parameter {
    name: String,
    data: ArrayD<f32>,
    grad: Option<ArrayD<f32>>,
}

impl Parameter {
    /// Creates a new `Parameter` without a gradient.
    ///
    /// # Arguments
    /// * `name` - A name unique among the parameters handed to the same optimizer.
    /// * `data` - The initial value of the parameter.
    pub fn new(name: impl Into<String>, data: ArrayD<f32>) -> Self {
        Self {
            name: name.into(),
            data,
            grad: None,
        }
    }

    /// Same as `Parameter::new` but with a gradient already attached.
    pub fn with_grad(name: impl Into<String>, data: ArrayD<f32>, grad: ArrayD<f32>) -> Self {
        Self {
            grad: Some(grad),
            ..Self::new(name, data)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> ArrayViewD<'_, f32> {
        self.data.view()
    }

    pub fn data_mut(&mut self) -> &mut ArrayD<f32> {
        &mut self.data
    }

    pub fn grad(&self) -> Option<ArrayViewD<'_, f32>> {
        self.grad.as_ref().map(|g| g.view())
    }

    pub fn set_grad(&mut self, grad: ArrayD<f32>) {
        self.grad = Some(grad);
    }

    /// Detaches the gradient, leaving the parameter frozen until a new one is set.
    pub fn take_grad(&mut self) -> Option<ArrayD<f32>> {
        self.grad.take()
    }

    /// Zeroes the gradient in place, allocating it if missing.
    pub fn zero_grad(&mut self) {
        let dim = self.data.raw_dim();
        self.grad.get_or_insert_with(|| ArrayD::zeros(dim)).fill(0.0);
    }

    /// Splits the parameter into its name, mutable data and gradient.
    ///
    /// # Errors
    /// Returns an error if the gradient doesn't have the shape of the data.
    #[allow(clippy::type_complexity)]
    pub(crate) fn parts(
        &mut self,
    ) -> Result<Option<(&str, &mut ArrayD<f32>, ArrayViewD<'_, f32>)>> {
        let Some(grad) = &self.grad else {
            return Ok(None);
        };

        if grad.shape() != self.data.shape() {
            return Err(PsgdErr::Shape {
                name: self.name.clone(),
                what: "gradient",
                got: grad.shape().to_vec(),
                expected: self.data.shape().to_vec(),
            });
        }

        Ok(Some((&self.name, &mut self.data, grad.view())))
    }
}

/// Monotonic count of the steps an optimizer has taken.
#[derive(Debug, Clone, Copy, Default)]
pub struct StepCounter(u64);

impl StepCounter {
    /// Advances the counter.
    ///
    /// # Returns
    /// The number of the step that is starting, at least one.
    pub fn tick(&mut self) -> NonZeroU64 {
        self.0 += 1;
        NonZeroU64::new(self.0).unwrap_or(NonZeroU64::MAX)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

/// What happened to every parameter during a step.
#[derive(Debug, Default)]
pub struct StepReport {
    pub step: u64,
    /// Parameters whose data was updated.
    pub updated: Vec<String>,
    /// Parameters without a gradient.
    pub skipped: Vec<String>,
    /// Parameters whose whitening factor was refreshed.
    pub refreshed: Vec<String>,
    /// Parameters that couldn't be updated, only filled under `FailurePolicy::Continue`.
    pub failed: Vec<(String, PsgdErr)>,
}

impl StepReport {
    pub fn new(step: u64) -> Self {
        Self {
            step,
            ..Default::default()
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Defines the strategy for updating named parameters based on their gradients.
pub trait Optimizer {
    /// Updates every parameter holding a gradient, parameters without one are left untouched.
    ///
    /// # Arguments
    /// * `params` - The parameters to update, in a stable order.
    ///
    /// # Returns
    /// A report of the step or an error if a parameter couldn't be updated and the optimizer was
    /// asked to fail fast.
    fn step(&mut self, params: &mut [Parameter]) -> Result<StepReport>;

    /// Returns the amount of steps taken so far.
    fn steps(&self) -> u64;
}
