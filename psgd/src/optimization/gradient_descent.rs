use ndarray::Zip;

use super::{Optimizer, Parameter, StepCounter, StepReport};
use crate::Result;

/// Plain gradient descent, the baseline the preconditioned optimizer is measured against.
#[derive(Debug)]
pub struct GradientDescent {
    learning_rate: f32,
    counter: StepCounter,
}

impl GradientDescent {
    /// Creates a new `GradientDescent` optimizer.
    ///
    /// # Arguments
    /// * `learning_rate` - The *length* of the steps taken on `step`.
    ///
    /// # Returns
    /// A new `GradientDescent` instance.
    pub fn new(learning_rate: f32) -> Self {
        Self {
            learning_rate,
            counter: StepCounter::default(),
        }
    }
}

impl Optimizer for GradientDescent {
    /// Makes a step in the opposite direction of each gradient, with a length of `learning_rate`.
    ///
    /// Gradients with the wrong shape always fail the step.
    fn step(&mut self, params: &mut [Parameter]) -> Result<StepReport> {
        let lr = self.learning_rate;
        let mut report = StepReport::new(self.counter.tick().get());

        for param in params {
            let Some((name, data, grad)) = param.parts()? else {
                report.skipped.push(param.name().to_string());
                continue;
            };

            Zip::from(data).and(&grad).for_each(|w, &g| *w -= lr * g);
            report.updated.push(name.to_string());
        }

        Ok(report)
    }

    fn steps(&self) -> u64 {
        self.counter.get()
    }
}
