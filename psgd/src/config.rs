use serde::{Deserialize, Serialize};

use crate::{PsgdErr, Result};

/// What a step does when one of the parameters can't be updated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Record the failure in the step report and keep updating the other parameters.
    #[default]
    Continue,
    /// Stop at the first failing parameter and return its error.
    FailFast,
}

/// Hyperparameters of the one-sided Kronecker preconditioned optimizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KronConfig {
    pub lr: f32,
    pub b1: f32,
    /// Decoupled weight decay, the parameters shrink by `lr * weight_decay` each step.
    pub weight_decay: f32,
    /// The chance of refreshing the whitening factor of a parameter on a given step.
    pub preconditioner_update_probability: f32,
    pub precond_lr: f32,
    pub clip_update_rms: bool,
    /// Refuse to update parameters whose gradient holds NaN or Inf, instead of letting them
    /// poison the optimizer state.
    pub reject_non_finite: bool,
    pub failure_policy: FailurePolicy,
}

impl Default for KronConfig {
    fn default() -> Self {
        Self {
            lr: 3e-4,
            b1: 0.9,
            weight_decay: 0.0,
            preconditioner_update_probability: 1.0,
            precond_lr: 0.1,
            clip_update_rms: true,
            reject_non_finite: false,
            failure_policy: FailurePolicy::Continue,
        }
    }
}

impl KronConfig {
    /// Parses a config from JSON, missing fields take their default value.
    ///
    /// # Errors
    /// Returns an error if the JSON is malformed or the resulting config is invalid.
    pub fn from_json(s: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every hyperparameter lies in its domain.
    ///
    /// # Errors
    /// Returns `PsgdErr::InvalidConfig` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        let non_negative = |x: f32| x.is_finite() && x >= 0.0;

        check(non_negative(self.lr), "lr", "must be finite and non negative")?;
        check((0.0..1.0).contains(&self.b1), "b1", "must lie in [0, 1)")?;
        check(
            non_negative(self.weight_decay),
            "weight_decay",
            "must be finite and non negative",
        )?;
        check(
            (0.0..=1.0).contains(&self.preconditioner_update_probability),
            "preconditioner_update_probability",
            "must lie in [0, 1]",
        )?;
        check(
            non_negative(self.precond_lr),
            "precond_lr",
            "must be finite and non negative",
        )
    }
}

fn check(ok: bool, field: &'static str, reason: &'static str) -> Result<()> {
    if ok {
        Ok(())
    } else {
        Err(PsgdErr::InvalidConfig { field, reason })
    }
}
