use std::{collections::HashMap, num::NonZeroU64};

use log::{debug, trace, warn};
use ndarray::{Array2, ArrayD, ArrayView2, ArrayViewD, Zip};
use rand::{Rng, SeedableRng, rngs::StdRng};

use super::{
    Optimizer, Parameter, StepCounter, StepReport, clip_update_rms, momentum::Momentum,
    precond_update, precondition,
};
use crate::{FailurePolicy, KronConfig, MatrixShape, PsgdErr, Result};

/// Optimizer state kept for every parameter seen so far.
#[derive(Debug, Clone)]
struct ParamState {
    momentum: ArrayD<f32>,
    /// `None` until the first successful refresh, the identity is used in the meantime.
    whitening: Option<Array2<f32>>,
}

/// Stochastic gradient descent preconditioned by a single learned Kronecker factor.
///
/// Every parameter is seen as a (batch of) `m x n` matrices. The optimizer keeps an upper
/// triangular factor `Q` of side `min(m, n)` per parameter and descends along `G·Qᵀ·Q`, where `G`
/// is the bias corrected momentum, transposed when wide so `Q` always acts on the smaller axis.
/// `Q` is refined on random steps by a damped Newton update towards whitening `G`.
pub struct OneSidedKron<R: Rng = StdRng> {
    config: KronConfig,
    counter: StepCounter,
    state: HashMap<String, ParamState>,
    rng: R,
}

impl OneSidedKron<StdRng> {
    /// Creates a new `OneSidedKron` whose probes and gating are driven by a seeded `StdRng`.
    ///
    /// # Errors
    /// Returns an error if the config is invalid.
    pub fn with_seed(config: KronConfig, seed: u64) -> Result<Self> {
        Self::new(config, StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> OneSidedKron<R> {
    /// Creates a new `OneSidedKron` optimizer.
    ///
    /// # Arguments
    /// * `config` - The hyperparameters.
    /// * `rng` - The source of randomness for the probes and for deciding when to refresh the
    ///   whitening factors.
    ///
    /// # Errors
    /// Returns an error if the config is invalid.
    pub fn new(config: KronConfig, rng: R) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            config,
            counter: StepCounter::default(),
            state: HashMap::new(),
            rng,
        })
    }

    pub fn config(&self) -> &KronConfig {
        &self.config
    }

    /// Gives mutable access to the hyperparameters, they are validated again on the next step.
    pub fn config_mut(&mut self) -> &mut KronConfig {
        &mut self.config
    }

    /// Returns the moving average of the gradients of the parameter named `name`.
    pub fn moment(&self, name: &str) -> Option<ArrayViewD<'_, f32>> {
        self.state.get(name).map(|s| s.momentum.view())
    }

    /// Returns the whitening factor of the parameter named `name`, if it was ever refreshed.
    pub fn whitening_matrix(&self, name: &str) -> Option<ArrayView2<'_, f32>> {
        self.state.get(name)?.whitening.as_ref().map(|q| q.view())
    }

    /// Returns the amount of parameters with optimizer state.
    pub fn num_tracked(&self) -> usize {
        self.state.len()
    }

    /// Drops the state of every parameter, the step count is kept.
    pub fn reset_state(&mut self) {
        self.state.clear();
    }

    /// Updates a single parameter.
    ///
    /// # Returns
    /// Whether the whitening factor was refreshed, or an error if the gradient or the stored state
    /// doesn't fit the parameter. Nothing is modified on error.
    fn update_param(
        &mut self,
        step: NonZeroU64,
        name: &str,
        data: &mut ArrayD<f32>,
        grad: ArrayViewD<f32>,
    ) -> Result<bool> {
        let Self {
            config, state, rng, ..
        } = self;

        if config.reject_non_finite && grad.iter().any(|g| !g.is_finite()) {
            return Err(PsgdErr::NonFiniteGradient {
                name: name.to_string(),
            });
        }

        let shape = MatrixShape::of(name, grad.shape())?;
        if let Some(state) = state.get(name) {
            check_state(name, state, &shape)?;
        }

        let state = state
            .entry(name.to_string())
            .or_insert_with(|| ParamState {
                momentum: ArrayD::zeros(grad.raw_dim()),
                whitening: None,
            });

        let g = Momentum::new(config.b1).update(&mut state.momentum, grad, step);
        let mut g = shape.normalize(g.view())?;

        let mut refreshed = false;
        if rng.random::<f32>() < config.preconditioner_update_probability {
            let identity;
            let q = match &state.whitening {
                Some(q) => q.view(),
                None => {
                    identity = Array2::eye(shape.side());
                    identity.view()
                }
            };

            match precond_update(g.view(), q, config.precond_lr, rng) {
                Some(q) => {
                    state.whitening = Some(q);
                    refreshed = true;
                }
                None => {
                    debug!(name = name; "no safe whitening update, keeping previous factor");
                }
            }
        }

        if let Some(q) = &state.whitening {
            g = precondition(g.view(), q.view());
        }

        let mut update = shape.denormalize(g.view())? * shape.rescale();
        if config.clip_update_rms {
            update = clip_update_rms(update);
        }

        let (lr, wd) = (config.lr, config.weight_decay);
        if wd > 0.0 {
            Zip::from(data)
                .and(&update)
                .for_each(|w, &u| *w -= lr * (u + wd * *w));
        } else {
            Zip::from(data).and(&update).for_each(|w, &u| *w -= lr * u);
        }

        trace!(name = name, refreshed = refreshed; "updated parameter");
        Ok(refreshed)
    }
}

/// Makes sure the stored state still matches the shape of the parameter.
fn check_state(name: &str, state: &ParamState, shape: &MatrixShape) -> Result<()> {
    if state.momentum.shape() != shape.dims() {
        return Err(PsgdErr::Shape {
            name: name.to_string(),
            what: "momentum",
            got: state.momentum.shape().to_vec(),
            expected: shape.dims().to_vec(),
        });
    }

    match &state.whitening {
        Some(q) if q.nrows() != shape.side() => Err(PsgdErr::Shape {
            name: name.to_string(),
            what: "whitening matrix",
            got: q.shape().to_vec(),
            expected: vec![shape.side(); 2],
        }),
        _ => Ok(()),
    }
}

impl<R: Rng> Optimizer for OneSidedKron<R> {
    fn step(&mut self, params: &mut [Parameter]) -> Result<StepReport> {
        self.config.validate()?;

        let step = self.counter.tick();
        let mut report = StepReport::new(step.get());

        for param in params.iter_mut() {
            let name = param.name().to_string();
            let res = match param.parts() {
                Ok(Some((name, data, grad))) => self.update_param(step, name, data, grad),
                Ok(None) => {
                    report.skipped.push(name);
                    continue;
                }
                Err(e) => Err(e),
            };

            match res {
                Ok(refreshed) => {
                    if refreshed {
                        report.refreshed.push(name.clone());
                    }
                    report.updated.push(name);
                }
                Err(e) if self.config.failure_policy == FailurePolicy::FailFast => return Err(e),
                Err(e) => {
                    warn!("failed to update parameter {name}: {e}");
                    report.failed.push((name, e));
                }
            }
        }

        debug!(
            step = report.step,
            updated = report.updated.len(),
            refreshed = report.refreshed.len(),
            failed = report.failed.len();
            "step finished"
        );

        Ok(report)
    }

    fn steps(&self) -> u64 {
        self.counter.get()
    }
}
