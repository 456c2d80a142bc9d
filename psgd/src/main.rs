use std::{env, fs};

use anyhow::Context;
use log::info;
use ndarray::{Array1, Array2, ArrayView2, Axis, Ix2};
use ndarray_rand::RandomExt;
use psgd::{GradientDescent, KronConfig, OneSidedKron, Optimizer, Parameter};
use rand::{SeedableRng, rngs::StdRng};
use rand_distr::StandardNormal;

const STEPS: usize = 500;
const SAMPLES: usize = 256;
const INPUTS: usize = 4;
const OUTPUTS: usize = 16;

/// A linear regression whose inputs have very different scales.
struct LeastSquares {
    x: Array2<f32>,
    y: Array2<f32>,
}

impl LeastSquares {
    fn new(rng: &mut StdRng) -> Self {
        let scales = Array1::from_iter((0..INPUTS).map(|i| 10f32.powf(-(i as f32) / 2.0)));
        let x = Array2::<f32>::random_using((SAMPLES, INPUTS), StandardNormal, rng) * &scales;
        let w = Array2::<f32>::random_using((INPUTS, OUTPUTS), StandardNormal, rng);
        let y = x.dot(&w);

        Self { x, y }
    }

    /// Mean squared error of `w` and its gradient.
    fn loss_and_grad(&self, w: ArrayView2<f32>) -> (f32, Array2<f32>) {
        let r = self.x.dot(&w) - &self.y;
        let loss = r.mapv(|r| r * r).sum_axis(Axis(1)).mean().unwrap_or_default();
        let grad = self.x.t().dot(&r) * (2.0 / SAMPLES as f32);

        (loss, grad)
    }
}

fn train<O: Optimizer>(
    name: &str,
    optimizer: &mut O,
    problem: &LeastSquares,
) -> anyhow::Result<f32> {
    let mut params = [Parameter::new(
        "w",
        Array2::<f32>::zeros((INPUTS, OUTPUTS)).into_dyn(),
    )];

    let mut loss = f32::INFINITY;
    for step in 0..STEPS {
        let w = params[0].data().into_dimensionality::<Ix2>()?;
        let (l, grad) = problem.loss_and_grad(w);
        loss = l;

        params[0].set_grad(grad.into_dyn());
        let report = optimizer.step(&mut params)?;
        anyhow::ensure!(report.is_clean(), "step {step} failed: {:?}", report.failed);

        if step % 50 == 0 {
            info!("{name}: step {step}, loss {loss:.6}");
        }
    }

    info!("{name}: finished after {} steps, loss {loss:.6}", optimizer.steps());
    Ok(loss)
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = match env::args().nth(1) {
        Some(path) => {
            let content =
                fs::read_to_string(&path).with_context(|| format!("cannot read '{path}'"))?;
            KronConfig::from_json(&content)?
        }
        None => KronConfig {
            lr: 0.01,
            ..Default::default()
        },
    };
    info!("using {config:?}");

    let mut rng = StdRng::seed_from_u64(42);
    let problem = LeastSquares::new(&mut rng);

    let sgd = train("sgd", &mut GradientDescent::new(0.05), &problem)?;
    let kron = train("kron", &mut OneSidedKron::new(config, rng)?, &problem)?;

    println!("final loss: sgd {sgd:.6}, kron {kron:.6}");
    Ok(())
}
