use ndarray::{Array2, Array3, ArrayView2, ArrayView3, linalg};
use ndarray_rand::RandomExt;
use rand::Rng;
use rand_distr::StandardNormal;

use crate::linalg::{Side, norm_lower_bound, solve_upper_triangular, triu};

/// Refines the whitening factor `q` with a single damped Newton step.
///
/// The step matches the curvature seen through the current preconditioner, `AhA = (G·Qᵀ)ᵀ·(G·Qᵀ)`,
/// against the response to a gaussian probe, `BBh = Bhᵀ·Bh` with `Bh·Q = V`. The difference is
/// projected onto the upper-triangular matrices, so `q` stays upper-triangular across updates.
/// Every slice of a batch contributes to the same pair of statistics.
///
/// # Arguments
/// * `g` - A batch of tall gradient matrices of shape `(batch, m, n)`, `m >= n`.
/// * `q` - The current `n x n` upper-triangular factor.
/// * `precond_lr` - The learning rate of the factor.
/// * `rng` - The source of the probe.
///
/// # Returns
/// The refined factor, or `None` if no safe update exists for this step: `q` is singular or the
/// step normalizer is zero or not finite.
pub fn precond_update<R: Rng + ?Sized>(
    g: ArrayView3<f32>,
    q: ArrayView2<f32>,
    precond_lr: f32,
    rng: &mut R,
) -> Option<Array2<f32>> {
    let (_, m, n) = g.dim();
    let probe_scale = (m as f32).sqrt().recip();

    let mut aha = Array2::zeros((n, n));
    let mut bbh = Array2::zeros((n, n));

    for slice in g.outer_iter() {
        let v = Array2::<f32>::random_using((m, n), StandardNormal, rng) * probe_scale;
        let bh = solve_upper_triangular(q, v.view(), Side::Right)?;
        let a = slice.dot(&q.t());

        linalg::general_mat_mul(1.0, &a.t(), &a, 1.0, &mut aha);
        linalg::general_mat_mul(1.0, &bh.t(), &bh, 1.0, &mut bbh);
    }

    let lambda = norm_lower_bound((&aha + &bbh).view());
    if !(lambda > 0.0 && lambda.is_finite()) {
        return None;
    }

    let mut q_next = q.to_owned();
    let grad = triu((&aha - &bbh).view());
    linalg::general_mat_mul(-precond_lr / lambda, &grad, &q, 1.0, &mut q_next);

    let finite = q_next.iter().all(|x| x.is_finite());
    finite.then_some(q_next)
}

/// Applies the preconditioner `P = Qᵀ·Q` to every slice of `g`, that is `(G·Qᵀ)·Q`.
///
/// `P` is never formed, so a zero slice stays exactly zero however large `q` grows.
///
/// # Arguments
/// * `g` - A batch of tall gradient matrices of shape `(batch, m, n)`.
/// * `q` - The `n x n` whitening factor.
pub fn precondition(g: ArrayView3<f32>, q: ArrayView2<f32>) -> Array3<f32> {
    let (_, m, n) = g.dim();
    let mut out = Array3::zeros(g.dim());
    let mut a = Array2::zeros((m, n));

    for (mut o, slice) in out.outer_iter_mut().zip(g.outer_iter()) {
        linalg::general_mat_mul(1.0, &slice, &q.t(), 0.0, &mut a);
        linalg::general_mat_mul(1.0, &a, &q, 0.0, &mut o);
    }

    out
}

#[cfg(test)]
mod tests {
    use ndarray::{Array, Axis, array, concatenate};
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn random_upper(n: usize, rng: &mut StdRng) -> Array2<f32> {
        let mut q = triu(Array2::<f32>::random_using((n, n), StandardNormal, rng).view());
        q.diag_mut().mapv_inplace(|d: f32| 1.0 + d.abs());
        q
    }

    fn max_below_diagonal(q: &Array2<f32>) -> f32 {
        q.indexed_iter()
            .filter(|((i, j), _)| i > j)
            .fold(0.0, |acc, (_, x)| acc.max(x.abs()))
    }

    #[test]
    fn stays_upper_triangular() {
        let mut rng = StdRng::seed_from_u64(1);

        for (batch, m, n) in [(1, 5, 5), (1, 9, 3), (3, 6, 4), (2, 1, 1)] {
            let mut q = random_upper(n, &mut rng);

            for _ in 0..10 {
                let g = Array3::<f32>::random_using((batch, m, n), StandardNormal, &mut rng);
                q = precond_update(g.view(), q.view(), 0.1, &mut rng).unwrap();
                assert!(max_below_diagonal(&q) <= 1e-6, "({batch}, {m}, {n}): {q:?}");
                assert!(q.iter().all(|x| x.is_finite()));
            }
        }
    }

    #[test]
    fn zero_lr_keeps_factor() {
        let mut rng = StdRng::seed_from_u64(2);
        let q = random_upper(4, &mut rng);
        let g = Array3::<f32>::random_using((1, 6, 4), StandardNormal, &mut rng);

        let q_next = precond_update(g.view(), q.view(), 0.0, &mut rng).unwrap();
        assert_eq!(q_next, q);
    }

    #[test]
    fn singular_factor_is_skipped() {
        let mut rng = StdRng::seed_from_u64(3);
        let q: Array2<f32> = array![[1.0, 0.5], [0.0, 0.0]];
        let g = Array3::ones((1, 2, 2));

        assert!(precond_update(g.view(), q.view(), 0.1, &mut rng).is_none());
    }

    #[test]
    fn empty_factor_is_skipped() {
        let mut rng = StdRng::seed_from_u64(4);
        let q = Array2::<f32>::zeros((0, 0));
        let g = Array3::<f32>::zeros((1, 3, 0));

        assert!(precond_update(g.view(), q.view(), 0.1, &mut rng).is_none());
    }

    #[test]
    fn whitens_isotropic_gradient() {
        // Sixteen stacked copies of 2.5·I give GᵀG = 100·I, which is whitened by Q = I / √10.
        let block = Array2::<f32>::eye(4) * 2.5;
        let views = vec![block.view(); 16];
        let g = concatenate(Axis(0), &views).unwrap().insert_axis(Axis(0));
        assert_eq!(g.dim(), (1, 64, 4));

        let mut rng = StdRng::seed_from_u64(5);
        let mut q = Array2::eye(4);
        for _ in 0..500 {
            q = precond_update(g.view(), q.view(), 0.1, &mut rng).unwrap();
        }

        for d in q.diag() {
            assert!(*d > 0.22 && *d < 0.42, "{q:?}");
        }
        let off = q
            .indexed_iter()
            .filter(|((i, j), _)| i != j)
            .fold(0.0, |acc: f32, (_, x)| acc.max(x.abs()));
        assert!(off < 0.1, "{q:?}");
    }

    #[test]
    fn overflowing_step_is_skipped() {
        let mut rng = StdRng::seed_from_u64(6);
        let q: Array2<f32> = array![[10.0]];
        let g = Array3::zeros((1, 4, 1));

        assert!(precond_update(g.view(), q.view(), 3e38, &mut rng).is_none());
    }

    #[test]
    fn zero_gradient_under_huge_factor() {
        let g = Array3::zeros((2, 3, 2));
        let q: Array2<f32> = array![[1e30, 5e29], [0.0, 1e30]];

        let out = precondition(g.view(), q.view());
        assert_eq!(out, g);
    }

    #[test]
    fn identity_preconditioner_is_a_noop() {
        let g = Array::from_iter((0..12).map(|x| x as f32 - 5.0))
            .into_shape_with_order((2, 3, 2))
            .unwrap();
        let q = Array2::eye(2);

        assert_eq!(precondition(g.view(), q.view()), g);
    }

    #[test]
    fn applies_factor_per_slice() {
        let g: Array3<f32> = array![[[1.0, 2.0]], [[-1.0, 0.5]]];
        let q: Array2<f32> = array![[2.0, 1.0], [0.0, 1.0]];
        let p = q.t().dot(&q);

        let out = precondition(g.view(), q.view());
        for (o, slice) in out.outer_iter().zip(g.outer_iter()) {
            assert_eq!(o, slice.dot(&p));
        }
    }
}
