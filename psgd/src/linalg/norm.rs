use ndarray::{Array1, ArrayView1, ArrayView2, Axis};

/// Returns the largest absolute entry of `a`, that is, the infinity norm of the flattened matrix.
pub fn max_abs(a: ArrayView2<f32>) -> f32 {
    a.fold(0.0, |acc, &x| acc.max(x.abs()))
}

/// Cheap lower bound on the spectral norm of a square matrix.
///
/// Makes a single power iteration step seeded with the row or column of `a` holding the most
/// energy. The result never exceeds `‖a‖₂`, which makes it a safe denominator for damping a step,
/// but it is not an estimate of the norm itself.
///
/// # Arguments
/// * `a` - A square matrix.
///
/// # Returns
/// The lower bound, `0` for the zero matrix.
pub fn norm_lower_bound(a: ArrayView2<f32>) -> f32 {
    let max_abs = max_abs(a);
    if max_abs > 0.0 {
        lower_bound(a, max_abs)
    } else {
        max_abs
    }
}

fn lower_bound(a: ArrayView2<f32>, max_abs: f32) -> f32 {
    // Scaling by the largest entry keeps the products below from overflowing.
    let a = a.mapv(|x| x / max_abs);
    let aa = a.mapv(|x| x * x);

    let (i, value0) = argmax(aa.sum_axis(Axis(0)).view());
    let (j, value1) = argmax(aa.sum_axis(Axis(1)).view());

    if value0 > value1 {
        let x = a.column(i).dot(&a);
        let x = normalized(x);
        max_abs * l2(x.dot(&a.t()).view())
    } else {
        let x = a.dot(&a.row(j));
        let x = normalized(x);
        max_abs * l2(a.t().dot(&x).view())
    }
}

fn argmax(v: ArrayView1<f32>) -> (usize, f32) {
    v.iter()
        .copied()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, x)| {
            if x > best.1 { (i, x) } else { best }
        })
}

fn l2(v: ArrayView1<f32>) -> f32 {
    v.dot(&v).sqrt()
}

fn normalized(v: Array1<f32>) -> Array1<f32> {
    let norm = l2(v.view());
    v / norm
}

#[cfg(test)]
mod tests {
    use ndarray::{Array2, array};
    use ndarray_rand::RandomExt;
    use rand::{SeedableRng, rngs::StdRng};
    use rand_distr::StandardNormal;

    use super::*;

    fn frobenius(a: &Array2<f32>) -> f32 {
        a.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    /// Largest eigenvalue of a symmetric PSD matrix, by power iteration in `f64`.
    fn spectral_norm(a: &Array2<f32>) -> f32 {
        let a = a.mapv(f64::from);
        let mut v = Array1::<f64>::ones(a.nrows());
        let mut norm = 0.0;
        for _ in 0..5000 {
            let w = a.dot(&v);
            norm = w.dot(&w).sqrt();
            if norm == 0.0 {
                break;
            }
            v = w / norm;
        }
        norm as f32
    }

    fn rotation(n: usize, p: usize, q: usize, theta: f32) -> Array2<f32> {
        let mut r = Array2::eye(n);
        let (s, c) = theta.sin_cos();
        r[[p, p]] = c;
        r[[q, q]] = c;
        r[[p, q]] = -s;
        r[[q, p]] = s;
        r
    }

    #[test]
    fn zero_matrix() {
        let a = Array2::<f32>::zeros((4, 4));
        assert_eq!(norm_lower_bound(a.view()), 0.0);
    }

    #[test]
    fn diagonal_is_exact() {
        let a = Array2::from_diag(&array![0.5, 3.0, 1.0]);
        let lb = norm_lower_bound(a.view());
        assert!((lb - 3.0).abs() < 1e-5, "lb = {lb}");
    }

    #[test]
    fn row_and_column_seeds() {
        let rows: Array2<f32> = array![[3.0, 4.0], [0.0, 0.0]];
        let lb = norm_lower_bound(rows.view());
        assert!((lb - 5.0).abs() < 1e-5, "lb = {lb}");

        let cols = rows.t().to_owned();
        let lb = norm_lower_bound(cols.view());
        assert!((lb - 5.0).abs() < 1e-5, "lb = {lb}");
    }

    #[test]
    fn bounded_by_known_spectrum() {
        let d = Array2::from_diag(&array![4.0, 2.5, 0.1]);
        let u = rotation(3, 0, 1, 0.7).dot(&rotation(3, 1, 2, -1.3));
        let a = u.dot(&d).dot(&u.t());

        let lb = norm_lower_bound(a.view());
        assert!(lb <= 4.0 + 1e-4, "lb = {lb}");
        assert!(lb >= 4.0 / 3f32.sqrt() - 1e-4, "lb = {lb}");
    }

    #[test]
    fn bounded_on_random_psd() {
        let mut rng = StdRng::seed_from_u64(7);

        for n in [1, 2, 5, 16] {
            let b = Array2::<f32>::random_using((n + 3, n), StandardNormal, &mut rng);
            let a = b.t().dot(&b);

            let lb = norm_lower_bound(a.view());
            let spectral = spectral_norm(&a);
            let fro = frobenius(&a);
            assert!(lb > 0.0);
            assert!(lb <= spectral * (1.0 + 1e-4), "n = {n}: {lb} > {spectral}");
            assert!(lb >= fro / n as f32 * (1.0 - 1e-5), "n = {n}: {lb} too small");
        }
    }

    #[test]
    fn scales_linearly() {
        let a: Array2<f32> = array![[2.0, 1.0], [1.0, 3.0]];
        let lb = norm_lower_bound(a.view());
        let scaled = norm_lower_bound((&a * 1e6).view());
        assert!((scaled / 1e6 - lb).abs() < 1e-4);
    }
}
