use ndarray::{Array2, ArrayView2};

/// The side from which the triangular factor multiplies the unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Solves `Q·X = V`.
    Left,
    /// Solves `X·Q = V`.
    Right,
}

/// Solves a linear system whose coefficient matrix `q` is upper-triangular, without forming its
/// inverse.
///
/// Only the upper-triangular part of `q` is read.
///
/// # Arguments
/// * `q` - A square upper-triangular matrix.
/// * `v` - The right hand side.
/// * `side` - Whether `q` multiplies the unknown from the left or from the right.
///
/// # Returns
/// The solution `X`, or `None` if the shapes disagree or `q` has a zero on its diagonal.
pub fn solve_upper_triangular(
    q: ArrayView2<f32>,
    v: ArrayView2<f32>,
    side: Side,
) -> Option<Array2<f32>> {
    let n = q.nrows();
    if q.ncols() != n || q.diag().iter().any(|&d| d == 0.0) {
        return None;
    }

    match side {
        Side::Left if v.nrows() == n => Some(solve_left(q, v)),
        Side::Right if v.ncols() == n => Some(solve_right(q, v)),
        _ => None,
    }
}

/// Back substitution, bottom row first.
fn solve_left(q: ArrayView2<f32>, v: ArrayView2<f32>) -> Array2<f32> {
    let n = q.nrows();
    let mut x = v.to_owned();

    for i in (0..n).rev() {
        for k in i + 1..n {
            let qik = q[[i, k]];
            if qik == 0.0 {
                continue;
            }

            for c in 0..x.ncols() {
                x[[i, c]] -= qik * x[[k, c]];
            }
        }

        let d = q[[i, i]];
        x.row_mut(i).mapv_inplace(|e| e / d);
    }

    x
}

/// Forward substitution, leftmost column first: `x_j = (v_j - Σ_{i<j} x_i q_ij) / q_jj`.
fn solve_right(q: ArrayView2<f32>, v: ArrayView2<f32>) -> Array2<f32> {
    let n = q.nrows();
    let mut x = v.to_owned();

    for j in 0..n {
        for i in 0..j {
            let qij = q[[i, j]];
            if qij == 0.0 {
                continue;
            }

            for r in 0..x.nrows() {
                x[[r, j]] -= x[[r, i]] * qij;
            }
        }

        let d = q[[j, j]];
        x.column_mut(j).mapv_inplace(|e| e / d);
    }

    x
}

/// Returns the upper-triangular part of `a`, diagonal included.
pub fn triu(a: ArrayView2<f32>) -> Array2<f32> {
    let mut out = a.to_owned();
    out.indexed_iter_mut()
        .filter(|((i, j), _)| i > j)
        .for_each(|(_, e)| *e = 0.0);

    out
}
