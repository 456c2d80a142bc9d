use ndarray::{Array3, ArrayD, ArrayView3, ArrayViewD};

use crate::{PsgdErr, Result};

/// How a parameter's gradient is seen as a (possibly batched) matrix.
///
/// The trailing two dimensions `(m, n)` form the matrix, every leading dimension is folded into a
/// single batch dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixShape {
    dims: Vec<usize>,
    batch: usize,
    rows: usize,
    cols: usize,
}

impl MatrixShape {
    /// Creates a new `MatrixShape`.
    ///
    /// # Arguments
    /// * `name` - The name of the parameter, used for error reporting.
    /// * `dims` - The full shape of the gradient.
    ///
    /// # Returns
    /// The matrix view of the shape or an error if it has less than two dimensions.
    pub fn of(name: &str, dims: &[usize]) -> Result<Self> {
        let [lead @ .., rows, cols] = dims else {
            return Err(PsgdErr::RankTooLow {
                name: name.to_string(),
                rank: dims.len(),
            });
        };

        Ok(Self {
            dims: dims.to_vec(),
            batch: lead.iter().product(),
            rows: *rows,
            cols: *cols,
        })
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn batch(&self) -> usize {
        self.batch
    }

    /// The trailing `(m, n)` pair, before any transposition.
    pub fn matrix(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Whether the matrix is wide and gets transposed during normalization.
    pub fn is_transposed(&self) -> bool {
        self.rows < self.cols
    }

    /// The side of the whitening factor, `min(m, n)`.
    pub fn side(&self) -> usize {
        self.rows.min(self.cols)
    }

    /// Compensation for preconditioning a single axis of a non-square matrix, `sqrt(max(1, m/n))`.
    pub fn rescale(&self) -> f32 {
        (self.rows as f32 / self.cols as f32).max(1.0).sqrt()
    }

    /// Reshapes `g` to `(batch, max(m, n), min(m, n))`, transposing the trailing axes when the
    /// matrix is wide.
    ///
    /// # Returns
    /// A standard layout batch of tall matrices or an error if `g` doesn't have this shape.
    pub fn normalize(&self, g: ArrayViewD<f32>) -> Result<Array3<f32>> {
        let g = g.to_shape((self.batch, self.rows, self.cols))?.into_owned();

        if !self.is_transposed() {
            return Ok(g);
        }

        Ok(g.permuted_axes([0, 2, 1]).as_standard_layout().into_owned())
    }

    /// Inverse of [`MatrixShape::normalize`].
    pub fn denormalize(&self, g: ArrayView3<f32>) -> Result<ArrayD<f32>> {
        let g = if self.is_transposed() {
            g.permuted_axes([0, 2, 1])
        } else {
            g
        };

        Ok(g.to_shape(self.dims.clone())?.into_owned())
    }
}
