//! Abstract linear operators and the sparse helpers used by conforming and
//! transfer operators.

pub mod sparse;

use nalgebra_sparse::CsrMatrix;

use crate::dof_error::DofSieveError;

pub use sparse::SparseRows;

/// A linear map `R^width -> R^height` that can also apply its transpose.
pub trait LinearOperator {
    fn height(&self) -> usize;
    fn width(&self) -> usize;

    /// `y = A x`. `y` is overwritten.
    fn apply(&self, x: &[f64], y: &mut [f64]) -> Result<(), DofSieveError>;

    /// `y = A^T x`. `y` is overwritten.
    fn apply_transpose(&self, x: &[f64], y: &mut [f64]) -> Result<(), DofSieveError>;

    /// Convenience wrapper allocating the result of [`LinearOperator::apply`].
    fn apply_vec(&self, x: &[f64]) -> Result<Vec<f64>, DofSieveError> {
        let mut y = vec![0.0; self.height()];
        self.apply(x, &mut y)?;
        Ok(y)
    }
}

/// Check the sizes of `x` and `y` against an `height × width` operator.
pub(crate) fn check_sizes(
    height: usize,
    width: usize,
    x: &[f64],
    y: &[f64],
) -> Result<(), DofSieveError> {
    if x.len() != width {
        return Err(DofSieveError::SizeMismatch {
            what: "operator input",
            expected: width,
            found: x.len(),
        });
    }
    if y.len() != height {
        return Err(DofSieveError::SizeMismatch {
            what: "operator output",
            expected: height,
            found: y.len(),
        });
    }
    Ok(())
}

impl LinearOperator for CsrMatrix<f64> {
    fn height(&self) -> usize {
        self.nrows()
    }

    fn width(&self) -> usize {
        self.ncols()
    }

    fn apply(&self, x: &[f64], y: &mut [f64]) -> Result<(), DofSieveError> {
        check_sizes(self.nrows(), self.ncols(), x, y)?;
        for (yi, row) in y.iter_mut().zip(self.row_iter()) {
            *yi = row
                .col_indices()
                .iter()
                .zip(row.values())
                .map(|(&j, v)| v * x[j])
                .sum();
        }
        Ok(())
    }

    fn apply_transpose(&self, x: &[f64], y: &mut [f64]) -> Result<(), DofSieveError> {
        check_sizes(self.ncols(), self.nrows(), x, y)?;
        y.fill(0.0);
        for (xi, row) in x.iter().zip(self.row_iter()) {
            for (&j, v) in row.col_indices().iter().zip(row.values()) {
                y[j] += v * xi;
            }
        }
        Ok(())
    }
}

/// The identity on `R^n`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IdentityOperator(pub usize);

impl LinearOperator for IdentityOperator {
    fn height(&self) -> usize {
        self.0
    }

    fn width(&self) -> usize {
        self.0
    }

    fn apply(&self, x: &[f64], y: &mut [f64]) -> Result<(), DofSieveError> {
        check_sizes(self.0, self.0, x, y)?;
        y.copy_from_slice(x);
        Ok(())
    }

    fn apply_transpose(&self, x: &[f64], y: &mut [f64]) -> Result<(), DofSieveError> {
        self.apply(x, y)
    }
}

/// Composition `A_0 · A_1 · … · A_{n-1}` (the last factor is applied first).
pub struct ProductOperator {
    factors: Vec<Box<dyn LinearOperator>>,
}

impl ProductOperator {
    pub fn new(factors: Vec<Box<dyn LinearOperator>>) -> Result<Self, DofSieveError> {
        if factors.is_empty() {
            return Err(DofSieveError::Unsupported("empty operator product"));
        }
        for w in factors.windows(2) {
            if w[0].width() != w[1].height() {
                return Err(DofSieveError::SizeMismatch {
                    what: "operator product",
                    expected: w[0].width(),
                    found: w[1].height(),
                });
            }
        }
        Ok(Self { factors })
    }

    pub fn num_factors(&self) -> usize {
        self.factors.len()
    }
}

impl LinearOperator for ProductOperator {
    fn height(&self) -> usize {
        self.factors.first().map_or(0, |f| f.height())
    }

    fn width(&self) -> usize {
        self.factors.last().map_or(0, |f| f.width())
    }

    fn apply(&self, x: &[f64], y: &mut [f64]) -> Result<(), DofSieveError> {
        check_sizes(self.height(), self.width(), x, y)?;
        let mut current = x.to_vec();
        for f in self.factors.iter().rev() {
            let mut next = vec![0.0; f.height()];
            f.apply(&current, &mut next)?;
            current = next;
        }
        y.copy_from_slice(&current);
        Ok(())
    }

    fn apply_transpose(&self, x: &[f64], y: &mut [f64]) -> Result<(), DofSieveError> {
        check_sizes(self.width(), self.height(), x, y)?;
        let mut current = x.to_vec();
        for f in &self.factors {
            let mut next = vec![0.0; f.width()];
            f.apply_transpose(&current, &mut next)?;
            current = next;
        }
        y.copy_from_slice(&current);
        Ok(())
    }
}

impl std::fmt::Debug for ProductOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProductOperator")
            .field("height", &self.height())
            .field("width", &self.width())
            .field("factors", &self.factors.len())
            .finish()
    }
}
