//! Dense linear algebra helpers.
//!
//! Construction-time algebra runs on heap-allocated `DMatrix` values and is
//! copied into const-sized `SMatrix` coefficients for the per-sample paths,
//! where LU solves stay on the stack.

use nalgebra::{DMatrix, SMatrix};

use crate::error::{Result, SimError};

/// Invert a square matrix, naming the failing system in the error.
pub fn invert(m: &DMatrix<f64>, context: &str) -> Result<DMatrix<f64>> {
    if !m.is_square() {
        return Err(SimError::dimension(
            format!("{context} (square)"),
            m.nrows(),
            m.ncols(),
        ));
    }
    if m.is_empty() {
        return Ok(m.clone());
    }

    let inverse = m
        .clone()
        .try_inverse()
        .ok_or_else(|| SimError::singular(context))?;

    if inverse.iter().all(|v| v.is_finite()) {
        Ok(inverse)
    } else {
        Err(SimError::singular(context))
    }
}

/// Copy a dynamically sized matrix into a const-sized one.
pub fn to_static<const R: usize, const C: usize>(
    m: &DMatrix<f64>,
    what: &str,
) -> Result<SMatrix<f64, R, C>> {
    if m.nrows() != R {
        return Err(SimError::dimension(format!("{what} rows"), R, m.nrows()));
    }
    if m.ncols() != C {
        return Err(SimError::dimension(format!("{what} columns"), C, m.ncols()));
    }
    Ok(SMatrix::<f64, R, C>::from_fn(|i, j| m[(i, j)]))
}

/// Build a `rows x cols` matrix from row slices, zero-padding short rows.
pub fn from_rows(rows: &[&[f64]], cols: usize) -> DMatrix<f64> {
    DMatrix::from_fn(rows.len(), cols, |i, j| rows[i].get(j).copied().unwrap_or(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_inverse_needs_pivoting() {
        let m = DMatrix::from_row_slice(3, 3, &[0.0, 1.0, 2.0, 1.0, 0.0, 1.0, 4.0, 1.0, 0.0]);
        let inverse = invert(&m, "test").unwrap();
        assert_relative_eq!(m * inverse, DMatrix::identity(3, 3), epsilon = 1e-12);
    }

    #[test]
    fn test_singular_is_reported() {
        let d = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]);
        assert!(matches!(
            invert(&d, "test"),
            Err(SimError::SingularMatrix { .. })
        ));
        assert!(invert(&DMatrix::zeros(2, 3), "test").is_err());
    }

    #[test]
    fn test_to_static_checks_shape() {
        let d = from_rows(&[&[1.0, 2.0], &[3.0]], 2);
        let s = to_static::<2, 2>(&d, "m").unwrap();
        assert_eq!(s[(1, 1)], 0.0);
        assert!(to_static::<3, 2>(&d, "m").is_err());
    }
}
