#![allow(clippy::needless_range_loop)]

use std::error::Error;
use std::fmt;

/// Pivot magnitude below which a matrix is treated as singular.
pub const DEFAULT_TOLERANCE: f64 = 1e-12;

/// LU decomposition with partial pivoting of a square `N x N` matrix.
///
/// The returned matrix holds both factors as `A = (L - E) + U` such that
/// `P * A = L * U`. The permutation is stored as row indices in the first
/// `N` entries of the returned vector.
pub fn decompose<const N: usize>(
    a: &[[f64; N]; N],
    tol: f64,
) -> Result<([[f64; N]; N], [usize; N]), DegenerateMatrixError> {
    let mut a = *a;
    let mut p = [0usize; N];
    for (i, v) in p.iter_mut().enumerate() {
        *v = i;
    }

    for i in 0..N {
        let mut max_a = 0.0;
        let mut i_max = i;

        for k in i..N {
            let abs_a = a[k][i].abs();

            if abs_a > max_a {
                max_a = abs_a;
                i_max = k;
            }
        }

        // NaN entries never replace max_a, so a NaN column lands here too
        if max_a < tol {
            return Err(DegenerateMatrixError { column: i });
        }

        if i_max != i {
            p.swap(i, i_max);
            a.swap(i, i_max);
        }

        for j in (i + 1)..N {
            a[j][i] /= a[i][i];

            for k in (i + 1)..N {
                a[j][k] -= a[j][i] * a[i][k];
            }
        }
    }

    Ok((a, p))
}

/// Solves `a * x = b` given the output of [decompose].
pub fn solve<const N: usize>(a: &[[f64; N]; N], p: &[usize; N], b: &[f64; N]) -> [f64; N] {
    let mut x = [0.0; N];

    for i in 0..N {
        x[i] = b[p[i]];

        for k in 0..i {
            x[i] -= a[i][k] * x[k];
        }
    }

    for i in (0..N).rev() {
        for k in (i + 1)..N {
            x[i] -= a[i][k] * x[k];
        }

        x[i] /= a[i][i];
    }

    x
}

/// Decomposes and solves in one step.
pub fn solve_system<const N: usize>(
    a: &[[f64; N]; N],
    b: &[f64; N],
) -> Result<[f64; N], DegenerateMatrixError> {
    let (lu, p) = decompose(a, DEFAULT_TOLERANCE)?;
    Ok(solve(&lu, &p, b))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DegenerateMatrixError {
    pub column: usize,
}

impl fmt::Display for DegenerateMatrixError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Decomposition failed, matrix is degenerate (pivot column {}).",
            self.column
        )
    }
}

impl Error for DegenerateMatrixError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solve_3x3() {
        let a = [[2.0, 1.0, -1.0], [-3.0, -1.0, 2.0], [-2.0, 1.0, 2.0]];
        let b = [8.0, -11.0, -3.0];

        let x = solve_system(&a, &b).unwrap();

        assert!((x[0] - 2.0).abs() < 1e-12);
        assert!((x[1] - 3.0).abs() < 1e-12);
        assert!((x[2] + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_solve_requires_pivoting() {
        let a = [[0.0, 1.0], [1.0, 0.0]];
        let x = solve_system(&a, &[3.0, 4.0]).unwrap();

        assert!((x[0] - 4.0).abs() < 1e-12);
        assert!((x[1] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_singular_matrix_is_rejected() {
        let a = [[1.0, 2.0, 3.0], [2.0, 4.0, 6.0], [0.0, 1.0, 1.0]];
        assert!(solve_system(&a, &[1.0, 2.0, 3.0]).is_err());
    }

    #[test]
    fn test_nan_matrix_is_rejected() {
        let a = [[f64::NAN, 0.0], [0.0, 1.0]];
        assert!(solve_system(&a, &[1.0, 1.0]).is_err());
    }
}
