use faer::Mat;

pub type RealMatrix = Mat<f64>;

const SINGULAR_PIVOT_EPSILON: f64 = 1.0e-15;
const JACOBI_MAX_SWEEPS: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinalgError {
    #[error("operation requires a square matrix, got {rows}x{cols}")]
    NonSquareMatrix { rows: usize, cols: usize },
    #[error("operation requires a non-empty matrix")]
    EmptyMatrix,
    #[error("matrix is singular at pivot index {pivot_index}")]
    SingularMatrix { pivot_index: usize },
    #[error("right-hand side length mismatch: expected {expected}, got {actual}")]
    RhsLengthMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LuDecomposition {
    lu: RealMatrix,
    pivots: Vec<usize>,
    pivot_sign: f64,
}

impl LuDecomposition {
    pub fn dimension(&self) -> usize {
        self.lu.nrows()
    }

    pub fn determinant(&self) -> f64 {
        (0..self.dimension()).fold(self.pivot_sign, |det, index| {
            det * self.lu[(index, index)]
        })
    }

    pub fn solve(&self, rhs: &[f64]) -> Result<Vec<f64>, LinalgError> {
        let dimension = self.dimension();
        if rhs.len() != dimension {
            return Err(LinalgError::RhsLengthMismatch {
                expected: dimension,
                actual: rhs.len(),
            });
        }

        let mut forward = vec![0.0; dimension];
        for row in 0..dimension {
            let mut value = rhs[self.pivots[row]];
            for col in 0..row {
                value -= self.lu[(row, col)] * forward[col];
            }
            forward[row] = value;
        }

        let mut solution = vec![0.0; dimension];
        for row in (0..dimension).rev() {
            let mut value = forward[row];
            for col in (row + 1)..dimension {
                value -= self.lu[(row, col)] * solution[col];
            }
            solution[row] = value / self.lu[(row, row)];
        }

        Ok(solution)
    }

    pub fn invert(&self) -> Result<RealMatrix, LinalgError> {
        let dimension = self.dimension();
        let mut inverse = RealMatrix::zeros(dimension, dimension);
        let mut basis = vec![0.0; dimension];

        for col in 0..dimension {
            basis.fill(0.0);
            basis[col] = 1.0;

            let solution = self.solve(&basis)?;
            for (row, value) in solution.into_iter().enumerate() {
                inverse[(row, col)] = value;
            }
        }

        Ok(inverse)
    }
}

/// LU factorisation with partial pivoting.
///
/// Only an exactly vanishing (or sub-epsilon) pivot counts as singular; NaN
/// entries pass through so that degenerate inputs propagate downstream.
pub fn lu_factorize(matrix: &RealMatrix) -> Result<LuDecomposition, LinalgError> {
    let dimension = validate_square_shape(matrix)?;
    let mut lu = matrix.clone();
    let mut pivots: Vec<usize> = (0..dimension).collect();
    let mut pivot_sign = 1.0;

    for pivot_col in 0..dimension {
        let (pivot_row, pivot_abs) = select_pivot_row(&lu, pivot_col);
        if pivot_abs <= SINGULAR_PIVOT_EPSILON {
            return Err(LinalgError::SingularMatrix {
                pivot_index: pivot_col,
            });
        }

        if pivot_row != pivot_col {
            swap_rows(&mut lu, pivot_col, pivot_row);
            pivots.swap(pivot_col, pivot_row);
            pivot_sign = -pivot_sign;
        }

        let pivot = lu[(pivot_col, pivot_col)];
        for row in (pivot_col + 1)..dimension {
            lu[(row, pivot_col)] /= pivot;
            let multiplier = lu[(row, pivot_col)];
            for col in (pivot_col + 1)..dimension {
                let updated = lu[(row, col)] - multiplier * lu[(pivot_col, col)];
                lu[(row, col)] = updated;
            }
        }
    }

    Ok(LuDecomposition {
        lu,
        pivots,
        pivot_sign,
    })
}

pub fn lu_invert(matrix: &RealMatrix) -> Result<RealMatrix, LinalgError> {
    lu_factorize(matrix)?.invert()
}

/// Determinant of a square matrix; singular matrices yield zero.
pub fn determinant(matrix: &RealMatrix) -> Result<f64, LinalgError> {
    match lu_factorize(matrix) {
        Ok(decomposition) => Ok(decomposition.determinant()),
        Err(LinalgError::SingularMatrix { .. }) => Ok(0.0),
        Err(error) => Err(error),
    }
}

/// Eigenvalues of a symmetric matrix by cyclic Jacobi rotations, ascending.
pub fn symmetric_eigenvalues(matrix: &RealMatrix) -> Result<Vec<f64>, LinalgError> {
    let dimension = validate_square_shape(matrix)?;
    let mut work = symmetrize(matrix);

    for _ in 0..JACOBI_MAX_SWEEPS {
        let off_diagonal: f64 = (0..dimension)
            .flat_map(|row| ((row + 1)..dimension).map(move |col| (row, col)))
            .map(|(row, col)| work[(row, col)] * work[(row, col)])
            .sum();
        let diagonal: f64 = (0..dimension).map(|index| work[(index, index)].powi(2)).sum();
        if !(off_diagonal > f64::EPSILON * f64::EPSILON * diagonal) {
            break;
        }

        for p in 0..dimension {
            for q in (p + 1)..dimension {
                let apq = work[(p, q)];
                if apq == 0.0 {
                    continue;
                }
                let theta = (work[(q, q)] - work[(p, p)]) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;
                apply_jacobi_rotation(&mut work, p, q, c, s);
            }
        }
    }

    let mut values: Vec<f64> = (0..dimension).map(|index| work[(index, index)]).collect();
    values.sort_by(f64::total_cmp);
    Ok(values)
}

fn apply_jacobi_rotation(work: &mut RealMatrix, p: usize, q: usize, c: f64, s: f64) {
    let dimension = work.nrows();
    for k in 0..dimension {
        let akp = work[(k, p)];
        let akq = work[(k, q)];
        work[(k, p)] = c * akp - s * akq;
        work[(k, q)] = s * akp + c * akq;
    }
    for k in 0..dimension {
        let apk = work[(p, k)];
        let aqk = work[(q, k)];
        work[(p, k)] = c * apk - s * aqk;
        work[(q, k)] = s * apk + c * aqk;
    }
}

pub fn matrix_from_rows<const C: usize>(rows: &[[f64; C]]) -> RealMatrix {
    RealMatrix::from_fn(rows.len(), C, |row, col| rows[row][col])
}

pub fn identity(size: usize) -> RealMatrix {
    RealMatrix::from_fn(size, size, |row, col| if row == col { 1.0 } else { 0.0 })
}

pub fn transpose(matrix: &RealMatrix) -> RealMatrix {
    RealMatrix::from_fn(matrix.ncols(), matrix.nrows(), |row, col| matrix[(col, row)])
}

pub fn multiply(lhs: &RealMatrix, rhs: &RealMatrix) -> RealMatrix {
    debug_assert_eq!(lhs.ncols(), rhs.nrows(), "inner matrix dimensions must match");
    let inner = lhs.ncols();
    RealMatrix::from_fn(lhs.nrows(), rhs.ncols(), |row, col| {
        (0..inner).map(|k| lhs[(row, k)] * rhs[(k, col)]).sum()
    })
}

/// `transform^T * matrix * transform`.
pub fn congruence(transform: &RealMatrix, matrix: &RealMatrix) -> RealMatrix {
    multiply(&multiply(&transpose(transform), matrix), transform)
}

pub fn mat_vec(matrix: &RealMatrix, vector: &[f64]) -> Vec<f64> {
    debug_assert_eq!(matrix.ncols(), vector.len(), "vector length must match columns");
    (0..matrix.nrows())
        .map(|row| {
            vector
                .iter()
                .enumerate()
                .map(|(col, value)| matrix[(row, col)] * value)
                .sum()
        })
        .collect()
}

/// `vector^T * matrix * vector`.
pub fn quadratic_form(matrix: &RealMatrix, vector: &[f64]) -> f64 {
    mat_vec(matrix, vector)
        .iter()
        .zip(vector)
        .map(|(lhs, rhs)| lhs * rhs)
        .sum()
}

pub fn outer(lhs: &[f64], rhs: &[f64]) -> RealMatrix {
    RealMatrix::from_fn(lhs.len(), rhs.len(), |row, col| lhs[row] * rhs[col])
}

pub fn scaled(matrix: &RealMatrix, factor: f64) -> RealMatrix {
    RealMatrix::from_fn(matrix.nrows(), matrix.ncols(), |row, col| {
        matrix[(row, col)] * factor
    })
}

pub fn add(lhs: &RealMatrix, rhs: &RealMatrix) -> RealMatrix {
    debug_assert_eq!((lhs.nrows(), lhs.ncols()), (rhs.nrows(), rhs.ncols()));
    RealMatrix::from_fn(lhs.nrows(), lhs.ncols(), |row, col| {
        lhs[(row, col)] + rhs[(row, col)]
    })
}

pub fn subtract(lhs: &RealMatrix, rhs: &RealMatrix) -> RealMatrix {
    debug_assert_eq!((lhs.nrows(), lhs.ncols()), (rhs.nrows(), rhs.ncols()));
    RealMatrix::from_fn(lhs.nrows(), lhs.ncols(), |row, col| {
        lhs[(row, col)] - rhs[(row, col)]
    })
}

pub fn row(matrix: &RealMatrix, index: usize) -> Vec<f64> {
    (0..matrix.ncols()).map(|col| matrix[(index, col)]).collect()
}

pub fn column(matrix: &RealMatrix, index: usize) -> Vec<f64> {
    (0..matrix.nrows()).map(|row| matrix[(row, index)]).collect()
}

pub fn remove_row(matrix: &RealMatrix, index: usize) -> RealMatrix {
    RealMatrix::from_fn(matrix.nrows() - 1, matrix.ncols(), |row, col| {
        matrix[(skip_index(row, index), col)]
    })
}

pub fn remove_row_and_column(matrix: &RealMatrix, index: usize) -> RealMatrix {
    RealMatrix::from_fn(matrix.nrows() - 1, matrix.ncols() - 1, |row, col| {
        matrix[(skip_index(row, index), skip_index(col, index))]
    })
}

/// Copy `block` into `target` with its top-left corner at `(row, col)`.
pub fn set_block(target: &mut RealMatrix, row: usize, col: usize, block: &RealMatrix) {
    for r in 0..block.nrows() {
        for c in 0..block.ncols() {
            target[(row + r, col + c)] = block[(r, c)];
        }
    }
}

pub fn symmetrize(matrix: &RealMatrix) -> RealMatrix {
    RealMatrix::from_fn(matrix.nrows(), matrix.ncols(), |row, col| {
        0.5 * (matrix[(row, col)] + matrix[(col, row)])
    })
}

pub fn all_finite(matrix: &RealMatrix) -> bool {
    (0..matrix.nrows()).all(|row| (0..matrix.ncols()).all(|col| matrix[(row, col)].is_finite()))
}

pub fn to_rows(matrix: &RealMatrix) -> Vec<Vec<f64>> {
    (0..matrix.nrows()).map(|index| row(matrix, index)).collect()
}

const fn skip_index(position: usize, removed: usize) -> usize {
    if position < removed { position } else { position + 1 }
}

fn validate_square_shape(matrix: &RealMatrix) -> Result<usize, LinalgError> {
    let rows = matrix.nrows();
    let cols = matrix.ncols();
    if rows == 0 || cols == 0 {
        return Err(LinalgError::EmptyMatrix);
    }
    if rows != cols {
        return Err(LinalgError::NonSquareMatrix { rows, cols });
    }

    Ok(rows)
}

fn select_pivot_row(matrix: &RealMatrix, pivot_col: usize) -> (usize, f64) {
    let mut best_row = pivot_col;
    let mut best_abs = matrix[(pivot_col, pivot_col)].abs();

    for row in (pivot_col + 1)..matrix.nrows() {
        let candidate = matrix[(row, pivot_col)].abs();
        if candidate > best_abs {
            best_abs = candidate;
            best_row = row;
        }
    }

    (best_row, best_abs)
}

fn swap_rows(matrix: &mut RealMatrix, lhs: usize, rhs: usize) {
    for col in 0..matrix.ncols() {
        let value = matrix[(lhs, col)];
        matrix[(lhs, col)] = matrix[(rhs, col)];
        matrix[(rhs, col)] = value;
    }
}

#[cfg(test)]
mod tests {
    use super::{
        congruence, determinant, identity, lu_factorize, lu_invert, matrix_from_rows, multiply,
        remove_row, remove_row_and_column, symmetric_eigenvalues, transpose, LinalgError,
        RealMatrix,
    };

    #[test]
    fn lu_invert_recovers_identity_when_recomposed() {
        let matrix = matrix_from_rows(&[
            [1.5, -2.0, 0.5],
            [0.75, 3.0, -1.0],
            [2.0, 1.25, 2.5],
        ]);

        let inverse = lu_invert(&matrix).expect("inverse");
        let product = multiply(&matrix, &inverse);

        assert_matrix_close(&identity(3), &product, 1.0e-12);
    }

    #[test]
    fn lu_factorize_rejects_singular_matrices() {
        let matrix = matrix_from_rows(&[[1.0, 2.0], [2.0, 4.0]]);
        let error = lu_factorize(&matrix).expect_err("singular matrix should fail");
        assert_eq!(error, LinalgError::SingularMatrix { pivot_index: 1 });
    }

    #[test]
    fn lu_factorize_lets_nan_entries_propagate() {
        let matrix = matrix_from_rows(&[[f64::NAN, 1.0], [1.0, 2.0]]);
        let inverse = lu_invert(&matrix).expect("NaN pivots are not classified as singular");
        assert!(inverse[(0, 0)].is_nan() || inverse[(1, 1)].is_nan());
    }

    #[test]
    fn lu_factorize_rejects_non_square_matrices() {
        let matrix = RealMatrix::zeros(2, 3);
        let error = lu_factorize(&matrix).expect_err("non-square matrix should fail");
        assert_eq!(error, LinalgError::NonSquareMatrix { rows: 2, cols: 3 });
    }

    #[test]
    fn determinant_tracks_pivot_sign_and_singularity() {
        let swapped = matrix_from_rows(&[[0.0, 2.0], [3.0, 0.0]]);
        assert!((determinant(&swapped).expect("det") + 6.0).abs() < 1.0e-14);

        let singular = matrix_from_rows(&[[1.0, 1.0], [1.0, 1.0]]);
        assert_eq!(determinant(&singular).expect("det"), 0.0);
    }

    #[test]
    fn jacobi_eigenvalues_match_known_spectrum() {
        let matrix = matrix_from_rows(&[[2.0, 1.0, 0.0], [1.0, 2.0, 0.0], [0.0, 0.0, -4.0]]);
        let values = symmetric_eigenvalues(&matrix).expect("eigenvalues");

        let expected = [-4.0, 1.0, 3.0];
        for (value, expected) in values.iter().zip(expected) {
            assert!((value - expected).abs() < 1.0e-12, "{value} != {expected}");
        }
    }

    #[test]
    fn row_and_column_removal_keeps_remaining_order() {
        let matrix = matrix_from_rows(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]]);

        let reduced = remove_row_and_column(&matrix, 1);
        assert_matrix_close(&matrix_from_rows(&[[1.0, 3.0], [7.0, 9.0]]), &reduced, 0.0);

        let rows_only = remove_row(&matrix, 0);
        assert_matrix_close(
            &matrix_from_rows(&[[4.0, 5.0, 6.0], [7.0, 8.0, 9.0]]),
            &rows_only,
            0.0,
        );
    }

    #[test]
    fn congruence_with_identity_is_a_no_op() {
        let matrix = matrix_from_rows(&[[2.0, -1.0], [-1.0, 3.0]]);
        assert_matrix_close(&matrix, &congruence(&identity(2), &matrix), 0.0);
        assert_matrix_close(&matrix, &transpose(&matrix), 0.0);
    }

    fn assert_matrix_close(expected: &RealMatrix, actual: &RealMatrix, abs_tol: f64) {
        assert_eq!(expected.nrows(), actual.nrows(), "row count mismatch");
        assert_eq!(expected.ncols(), actual.ncols(), "column count mismatch");
        for row in 0..expected.nrows() {
            for col in 0..expected.ncols() {
                let diff = (expected[(row, col)] - actual[(row, col)]).abs();
                assert!(
                    diff <= abs_tol,
                    "entry ({row},{col}) expected={:.15e} actual={:.15e}",
                    expected[(row, col)],
                    actual[(row, col)]
                );
            }
        }
    }
}
