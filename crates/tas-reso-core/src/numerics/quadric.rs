use super::linalg::{
    LinalgError, RealMatrix, column, determinant, lu_factorize, outer, remove_row,
    remove_row_and_column, row, subtract, symmetric_eigenvalues,
};
use crate::common::constants::{QUADRIC_EPS, SIG2FWHM};
use serde::Serialize;
use std::f64::consts::PI;

/// Operations on Gaussian quadrics `x^T Q x + V.x + W`.
pub trait QuadricAlgebraApi {
    /// Integrate coordinate `index` out of the quadratic part.
    fn marginalize(&self, quadric: &RealMatrix, index: usize) -> RealMatrix;
    /// Carry a linear (or mixed) term through the elimination of `index`
    /// performed by [`QuadricAlgebraApi::marginalize`] on `quadric`.
    fn project_linear(&self, linear: &RealMatrix, quadric: &RealMatrix, index: usize)
    -> RealMatrix;
    fn ellipsoid_volume(&self, quadric: &RealMatrix) -> f64;
    fn coherent_fwhms(&self, quadric: &RealMatrix) -> Vec<f64>;
    fn incoherent_fwhms(&self, quadric: &RealMatrix) -> Vec<f64>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuadricAlgebra;

impl QuadricAlgebraApi for QuadricAlgebra {
    fn marginalize(&self, quadric: &RealMatrix, index: usize) -> RealMatrix {
        let pivot = quadric[(index, index)];
        if pivot.abs() < QUADRIC_EPS {
            return remove_row_and_column(quadric, index);
        }

        let norm = pivot.sqrt();
        let direction: Vec<f64> = symmetric_line(quadric, index)
            .into_iter()
            .map(|value| value / norm)
            .collect();
        let projected = subtract(quadric, &outer(&direction, &direction));
        remove_row_and_column(&projected, index)
    }

    fn project_linear(
        &self,
        linear: &RealMatrix,
        quadric: &RealMatrix,
        index: usize,
    ) -> RealMatrix {
        let pivot = quadric[(index, index)];
        if pivot.abs() < QUADRIC_EPS {
            return remove_row(linear, index);
        }

        let direction: Vec<f64> = symmetric_line(quadric, index)
            .into_iter()
            .map(|value| value / pivot)
            .collect();
        let projected = subtract(linear, &outer(&direction, &row(linear, index)));
        remove_row(&projected, index)
    }

    fn ellipsoid_volume(&self, quadric: &RealMatrix) -> f64 {
        let det = determinant(quadric).map_or(f64::NAN, f64::abs);
        4.0 / 3.0 * PI * (1.0 / det).sqrt()
    }

    fn coherent_fwhms(&self, quadric: &RealMatrix) -> Vec<f64> {
        (0..quadric.nrows())
            .map(|index| SIG2FWHM / quadric[(index, index)].sqrt())
            .collect()
    }

    fn incoherent_fwhms(&self, quadric: &RealMatrix) -> Vec<f64> {
        let dimension = quadric.nrows();
        (0..dimension)
            .map(|keep| {
                let reduced = (0..dimension)
                    .rev()
                    .filter(|index| *index != keep)
                    .fold(quadric.clone(), |reduced, index| {
                        self.marginalize(&reduced, index)
                    });
                SIG2FWHM / reduced[(0, 0)].abs().sqrt()
            })
            .collect()
    }
}

fn symmetric_line(quadric: &RealMatrix, index: usize) -> Vec<f64> {
    row(quadric, index)
        .into_iter()
        .zip(column(quadric, index))
        .map(|(lhs, rhs)| 0.5 * (lhs + rhs))
        .collect()
}

/// Rank and eigenvalue signature of a quadric and its homogeneous extension.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QuadricClassification {
    pub rank: usize,
    pub positive: usize,
    pub negative: usize,
    pub zero: usize,
    pub rank_extended: usize,
    pub positive_extended: usize,
    pub negative_extended: usize,
    pub zero_extended: usize,
}

/// Classify `x^T R x + V.x + W` by the eigenvalues of `R` and of the
/// extended matrix `[[R, V/2], [V^T/2, W]]`.
pub fn classify_quadric(
    quadric: &RealMatrix,
    linear: &[f64],
    constant: f64,
    eps: f64,
) -> Result<QuadricClassification, LinalgError> {
    let dimension = quadric.nrows();
    if linear.len() != dimension {
        return Err(LinalgError::RhsLengthMismatch {
            expected: dimension,
            actual: linear.len(),
        });
    }

    let extended = RealMatrix::from_fn(dimension + 1, dimension + 1, |r, c| {
        match (r == dimension, c == dimension) {
            (false, false) => quadric[(r, c)],
            (false, true) => 0.5 * linear[r],
            (true, false) => 0.5 * linear[c],
            (true, true) => constant,
        }
    });

    let (positive, negative, zero) = signature(&symmetric_eigenvalues(quadric)?, eps);
    let (positive_extended, negative_extended, zero_extended) =
        signature(&symmetric_eigenvalues(&extended)?, eps);

    Ok(QuadricClassification {
        rank: positive + negative,
        positive,
        negative,
        zero,
        rank_extended: positive_extended + negative_extended,
        positive_extended,
        negative_extended,
        zero_extended,
    })
}

/// Centre and principal half widths of the ellipsoid `x^T R x + V.x + W`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolutionEllipsoid {
    /// Shift of the centre away from the nominal (Q, E) point, `-R^-1 V / 2`.
    pub offsets: Vec<f64>,
    /// HWHMs along the principal axes, in order of increasing eigenvalue.
    pub principal_hwhms: Vec<f64>,
}

pub fn resolution_ellipsoid(
    quadric: &RealMatrix,
    linear: &[f64],
) -> Result<ResolutionEllipsoid, LinalgError> {
    let half_linear: Vec<f64> = linear.iter().map(|value| -0.5 * value).collect();
    let offsets = lu_factorize(quadric)?.solve(&half_linear)?;
    let principal_hwhms = symmetric_eigenvalues(quadric)?
        .into_iter()
        .map(|eigenvalue| 0.5 * SIG2FWHM / eigenvalue.sqrt())
        .collect();

    Ok(ResolutionEllipsoid {
        offsets,
        principal_hwhms,
    })
}

fn signature(eigenvalues: &[f64], eps: f64) -> (usize, usize, usize) {
    eigenvalues
        .iter()
        .fold((0, 0, 0), |(positive, negative, zero), value| {
            if value.abs() <= eps {
                (positive, negative, zero + 1)
            } else if *value > 0.0 {
                (positive + 1, negative, zero)
            } else {
                (positive, negative + 1, zero)
            }
        })
}
