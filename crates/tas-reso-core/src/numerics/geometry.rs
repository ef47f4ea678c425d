//! Scattering-triangle geometry and crystal optics helpers.
//!
//! The resolution kernels consume these through [`TasGeometryApi`] so that a
//! test double can observe the exact arguments handed to each formula.

use super::linalg::{RealMatrix, identity, matrix_from_rows};
use crate::common::constants::{CM2A, KSQ2E, SIG2FWHM};
use std::f64::consts::PI;

pub trait TasGeometryApi {
    /// Scattering angle 2theta at the sample, unsigned.
    fn scattering_angle(&self, ki: f64, kf: f64, q: f64) -> f64;
    /// Bragg angle of a crystal with lattice spacing `d`, unsigned.
    fn mono_angle(&self, k: f64, d: f64) -> f64;
    /// Angle between ki and Q, unsigned.
    fn angle_ki_q(&self, ki: f64, kf: f64, q: f64) -> f64;
    /// Angle between kf and Q, unsigned.
    fn angle_kf_q(&self, ki: f64, kf: f64, q: f64) -> f64;
    fn wavelength(&self, k: f64) -> f64;
    fn sig2fwhm(&self) -> f64;
    fn ksq2e(&self) -> f64;
    fn cm2a(&self) -> f64;
    fn rotation_matrix_2d(&self, angle: f64) -> RealMatrix;
    fn rotation_matrix_3d_z(&self, angle: f64) -> RealMatrix;
    /// Optimal focusing radius for a crystal between two arms of length
    /// `before` and `after` at scattering angle `two_theta`.
    fn focusing_curvature(&self, before: f64, after: f64, two_theta: f64, vertical: bool) -> f64;
    fn mirror_matrix(&self, size: usize, index: usize) -> RealMatrix;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TasGeometry;

impl TasGeometryApi for TasGeometry {
    fn scattering_angle(&self, ki: f64, kf: f64, q: f64) -> f64 {
        ((ki * ki + kf * kf - q * q) / (2.0 * ki * kf)).acos()
    }

    fn mono_angle(&self, k: f64, d: f64) -> f64 {
        (PI / (d * k)).asin()
    }

    fn angle_ki_q(&self, ki: f64, kf: f64, q: f64) -> f64 {
        ((ki * ki + q * q - kf * kf) / (2.0 * ki * q)).acos()
    }

    fn angle_kf_q(&self, ki: f64, kf: f64, q: f64) -> f64 {
        ((ki * ki - q * q - kf * kf) / (2.0 * kf * q)).acos()
    }

    fn wavelength(&self, k: f64) -> f64 {
        2.0 * PI / k
    }

    fn sig2fwhm(&self) -> f64 {
        SIG2FWHM
    }

    fn ksq2e(&self) -> f64 {
        KSQ2E
    }

    fn cm2a(&self) -> f64 {
        CM2A
    }

    fn rotation_matrix_2d(&self, angle: f64) -> RealMatrix {
        let (s, c) = angle.sin_cos();
        matrix_from_rows(&[[c, -s], [s, c]])
    }

    fn rotation_matrix_3d_z(&self, angle: f64) -> RealMatrix {
        let (s, c) = angle.sin_cos();
        matrix_from_rows(&[[c, -s, 0.0], [s, c, 0.0], [0.0, 0.0, 1.0]])
    }

    fn focusing_curvature(&self, before: f64, after: f64, two_theta: f64, vertical: bool) -> f64 {
        let focal_length = before * after / (before + after);
        let s = (0.5 * two_theta).sin().abs();
        if vertical {
            2.0 * focal_length * s
        } else {
            2.0 * focal_length / s
        }
    }

    fn mirror_matrix(&self, size: usize, index: usize) -> RealMatrix {
        let mut mirror = identity(size);
        mirror[(index, index)] = -1.0;
        mirror
    }
}

/// Energy transfer `E = ksq2E (ki^2 - kf^2)` in meV.
pub fn energy_transfer(ki: f64, kf: f64) -> f64 {
    KSQ2E * (ki * ki - kf * kf)
}

#[cfg(test)]
mod tests {
    use super::{TasGeometry, TasGeometryApi, energy_transfer};
    use std::f64::consts::PI;

    #[test]
    fn elastic_scattering_angle_follows_bragg_law() {
        let geometry = TasGeometry;
        let (k, d) = (1.4, 3.355);
        let theta = geometry.mono_angle(k, d);
        let q = 2.0 * k * theta.sin();

        let two_theta = geometry.scattering_angle(k, k, q);
        assert!((two_theta - 2.0 * theta).abs() < 1.0e-12);
        assert!((theta - (PI / (d * k)).asin()).abs() < 1.0e-15);
    }

    #[test]
    fn triangle_angles_close_the_scattering_triangle() {
        let geometry = TasGeometry;
        let (ki, kf, q) = (1.6, 1.4, 1.9);

        let two_theta = geometry.scattering_angle(ki, kf, q);
        let ki_q = geometry.angle_ki_q(ki, kf, q);
        let kf_q = geometry.angle_kf_q(ki, kf, q);

        // kf makes the exterior angle to Q, so the interior angles sum to pi
        assert!((two_theta + ki_q + (PI - kf_q) - PI).abs() < 1.0e-12);
    }

    #[test]
    fn rotation_matrices_are_orthogonal() {
        let geometry = TasGeometry;
        let rot = geometry.rotation_matrix_3d_z(0.37);
        for i in 0..3 {
            for j in 0..3 {
                let dot: f64 = (0..3).map(|k| rot[(k, i)] * rot[(k, j)]).sum();
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((dot - expected).abs() < 1.0e-15);
            }
        }

        let rot2 = geometry.rotation_matrix_2d(PI / 2.0);
        assert!((rot2[(1, 0)] - 1.0).abs() < 1.0e-15);
        assert!((rot2[(0, 1)] + 1.0).abs() < 1.0e-15);
    }

    #[test]
    fn focusing_curvature_distinguishes_planes() {
        let geometry = TasGeometry;
        let two_theta = PI / 3.0;
        let horizontal = geometry.focusing_curvature(100.0, 100.0, two_theta, false);
        let vertical = geometry.focusing_curvature(100.0, 100.0, two_theta, true);

        assert!((horizontal - 200.0).abs() < 1.0e-10);
        assert!((vertical - 50.0).abs() < 1.0e-10);
    }

    #[test]
    fn mirror_matrix_flips_single_axis() {
        let mirror = TasGeometry.mirror_matrix(4, 1);
        for index in 0..4 {
            let expected = if index == 1 { -1.0 } else { 1.0 };
            assert_eq!(mirror[(index, index)], expected);
        }
    }

    #[test]
    fn energy_transfer_vanishes_for_elastic_scattering() {
        assert_eq!(energy_transfer(1.5, 1.5), 0.0);
        assert!(energy_transfer(2.0, 1.5) > 0.0);
        assert!((TasGeometry.wavelength(2.0 * PI) - 1.0).abs() < 1.0e-15);
    }
}
