//! Unit and physics constants shared by the resolution kernels.
//!
//! Lengths are carried in Angstrom and angles in radians throughout the
//! crate; the conversion factors below are the only place unit literals live.

use std::f64::consts::PI;

/// Gaussian sigma to full width at half maximum, `2 sqrt(2 ln 2)`.
pub const SIG2FWHM: f64 = 2.354_820_045_030_949_3;
/// `hbar^2 / (2 m_n)` in meV A^2: `E = KSQ2E * k^2`.
pub const KSQ2E: f64 = 2.072_124_836_832;
pub const E2KSQ: f64 = 1.0 / KSQ2E;
pub const CM2A: f64 = 1.0e8;
pub const RAD2DEG: f64 = 180.0 / PI;
pub const DEG2RAD: f64 = PI / 180.0;
pub const MIN2RAD: f64 = DEG2RAD / 60.0;
/// Threshold below which a quadric diagonal entry is treated as absent.
pub const QUADRIC_EPS: f64 = 1.0e-8;
