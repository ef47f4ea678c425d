//! Instrument configuration consumed by the resolution engine.
//!
//! Lengths are in Angstrom and angles in radians; use [`CM2A`] and
//! [`MIN2RAD`] when filling the bundle from centimetres and arc minutes.

use super::constants::{CM2A, MIN2RAD};
use crate::domain::{ComputeResult, ResoError};
use crate::numerics::geometry::energy_transfer;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Formatter};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Relative tolerance (absolute below 1 meV) for a user-supplied E.
const ENERGY_TOLERANCE: f64 = 1.0e-6;

/// User supplied focusing formula returning a curvature radius in cm.
#[derive(Clone)]
pub struct CurvatureFormula(Arc<dyn Fn(&InstrumentParameters) -> f64 + Send + Sync>);

impl CurvatureFormula {
    pub fn new(formula: impl Fn(&InstrumentParameters) -> f64 + Send + Sync + 'static) -> Self {
        Self(Arc::new(formula))
    }

    pub fn evaluate(&self, params: &InstrumentParameters) -> f64 {
        (self.0)(params)
    }
}

impl Debug for CurvatureFormula {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("CurvatureFormula(..)")
    }
}

/// Tabulated reflectivity (or efficiency) factor as a function of wavevector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReflectivityCurve {
    /// `(k, factor)` pairs sorted by `k`.
    pub points: Vec<(f64, f64)>,
}

impl ReflectivityCurve {
    pub fn new(points: Vec<(f64, f64)>) -> Self {
        Self { points }
    }

    /// Linear interpolation, clamped to the first and last tabulated factor.
    pub fn evaluate(&self, k: f64) -> f64 {
        let Some(&(first_k, first_factor)) = self.points.first() else {
            return 1.0;
        };
        if k <= first_k {
            return first_factor;
        }

        for window in self.points.windows(2) {
            let (k0, f0) = window[0];
            let (k1, f1) = window[1];
            if k <= k1 {
                if k1 == k0 {
                    return f1;
                }
                return f0 + (k - k0) / (k1 - k0) * (f1 - f0);
            }
        }

        self.points.last().map_or(1.0, |&(_, factor)| factor)
    }

    fn validate(&self, label: &str) -> ComputeResult<()> {
        if self.points.is_empty() {
            return Err(ResoError::input_validation(
                "INPUT.REFLECTIVITY_CURVE",
                format!("{label} reflectivity curve has no points"),
            ));
        }
        if !self.points.windows(2).all(|window| window[0].0 <= window[1].0) {
            return Err(ResoError::input_validation(
                "INPUT.REFLECTIVITY_CURVE",
                format!("{label} reflectivity curve is not sorted by wavevector"),
            ));
        }
        Ok(())
    }
}

/// Optional intensity factors applied to the mono/ana reflectivities and to
/// the cross section. All disabled yields the factors `(1, 1, 1)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScatterFactorFlags {
    pub ki3: bool,
    pub kf3: bool,
    pub kf_over_ki: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentParameters {
    // scattering target
    pub ki: f64,
    pub kf: f64,
    #[serde(rename = "Q")]
    pub q: f64,
    /// Energy transfer in meV; derived from ki and kf when a bundle omits it.
    #[serde(rename = "E")]
    pub e: f64,

    pub mono_xtal_d: f64,
    pub ana_xtal_d: f64,
    pub mono_sense: f64,
    pub sample_sense: f64,
    pub ana_sense: f64,
    #[serde(rename = "mirror_Qperp")]
    pub mirror_qperp: bool,

    pub dist_hsrc_mono: f64,
    pub dist_vsrc_mono: f64,
    pub dist_mono_sample: f64,
    pub dist_sample_ana: f64,
    pub dist_ana_det: f64,

    pub src_w: f64,
    pub src_h: f64,
    pub mono_w: f64,
    pub mono_h: f64,
    pub ana_w: f64,
    pub ana_h: f64,
    pub det_w: f64,
    pub det_h: f64,

    pub coll_h_pre_mono: f64,
    pub coll_h_pre_sample: f64,
    pub coll_h_post_sample: f64,
    pub coll_h_post_ana: f64,
    pub coll_v_pre_mono: f64,
    pub coll_v_pre_sample: f64,
    pub coll_v_post_sample: f64,
    pub coll_v_post_ana: f64,

    /// Derive the pre-mono divergences from a neutron guide (rad per A).
    pub use_guide: bool,
    pub guide_div_h: f64,
    pub guide_div_v: f64,

    pub mono_mosaic: f64,
    pub mono_mosaic_v: f64,
    pub sample_mosaic: f64,
    pub sample_mosaic_v: f64,
    pub ana_mosaic: f64,
    pub ana_mosaic_v: f64,

    pub mono_curv_h: f64,
    pub mono_curv_v: f64,
    pub ana_curv_h: f64,
    pub ana_curv_v: f64,
    pub mono_is_curved_h: bool,
    pub mono_is_curved_v: bool,
    pub ana_is_curved_h: bool,
    pub ana_is_curved_v: bool,
    pub mono_is_optimally_curved_h: bool,
    pub mono_is_optimally_curved_v: bool,
    pub ana_is_optimally_curved_h: bool,
    pub ana_is_optimally_curved_v: bool,
    #[serde(skip)]
    pub mono_curv_h_formula: Option<CurvatureFormula>,
    #[serde(skip)]
    pub mono_curv_v_formula: Option<CurvatureFormula>,
    #[serde(skip)]
    pub ana_curv_h_formula: Option<CurvatureFormula>,
    #[serde(skip)]
    pub ana_curv_v_formula: Option<CurvatureFormula>,

    pub dmono_refl: f64,
    pub dana_effic: f64,
    pub mono_refl_curve: Option<ReflectivityCurve>,
    pub ana_effic_curve: Option<ReflectivityCurve>,
    pub scatter_factors: ScatterFactorFlags,

    pub pos_x: f64,
    pub pos_y: f64,
    pub pos_z: f64,

    /// Vertical scattering plane on the kf side.
    pub kf_vert: bool,
    #[serde(rename = "calc_R0")]
    pub calc_r0: bool,
    /// Keep the fractional part of the vertical linear coefficients instead
    /// of truncating them toward zero.
    pub exact_vertical_linear: bool,
}

impl Default for InstrumentParameters {
    fn default() -> Self {
        let (ki, kf, q) = (1.4, 1.4, 1.5);
        Self {
            ki,
            kf,
            q,
            e: energy_transfer(ki, kf),

            mono_xtal_d: 3.355,
            ana_xtal_d: 3.355,
            mono_sense: -1.0,
            sample_sense: 1.0,
            ana_sense: -1.0,
            mirror_qperp: false,

            dist_hsrc_mono: 100.0 * CM2A,
            dist_vsrc_mono: 100.0 * CM2A,
            dist_mono_sample: 100.0 * CM2A,
            dist_sample_ana: 100.0 * CM2A,
            dist_ana_det: 100.0 * CM2A,

            src_w: 6.0 * CM2A,
            src_h: 12.0 * CM2A,
            mono_w: 12.0 * CM2A,
            mono_h: 8.0 * CM2A,
            ana_w: 12.0 * CM2A,
            ana_h: 8.0 * CM2A,
            det_w: 2.5 * CM2A,
            det_h: 5.0 * CM2A,

            coll_h_pre_mono: 30.0 * MIN2RAD,
            coll_h_pre_sample: 30.0 * MIN2RAD,
            coll_h_post_sample: 30.0 * MIN2RAD,
            coll_h_post_ana: 30.0 * MIN2RAD,
            coll_v_pre_mono: 120.0 * MIN2RAD,
            coll_v_pre_sample: 120.0 * MIN2RAD,
            coll_v_post_sample: 120.0 * MIN2RAD,
            coll_v_post_ana: 120.0 * MIN2RAD,

            use_guide: false,
            guide_div_h: 6.0 * MIN2RAD,
            guide_div_v: 6.0 * MIN2RAD,

            mono_mosaic: 60.0 * MIN2RAD,
            mono_mosaic_v: 60.0 * MIN2RAD,
            sample_mosaic: 0.0,
            sample_mosaic_v: 0.0,
            ana_mosaic: 60.0 * MIN2RAD,
            ana_mosaic_v: 60.0 * MIN2RAD,

            mono_curv_h: 0.0,
            mono_curv_v: 0.0,
            ana_curv_h: 0.0,
            ana_curv_v: 0.0,
            mono_is_curved_h: false,
            mono_is_curved_v: false,
            ana_is_curved_h: false,
            ana_is_curved_v: false,
            mono_is_optimally_curved_h: false,
            mono_is_optimally_curved_v: false,
            ana_is_optimally_curved_h: false,
            ana_is_optimally_curved_v: false,
            mono_curv_h_formula: None,
            mono_curv_v_formula: None,
            ana_curv_h_formula: None,
            ana_curv_v_formula: None,

            dmono_refl: 1.0,
            dana_effic: 1.0,
            mono_refl_curve: None,
            ana_effic_curve: None,
            scatter_factors: ScatterFactorFlags::default(),

            pos_x: 0.0,
            pos_y: 0.0,
            pos_z: 0.0,

            kf_vert: false,
            calc_r0: true,
            exact_vertical_linear: false,
        }
    }
}

impl InstrumentParameters {
    /// Set the scattering target and derive the matching energy transfer.
    pub fn with_target(mut self, ki: f64, kf: f64, q: f64) -> Self {
        self.ki = ki;
        self.kf = kf;
        self.q = q;
        self.e = energy_transfer(ki, kf);
        self
    }

    pub fn sample_position(&self) -> [f64; 3] {
        [self.pos_x, self.pos_y, self.pos_z]
    }

    /// Construction-time check for contradictory or meaningless settings.
    ///
    /// Physically degenerate but well-formed inputs (open collimators,
    /// infinite mosaics, impossible triangles) are accepted; they surface as
    /// an invalid result instead.
    pub fn validate(&self) -> ComputeResult<()> {
        for (label, sense) in [
            ("mono_sense", self.mono_sense),
            ("sample_sense", self.sample_sense),
            ("ana_sense", self.ana_sense),
        ] {
            if sense != 1.0 && sense != -1.0 {
                return Err(ResoError::input_validation(
                    "INPUT.SCATTERING_SENSE",
                    format!("{label} must be +1 or -1, got {sense}"),
                ));
            }
        }

        for (label, value) in [
            ("ki", self.ki),
            ("kf", self.kf),
            ("Q", self.q),
            ("mono_xtal_d", self.mono_xtal_d),
            ("ana_xtal_d", self.ana_xtal_d),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ResoError::input_validation(
                    "INPUT.SCATTERING_TARGET",
                    format!("{label} must be finite and positive, got {value}"),
                ));
            }
        }

        let expected_e = energy_transfer(self.ki, self.kf);
        if !((self.e - expected_e).abs() <= ENERGY_TOLERANCE * expected_e.abs().max(1.0)) {
            return Err(ResoError::input_validation(
                "INPUT.ENERGY_TRANSFER",
                format!(
                    "E = {} meV contradicts ki and kf, which give {expected_e} meV",
                    self.e
                ),
            ));
        }

        for (label, is_curved, is_optimal, has_formula) in [
            (
                "mono horizontal",
                self.mono_is_curved_h,
                self.mono_is_optimally_curved_h,
                self.mono_curv_h_formula.is_some(),
            ),
            (
                "mono vertical",
                self.mono_is_curved_v,
                self.mono_is_optimally_curved_v,
                self.mono_curv_v_formula.is_some(),
            ),
            (
                "ana horizontal",
                self.ana_is_curved_h,
                self.ana_is_optimally_curved_h,
                self.ana_curv_h_formula.is_some(),
            ),
            (
                "ana vertical",
                self.ana_is_curved_v,
                self.ana_is_optimally_curved_v,
                self.ana_curv_v_formula.is_some(),
            ),
        ] {
            if !is_curved && (is_optimal || has_formula) {
                return Err(ResoError::input_validation(
                    "INPUT.CURVATURE",
                    format!("{label} curvature is requested but focusing is disabled"),
                ));
            }
        }

        if let Some(curve) = &self.mono_refl_curve {
            curve.validate("mono")?;
        }
        if let Some(curve) = &self.ana_effic_curve {
            curve.validate("ana")?;
        }

        Ok(())
    }

    pub fn validated(self) -> ComputeResult<Self> {
        self.validate()?;
        Ok(self)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ParameterError {
    #[error("failed to read instrument parameters '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse instrument parameters '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error(transparent)]
    Invalid(#[from] ResoError),
}

impl From<ParameterError> for ResoError {
    fn from(error: ParameterError) -> Self {
        match error {
            ParameterError::Read { .. } => ResoError::io_system("IO.PARAMETERS", error.to_string()),
            ParameterError::Parse { .. } => {
                ResoError::input_validation("INPUT.PARAMETERS", error.to_string())
            }
            ParameterError::Invalid(error) => error,
        }
    }
}

/// Parse a JSON bundle. A bundle without `E` gets the energy transfer
/// implied by its own ki and kf.
pub fn parse_instrument_parameters(source: &str) -> Result<InstrumentParameters, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(source)?;
    let has_energy = value.get("E").is_some();
    let params: InstrumentParameters = serde_json::from_value(value)?;
    if has_energy {
        Ok(params)
    } else {
        let (ki, kf, q) = (params.ki, params.kf, params.q);
        Ok(params.with_target(ki, kf, q))
    }
}

/// Read a JSON parameter bundle; missing keys fall back to the defaults.
pub fn load_instrument_parameters(
    path: impl AsRef<Path>,
) -> Result<InstrumentParameters, ParameterError> {
    let path = path.as_ref();
    let source = fs::read_to_string(path).map_err(|source| ParameterError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let params = parse_instrument_parameters(&source).map_err(|source| ParameterError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(params.validated()?)
}
