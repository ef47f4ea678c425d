//! Intensity normalisation factors for the crystals and the sample.

use crate::common::config::{InstrumentParameters, ScatterFactorFlags};

/// Multiplicative factors for the mono reflectivity, the analyser
/// efficiency and the sample cross section.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScatterFactors {
    pub mono: f64,
    pub ana: f64,
    pub xsec: f64,
}

impl Default for ScatterFactors {
    fn default() -> Self {
        Self {
            mono: 1.0,
            ana: 1.0,
            xsec: 1.0,
        }
    }
}

/// `ki^3 / tan|theta_m|` and `kf^3 / tan|theta_a|` correct for the crystal
/// Bragg volume; `kf/ki` is the flux ratio entering the cross section.
pub fn scatter_factors(
    flags: ScatterFactorFlags,
    theta_m: f64,
    ki: f64,
    theta_a: f64,
    kf: f64,
) -> ScatterFactors {
    let mut factors = ScatterFactors::default();
    if flags.ki3 {
        factors.mono *= ki.powi(3) / theta_m.abs().tan();
    }
    if flags.kf3 {
        factors.ana *= kf.powi(3) / theta_a.abs().tan();
    }
    if flags.kf_over_ki {
        factors.xsec *= kf / ki;
    }
    factors
}

/// Effective mono reflectivity and analyser efficiency, including the
/// optional tabulated curves.
pub fn effective_reflectivities(
    params: &InstrumentParameters,
    factors: ScatterFactors,
) -> (f64, f64) {
    let mut mono = params.dmono_refl * factors.mono;
    let mut ana = params.dana_effic * factors.ana;
    if let Some(curve) = &params.mono_refl_curve {
        mono *= curve.evaluate(params.ki);
    }
    if let Some(curve) = &params.ana_effic_curve {
        ana *= curve.evaluate(params.kf);
    }
    (mono, ana)
}

#[cfg(test)]
mod tests {
    use super::{ScatterFactors, effective_reflectivities, scatter_factors};
    use crate::common::config::{InstrumentParameters, ReflectivityCurve, ScatterFactorFlags};
    use std::f64::consts::FRAC_PI_4;

    #[test]
    fn disabled_flags_give_unit_factors() {
        let factors = scatter_factors(ScatterFactorFlags::default(), -0.7, 1.4, 0.9, 1.2);
        assert_eq!(factors, ScatterFactors::default());
        assert_eq!((factors.mono, factors.ana, factors.xsec), (1.0, 1.0, 1.0));
    }

    #[test]
    fn enabled_flags_apply_wavevector_powers() {
        let flags = ScatterFactorFlags {
            ki3: true,
            kf3: true,
            kf_over_ki: true,
        };
        let factors = scatter_factors(flags, -FRAC_PI_4, 2.0, FRAC_PI_4, 1.5);

        assert!((factors.mono - 8.0).abs() < 1.0e-12);
        assert!((factors.ana - 3.375).abs() < 1.0e-12);
        assert!((factors.xsec - 0.75).abs() < 1.0e-15);
    }

    #[test]
    fn reflectivity_curves_scale_base_values() {
        let params = InstrumentParameters {
            dmono_refl: 0.8,
            dana_effic: 0.5,
            mono_refl_curve: Some(ReflectivityCurve::new(vec![(1.0, 0.5), (2.0, 1.0)])),
            ana_effic_curve: Some(ReflectivityCurve::new(vec![(1.0, 0.2)])),
            ..InstrumentParameters::default()
        };
        let (mono, ana) = effective_reflectivities(&params, ScatterFactors::default());

        // ki = 1.4 interpolates to 0.7
        assert!((mono - 0.8 * 0.7).abs() < 1.0e-15);
        assert!((ana - 0.5 * 0.2).abs() < 1.0e-15);
    }
}
