//! Eckold-Sobolev resolution of a triple-axis spectrometer.
//!
//! The monochromator and analyser blocks are rotated into the (ki, kf)
//! frames, transformed to (Q, E) coordinates, and the two crystal
//! path-length coordinates are integrated out. Sample mosaic and the
//! optional Q-perpendicular mirror are applied to the reduced 4x4 quadric.

use super::element::{OpticalElementBlocks, OpticalElementBuilder, OpticalElementInput};
use super::scatter::{effective_reflectivities, scatter_factors};
use crate::common::config::{CurvatureFormula, InstrumentParameters};
use crate::common::constants::{QUADRIC_EPS, RAD2DEG};
use crate::domain::{ComputeResult, OpticalElement, ResoError};
use crate::numerics::geometry::{TasGeometry, TasGeometryApi};
use crate::numerics::linalg::{
    RealMatrix, add, all_finite, column, congruence, identity, lu_invert, mat_vec,
    matrix_from_rows, multiply, quadratic_form, scaled, set_block, to_rows, transpose,
};
use crate::numerics::quadric::{
    QuadricAlgebra, QuadricAlgebraApi, QuadricClassification, ResolutionEllipsoid,
    classify_quadric, resolution_ellipsoid,
};
use serde::{Serialize, Serializer};
use std::f64::consts::PI;
use tracing::{debug, trace, warn};

/// Outcome of one resolution evaluation.
///
/// Axes of `reso`, `reso_v` and the FWHM lists are (Q_para, Q_perp, Q_z, E).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolutionResult {
    #[serde(rename = "Q_avg")]
    pub q_avg: [f64; 4],
    pub ki: f64,
    pub kf: f64,
    #[serde(rename = "Q_ki")]
    pub q_ki: f64,
    #[serde(rename = "Q_kf")]
    pub q_kf: f64,
    #[serde(rename = "twotheta")]
    pub two_theta: f64,
    pub theta_m: f64,
    pub theta_a: f64,
    /// Focusing radii actually used, (mono_h, mono_v, ana_h, ana_v) in A.
    pub curvatures: [f64; 4],
    /// Sample position projected onto the analyser arm, (y, z).
    pub analyzer_sample_position: [f64; 2],
    #[serde(serialize_with = "serialize_matrix")]
    pub reso: RealMatrix,
    pub reso_v: Vec<f64>,
    pub reso_s: f64,
    pub r0: f64,
    pub res_vol: f64,
    pub coherent_fwhms: Vec<f64>,
    pub incoherent_fwhms: Vec<f64>,
    pub mono_reflectivity: f64,
    pub ana_reflectivity: f64,
    pub classification: Option<QuadricClassification>,
    /// Centre offsets and principal HWHMs; absent when `reso` is singular.
    pub ellipsoid: Option<ResolutionEllipsoid>,
    pub ok: bool,
}

fn serialize_matrix<S: Serializer>(matrix: &RealMatrix, serializer: S) -> Result<S::Ok, S::Error> {
    to_rows(matrix).serialize(serializer)
}

pub struct ResolutionEngine<G = TasGeometry, Q = QuadricAlgebra> {
    geometry: G,
    quadric: Q,
}

impl Default for ResolutionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ResolutionEngine {
    pub fn new() -> Self {
        Self::with_collaborators(TasGeometry, QuadricAlgebra)
    }
}

impl<G: TasGeometryApi, Q: QuadricAlgebraApi> ResolutionEngine<G, Q> {
    pub fn with_collaborators(geometry: G, quadric: Q) -> Self {
        Self { geometry, quadric }
    }

    pub fn geometry(&self) -> &G {
        &self.geometry
    }

    pub fn quadric(&self) -> &Q {
        &self.quadric
    }

    /// Evaluate the resolution quadric for one instrument configuration.
    ///
    /// Non-physical configurations are reported through
    /// [`ResolutionResult::ok`]; the only error is a singular kinematic
    /// transform.
    pub fn calc(&self, params: &InstrumentParameters) -> ComputeResult<ResolutionResult> {
        let geometry = &self.geometry;
        let (ki, kf, q, e) = (params.ki, params.kf, params.q, params.e);
        let pos = params.sample_position();
        let s2 = geometry.sig2fwhm().powi(2);

        // angles
        let two_theta = geometry.scattering_angle(ki, kf, q) * params.sample_sense;
        let theta_m = geometry.mono_angle(ki, params.mono_xtal_d) * params.mono_sense;
        let theta_a = geometry.mono_angle(kf, params.ana_xtal_d) * params.ana_sense;
        let q_ki = geometry.angle_ki_q(ki, kf, q) * params.sample_sense;
        let q_kf = geometry.angle_kf_q(ki, kf, q) * params.sample_sense;

        debug!(
            two_theta_deg = two_theta * RAD2DEG,
            theta_m_deg = theta_m * RAD2DEG,
            theta_a_deg = theta_a * RAD2DEG,
            q_ki_deg = q_ki * RAD2DEG,
            q_kf_deg = q_kf * RAD2DEG,
            "scattering angles"
        );

        // focusing
        let mono_two_theta = (2.0 * theta_m).abs();
        let ana_two_theta = (2.0 * theta_a).abs();
        let mono_curv_h = self.curvature(
            params,
            params.mono_curv_h,
            params.mono_curv_h_formula.as_ref(),
            params
                .mono_is_optimally_curved_h
                .then_some((params.dist_hsrc_mono, params.dist_mono_sample, mono_two_theta, false)),
        );
        let mono_curv_v = self.curvature(
            params,
            params.mono_curv_v,
            params.mono_curv_v_formula.as_ref(),
            params
                .mono_is_optimally_curved_v
                .then_some((params.dist_vsrc_mono, params.dist_mono_sample, mono_two_theta, true)),
        );
        let ana_curv_h = self.curvature(
            params,
            params.ana_curv_h,
            params.ana_curv_h_formula.as_ref(),
            params
                .ana_is_optimally_curved_h
                .then_some((params.dist_sample_ana, params.dist_ana_det, ana_two_theta, false)),
        );
        let ana_curv_v = self.curvature(
            params,
            params.ana_curv_v,
            params.ana_curv_v_formula.as_ref(),
            params
                .ana_is_optimally_curved_v
                .then_some((params.dist_sample_ana, params.dist_ana_det, ana_two_theta, true)),
        );

        let cm2a = geometry.cm2a();
        debug!(
            mono_v_cm = mono_curv_v / cm2a,
            mono_h_cm = mono_curv_h / cm2a,
            ana_v_cm = ana_curv_v / cm2a,
            ana_h_cm = ana_curv_h / cm2a,
            "focusing radii"
        );

        let inverse = |is_curved: bool, radius: f64| if is_curved { 1.0 / radius } else { 0.0 };
        let inv_mono_curv_h = inverse(params.mono_is_curved_h, mono_curv_h);
        let inv_mono_curv_v = inverse(params.mono_is_curved_v, mono_curv_v);
        let inv_ana_curv_h = inverse(params.ana_is_curved_h, ana_curv_h);
        let inv_ana_curv_v = inverse(params.ana_is_curved_v, ana_curv_v);

        let (coll_h_pre_mono, coll_v_pre_mono) = if params.use_guide {
            let lambda = geometry.wavelength(ki);
            (lambda * params.guide_div_h, lambda * params.guide_div_v)
        } else {
            (params.coll_h_pre_mono, params.coll_v_pre_mono)
        };

        let factors = scatter_factors(params.scatter_factors, theta_m, ki, theta_a, kf);
        let (mono_refl, ana_effic) = effective_reflectivities(params, factors);

        let builder = OpticalElementBuilder::new(geometry);
        let truncate_vertical_linear = !params.exact_vertical_linear;

        let mono = builder.build(&OpticalElementInput {
            element: OpticalElement::Monochromator,
            src_w: params.src_w,
            src_h: params.src_h,
            crystal_w: params.mono_w,
            crystal_h: params.mono_h,
            dist_vsrc: params.dist_vsrc_mono,
            dist_hsrc: params.dist_hsrc_mono,
            dist_sample: params.dist_mono_sample,
            k: ki,
            theta: theta_m,
            coll_h_src: coll_h_pre_mono,
            coll_h_sample: params.coll_h_pre_sample,
            coll_v_src: coll_v_pre_mono,
            coll_v_sample: params.coll_v_pre_sample,
            mosaic: params.mono_mosaic,
            mosaic_v: params.mono_mosaic_v,
            inv_curv_h: inv_mono_curv_h,
            inv_curv_v: inv_mono_curv_v,
            reflectivity: mono_refl,
            truncate_vertical_linear,
        });

        // sample position seen from the analyser arm
        let rotated = mat_vec(&geometry.rotation_matrix_2d(-two_theta), &pos[..2]);
        let mut pos_y2 = rotated[1];
        let mut pos_z2 = pos[2];
        if params.kf_vert {
            pos_z2 = -pos_y2;
            pos_y2 = pos[2];
        }

        let OpticalElementBlocks {
            quadratic: mut ana_quadratic,
            linear: mut ana_linear,
            constant: ana_constant,
            reflectivity: ana_reflectivity,
            ..
        } = builder.build(&OpticalElementInput {
            element: OpticalElement::Analyser,
            src_w: params.det_w,
            src_h: params.det_h,
            crystal_w: params.ana_w,
            crystal_h: params.ana_h,
            dist_vsrc: params.dist_ana_det,
            dist_hsrc: params.dist_ana_det,
            dist_sample: params.dist_sample_ana,
            k: kf,
            theta: -theta_a,
            coll_h_src: params.coll_h_post_ana,
            coll_h_sample: params.coll_h_post_sample,
            coll_v_src: params.coll_v_post_ana,
            coll_v_sample: params.coll_v_post_sample,
            mosaic: params.ana_mosaic,
            mosaic_v: params.ana_mosaic_v,
            inv_curv_h: inv_ana_curv_h,
            inv_curv_v: inv_ana_curv_v,
            reflectivity: ana_effic,
            truncate_vertical_linear,
        });

        if params.kf_vert {
            let t_vert = matrix_from_rows(&[[1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, -1.0, 0.0]]);
            ana_quadratic = congruence(&t_vert, &ana_quadratic);
            ana_linear = multiply(&t_vert, &ana_linear);
        }

        // kinematic transform between the crystal frames and (Q, E)
        let t = self.kinematic_transform(ki, kf, q, params.sample_sense);
        let t_inv = lu_invert(&t).map_err(|error| {
            ResoError::computation(
                "RUN.KINEMATIC_TRANSFORM",
                format!("kinematic transform is not invertible: {error}"),
            )
        })?;

        let d_ki = geometry.rotation_matrix_3d_z(-q_ki);
        let d_kf = geometry.rotation_matrix_3d_z(-q_kf);
        let a_rot = congruence(&d_ki, &mono.quadratic);
        let e_rot = congruence(&d_kf, &ana_quadratic);

        let mut quadratic_ae = RealMatrix::zeros(6, 6);
        set_block(&mut quadratic_ae, 0, 0, &a_rot);
        set_block(&mut quadratic_ae, 3, 3, &e_rot);
        let u1 = congruence(&t_inv, &quadratic_ae);

        let mut linear_bf = RealMatrix::zeros(6, 3);
        set_block(&mut linear_bf, 0, 0, &multiply(&transpose(&d_ki), &mono.linear));
        set_block(&mut linear_bf, 3, 0, &multiply(&transpose(&d_kf), &ana_linear));
        let linear_v = multiply(&t_inv, &linear_bf);

        // integrate out the two crystal path coordinates
        let u2 = self.quadric.marginalize(&u1, 5);
        let mut u = scaled(&self.quadric.marginalize(&u2, 4), 2.0);
        trace!(u1 = u1.nrows(), u2 = u2.nrows(), u = u.nrows(), "marginalized quadric");

        let constant_k = add(&mono.constant, &ana_constant);
        let reso_s = quadratic_form(&constant_k, &pos);

        let mut r0 = 0.0;
        if params.calc_r0 {
            let pivots = (u1[(5, 5)] * u2[(4, 4)]).abs();
            r0 = mono.reflectivity * ana_reflectivity * PI * (1.0 / pivots).sqrt();
        }

        let linear_v2 = self.quadric.project_linear(&linear_v, &u1, 5);
        let linear_p = self.quadric.project_linear(&linear_v2, &u2, 4);
        let mut reso_v = mat_vec(&linear_p, &pos);

        u = add_sample_mosaic(&u, params.sample_mosaic * q, 1, s2);
        u = add_sample_mosaic(&u, params.sample_mosaic_v * q, 2, s2);

        let mut reso = u;
        if params.mirror_qperp && params.sample_sense < 0.0 {
            let mirror = geometry.mirror_matrix(reso.nrows(), 1);
            reso = congruence(&mirror, &reso);
            reso_v[1] = -reso_v[1];
        }

        let res_vol = self.quadric.ellipsoid_volume(&reso);
        if params.calc_r0 {
            r0 *= res_vol * PI * 3.0;
            r0 *= (-reso_s).exp();
            r0 *= factors.xsec;
        }

        let coherent_fwhms = self.quadric.coherent_fwhms(&reso);
        let incoherent_fwhms = self.quadric.incoherent_fwhms(&reso);
        let classification = classify_quadric(&reso, &reso_v, reso_s, QUADRIC_EPS).ok();
        let ellipsoid = resolution_ellipsoid(&reso, &reso_v).ok();

        let ok = r0.is_finite()
            && all_finite(&reso)
            && reso_v.iter().all(|value| value.is_finite())
            && reso_s.is_finite()
            && res_vol.is_finite()
            && coherent_fwhms.iter().all(|value| value.is_finite());
        if !ok {
            warn!(ki, kf, q, r0, res_vol, "resolution quadric is not finite");
        }

        Ok(ResolutionResult {
            q_avg: [q, 0.0, 0.0, e],
            ki,
            kf,
            q_ki,
            q_kf,
            two_theta,
            theta_m,
            theta_a,
            curvatures: [mono_curv_h, mono_curv_v, ana_curv_h, ana_curv_v],
            analyzer_sample_position: [pos_y2, pos_z2],
            reso,
            reso_v,
            reso_s,
            r0,
            res_vol,
            coherent_fwhms,
            incoherent_fwhms,
            mono_reflectivity: mono.reflectivity,
            ana_reflectivity,
            classification,
            ellipsoid,
            ok,
        })
    }

    /// Fixed radius, overridden by a formula (in cm), overridden by the
    /// optimal focusing radius.
    fn curvature(
        &self,
        params: &InstrumentParameters,
        fixed: f64,
        formula: Option<&CurvatureFormula>,
        optimal: Option<(f64, f64, f64, bool)>,
    ) -> f64 {
        let mut radius = fixed;
        if let Some(formula) = formula {
            radius = formula.evaluate(params) * self.geometry.cm2a();
        }
        if let Some((before, after, two_theta, vertical)) = optimal {
            radius = self
                .geometry
                .focusing_curvature(before, after, two_theta, vertical);
        }
        radius
    }

    fn kinematic_transform(&self, ki: f64, kf: f64, q: f64, sample_sense: f64) -> RealMatrix {
        let ksq2e = self.geometry.ksq2e();
        let d_e = (ki * ki - kf * kf) / (2.0 * q * q);
        let d_ei = 0.5 + d_e;
        let d_ef = 0.5 - d_e;
        let kperp = (ki * ki - (q * d_ei).powi(2)).sqrt() * sample_sense;

        let mut t = identity(6);
        t[(0, 3)] = -1.0;
        t[(1, 4)] = -1.0;
        t[(2, 5)] = -1.0;
        t[(3, 0)] = 2.0 * ksq2e * q * d_ei;
        t[(3, 3)] = 2.0 * ksq2e * q * d_ef;
        t[(3, 1)] = 2.0 * ksq2e * kperp;
        t[(3, 4)] = -2.0 * ksq2e * kperp;
        t[(4, 1)] = d_ef;
        t[(5, 2)] = d_ef;
        t[(4, 4)] = d_ei;
        t[(5, 5)] = d_ei;
        t
    }
}

/// Convolve the quadric with a Gaussian sample mosaic of width
/// `mosaic_q` (in 1/A) along `axis`. A zero width leaves it unchanged.
fn add_sample_mosaic(quadric: &RealMatrix, mosaic_q: f64, axis: usize, s2: f64) -> RealMatrix {
    let mos_q_sq = mosaic_q * mosaic_q;
    let direction: Vec<f64> = column(quadric, axis)
        .into_iter()
        .map(|value| value / s2)
        .collect();
    let denominator = 1.0 / mos_q_sq + quadric[(axis, axis)] / s2;
    let size = quadric.nrows();
    RealMatrix::from_fn(size, size, |r, c| {
        quadric[(r, c)] - s2 * (direction[r] * direction[c]) / denominator
    })
}

/// Evaluate with the default geometry and quadric collaborators.
pub fn calc_resolution(params: &InstrumentParameters) -> ComputeResult<ResolutionResult> {
    ResolutionEngine::new().calc(params)
}
