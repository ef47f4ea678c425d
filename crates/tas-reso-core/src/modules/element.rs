//! Resolution contribution of a single Bragg-reflecting crystal.
//!
//! The same builder serves the monochromator and the analyser; for the
//! analyser the caller passes the detector as "source", the analyser as
//! "crystal" and the negated Bragg angle.

use crate::domain::OpticalElement;
use crate::numerics::geometry::TasGeometryApi;
use crate::numerics::linalg::{RealMatrix, identity};
use std::f64::consts::PI;
use tracing::trace;

/// Geometry, divergence and focusing of one optical element.
///
/// Lengths in A, angles in rad, inverse curvatures in 1/A.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OpticalElementInput {
    pub element: OpticalElement,
    pub src_w: f64,
    pub src_h: f64,
    pub crystal_w: f64,
    pub crystal_h: f64,
    pub dist_vsrc: f64,
    pub dist_hsrc: f64,
    pub dist_sample: f64,
    pub k: f64,
    /// Signed Bragg angle.
    pub theta: f64,
    pub coll_h_src: f64,
    pub coll_h_sample: f64,
    pub coll_v_src: f64,
    pub coll_v_sample: f64,
    pub mosaic: f64,
    pub mosaic_v: f64,
    pub inv_curv_h: f64,
    pub inv_curv_v: f64,
    pub reflectivity: f64,
    /// Truncate the vertical linear coefficients toward zero.
    pub truncate_vertical_linear: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OpticalElementBlocks {
    /// Quadratic block `A` (3x3); `[2, 2]` holds the folded vertical term.
    pub quadratic: RealMatrix,
    /// Linear block `B` (3x3).
    pub linear: RealMatrix,
    /// Constant block `C` (3x3).
    pub constant: RealMatrix,
    /// Vertical 2x2 block before folding.
    pub vertical: RealMatrix,
    pub vertical_linear: [f64; 2],
    pub vertical_constant: f64,
    /// Effective reflectivity after integrating the vertical divergence.
    pub reflectivity: f64,
}

pub struct OpticalElementBuilder<'a, G: TasGeometryApi> {
    geometry: &'a G,
}

impl<'a, G: TasGeometryApi> OpticalElementBuilder<'a, G> {
    pub fn new(geometry: &'a G) -> Self {
        Self { geometry }
    }

    pub fn build(&self, input: &OpticalElementInput) -> OpticalElementBlocks {
        let s2 = self.geometry.sig2fwhm().powi(2);
        let k = input.k;
        let c = 0.5 * s2 / (k * k);
        let tan_t = input.theta.tan();
        let sin_t = input.theta.sin().abs();
        let dist_ms = input.dist_sample;
        let dist_hs = input.dist_hsrc;
        let dist_vs = input.dist_vsrc;

        // horizontal quadratic block
        let mut quadratic = identity(3);
        let a_t0 = 1.0 / input.mosaic;
        let a_tx = input.inv_curv_h * dist_ms / sin_t;
        let a_t1 = a_t0 * a_tx;

        quadratic[(0, 0)] = c
            * tan_t.powi(2)
            * ((2.0 / input.coll_h_src).powi(2)
                + (2.0 * dist_hs / input.src_w).powi(2)
                + a_t0 * a_t0);
        let a01 = c
            * tan_t
            * (2.0 / input.coll_h_src.powi(2)
                + 2.0 * dist_hs * (dist_hs - dist_ms) / input.src_w.powi(2)
                + a_t0 * a_t0
                - a_t0 * a_t1);
        quadratic[(0, 1)] = a01;
        quadratic[(1, 0)] = a01;
        quadratic[(1, 1)] = c
            * (1.0 / input.coll_h_src.powi(2)
                + 1.0 / input.coll_h_sample.powi(2)
                + ((dist_hs - dist_ms) / input.src_w).powi(2)
                + (dist_ms / (input.crystal_w * sin_t)).powi(2)
                + (a_t0 - a_t1).powi(2));

        // vertical quadratic block
        let mut vertical = RealMatrix::zeros(2, 2);
        let av_t0 = 0.5 / (input.mosaic_v * sin_t);
        let av_t1 = input.inv_curv_v * dist_ms / input.mosaic_v;

        vertical[(0, 0)] = c
            * (1.0 / input.coll_v_sample.powi(2)
                + (dist_ms / input.src_h).powi(2)
                + (dist_ms / input.crystal_h).powi(2)
                + (av_t0 - av_t1).powi(2));
        let av01 = c
            * (dist_vs * dist_ms / input.src_h.powi(2) - av_t0 * av_t0 + av_t0 * av_t1);
        vertical[(0, 1)] = av01;
        vertical[(1, 0)] = av01;
        vertical[(1, 1)] = c
            * (1.0 / input.coll_v_src.powi(2) + (dist_vs / input.src_h).powi(2) + av_t0 * av_t0);

        // linear blocks
        let mut linear = RealMatrix::zeros(3, 3);
        let b_t0 = input.inv_curv_h / (input.mosaic.powi(2) * sin_t);
        linear[(0, 1)] = s2 / k * tan_t * (2.0 * dist_hs / input.src_w.powi(2) + b_t0);
        linear[(1, 1)] = s2 / k
            * (-dist_ms / (input.crystal_w * sin_t).powi(2) + b_t0 - b_t0 * a_tx
                + (dist_hs - dist_ms) / input.src_w.powi(2));

        let bv_t0 = input.inv_curv_v / input.mosaic_v.powi(2);
        let mut vertical_linear = [
            -s2 / k
                * (dist_ms / input.crystal_h.powi(2)
                    + dist_ms / input.src_h.powi(2)
                    + bv_t0 * input.inv_curv_v * dist_ms
                    - 0.5 * bv_t0 / sin_t),
            -s2 / k * (dist_vs / input.src_h.powi(2) + 0.5 * bv_t0 / sin_t),
        ];
        if input.truncate_vertical_linear {
            vertical_linear = vertical_linear.map(f64::trunc);
        }

        // constant blocks
        let mut constant = RealMatrix::zeros(3, 3);
        constant[(1, 1)] = 0.5
            * s2
            * (1.0 / input.src_w.powi(2)
                + (1.0 / (input.crystal_w * sin_t)).powi(2)
                + (input.inv_curv_h / (input.mosaic * sin_t)).powi(2));
        let vertical_constant = 0.5
            * s2
            * (1.0 / input.src_h.powi(2)
                + 1.0 / input.crystal_h.powi(2)
                + (input.inv_curv_v / input.mosaic_v).powi(2));

        // fold the vertical block into the z entries
        let av11 = vertical[(1, 1)];
        quadratic[(2, 2)] = vertical[(0, 0)] - vertical[(0, 1)].powi(2) / av11;
        linear[(2, 2)] = vertical_linear[0] - vertical_linear[1] * vertical[(0, 1)] / av11;
        constant[(2, 2)] = vertical_constant - (0.5 * vertical_linear[1]).powi(2) / av11;

        let reflectivity = input.reflectivity * (PI / av11).sqrt();

        trace!(
            element = %input.element,
            a22 = quadratic[(2, 2)],
            av11,
            reflectivity,
            "built optical element blocks"
        );

        OpticalElementBlocks {
            quadratic,
            linear,
            constant,
            vertical,
            vertical_linear,
            vertical_constant,
            reflectivity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{OpticalElementBuilder, OpticalElementInput};
    use crate::common::constants::{CM2A, MIN2RAD, SIG2FWHM};
    use crate::domain::OpticalElement;
    use crate::numerics::geometry::TasGeometry;
    use std::f64::consts::PI;

    fn assert_close(actual: f64, expected: f64, rel_tol: f64) {
        let scale = expected.abs().max(1.0e-300);
        assert!(
            ((actual - expected) / scale).abs() <= rel_tol,
            "expected {expected:e}, got {actual:e}"
        );
    }

    fn flat_monochromator() -> OpticalElementInput {
        OpticalElementInput {
            element: OpticalElement::Monochromator,
            src_w: 6.0 * CM2A,
            src_h: 12.0 * CM2A,
            crystal_w: 12.0 * CM2A,
            crystal_h: 8.0 * CM2A,
            dist_vsrc: 100.0 * CM2A,
            dist_hsrc: 100.0 * CM2A,
            dist_sample: 100.0 * CM2A,
            k: 1.4,
            theta: -0.98,
            coll_h_src: 30.0 * MIN2RAD,
            coll_h_sample: 30.0 * MIN2RAD,
            coll_v_src: 120.0 * MIN2RAD,
            coll_v_sample: 120.0 * MIN2RAD,
            mosaic: 60.0 * MIN2RAD,
            mosaic_v: 60.0 * MIN2RAD,
            inv_curv_h: 0.0,
            inv_curv_v: 0.0,
            reflectivity: 1.0,
            truncate_vertical_linear: false,
        }
    }

    #[test]
    fn blocks_are_symmetric_and_sparse() {
        let blocks = OpticalElementBuilder::new(&TasGeometry).build(&flat_monochromator());

        assert_eq!(blocks.quadratic[(0, 1)], blocks.quadratic[(1, 0)]);
        assert_eq!(blocks.vertical[(0, 1)], blocks.vertical[(1, 0)]);
        assert_eq!(blocks.quadratic[(0, 2)], 0.0);
        assert_eq!(blocks.quadratic[(2, 1)], 0.0);
        for (r, c) in [(0, 0), (1, 0), (0, 2), (2, 0), (1, 2), (2, 1)] {
            assert_eq!(blocks.linear[(r, c)], 0.0);
        }
        for (r, c) in [(0, 0), (0, 1), (1, 0), (0, 2), (2, 0), (1, 2), (2, 1)] {
            assert_eq!(blocks.constant[(r, c)], 0.0);
        }
    }

    #[test]
    fn flat_crystal_matches_closed_form_entries() {
        let input = flat_monochromator();
        let blocks = OpticalElementBuilder::new(&TasGeometry).build(&input);

        let c = 0.5 * SIG2FWHM * SIG2FWHM / (input.k * input.k);
        let tan_t = input.theta.tan();
        let expected_a00 = c
            * tan_t
            * tan_t
            * ((2.0 / input.coll_h_src).powi(2)
                + (2.0 * input.dist_hsrc / input.src_w).powi(2)
                + 1.0 / input.mosaic.powi(2));
        assert_close(blocks.quadratic[(0, 0)], expected_a00, 1.0e-14);

        // equal source and sample arms cancel the source-width coupling
        let expected_a01 =
            c * tan_t * (2.0 / input.coll_h_src.powi(2) + 1.0 / input.mosaic.powi(2));
        assert_close(blocks.quadratic[(0, 1)], expected_a01, 1.0e-14);
    }

    #[test]
    fn vertical_block_is_folded_by_schur_complement() {
        let blocks = OpticalElementBuilder::new(&TasGeometry).build(&flat_monochromator());
        let av = &blocks.vertical;

        let folded = av[(0, 0)] - av[(0, 1)] * av[(0, 1)] / av[(1, 1)];
        assert_eq!(blocks.quadratic[(2, 2)], folded);

        let folded_linear = blocks.vertical_linear[0]
            - blocks.vertical_linear[1] * av[(0, 1)] / av[(1, 1)];
        assert_eq!(blocks.linear[(2, 2)], folded_linear);

        let folded_constant =
            blocks.vertical_constant - (0.5 * blocks.vertical_linear[1]).powi(2) / av[(1, 1)];
        assert_eq!(blocks.constant[(2, 2)], folded_constant);

        assert_close(blocks.reflectivity, (PI / av[(1, 1)]).sqrt(), 1.0e-15);
    }

    #[test]
    fn curvature_enters_mosaic_terms() {
        let flat = OpticalElementBuilder::new(&TasGeometry).build(&flat_monochromator());
        let curved_input = OpticalElementInput {
            inv_curv_h: 1.0 / (150.0 * CM2A),
            inv_curv_v: 1.0 / (80.0 * CM2A),
            ..flat_monochromator()
        };
        let curved = OpticalElementBuilder::new(&TasGeometry).build(&curved_input);

        assert_eq!(flat.quadratic[(0, 0)], curved.quadratic[(0, 0)]);
        assert_ne!(flat.quadratic[(1, 1)], curved.quadratic[(1, 1)]);
        assert_ne!(flat.linear[(0, 1)], curved.linear[(0, 1)]);
        assert!(curved.constant[(1, 1)] > flat.constant[(1, 1)]);
        assert!(curved.vertical_constant > flat.vertical_constant);
    }

    #[test]
    fn truncation_drops_fractional_vertical_linear_terms() {
        let exact = OpticalElementBuilder::new(&TasGeometry).build(&flat_monochromator());
        assert!(exact.vertical_linear[0] != 0.0);
        assert!(exact.vertical_linear[0].abs() < 1.0);

        let truncated_input = OpticalElementInput {
            truncate_vertical_linear: true,
            ..flat_monochromator()
        };
        let truncated = OpticalElementBuilder::new(&TasGeometry).build(&truncated_input);
        assert_eq!(truncated.vertical_linear, [0.0, 0.0]);
        assert_eq!(truncated.linear[(2, 2)], 0.0);
        assert_eq!(truncated.constant[(2, 2)], truncated.vertical_constant);
        assert_eq!(truncated.quadratic, exact.quadratic);
    }

    #[test]
    fn open_vertical_optics_make_reflectivity_non_finite() {
        let input = OpticalElementInput {
            mosaic_v: f64::INFINITY,
            coll_v_src: f64::INFINITY,
            dist_vsrc: 0.0,
            ..flat_monochromator()
        };
        let blocks = OpticalElementBuilder::new(&TasGeometry).build(&input);

        assert_eq!(blocks.vertical[(1, 1)], 0.0);
        assert!(!blocks.quadratic[(2, 2)].is_finite());
        assert!(!blocks.reflectivity.is_finite());
    }

    fn curved_monochromator() -> OpticalElementInput {
        OpticalElementInput {
            element: OpticalElement::Monochromator,
            src_w: 6.0 * CM2A,
            src_h: 12.0 * CM2A,
            crystal_w: 12.0 * CM2A,
            crystal_h: 8.0 * CM2A,
            dist_vsrc: 90.0 * CM2A,
            dist_hsrc: 110.0 * CM2A,
            dist_sample: 150.0 * CM2A,
            k: 1.4,
            theta: -0.75,
            coll_h_src: 40.0 * MIN2RAD,
            coll_h_sample: 30.0 * MIN2RAD,
            coll_v_src: 100.0 * MIN2RAD,
            coll_v_sample: 80.0 * MIN2RAD,
            mosaic: 40.0 * MIN2RAD,
            mosaic_v: 50.0 * MIN2RAD,
            inv_curv_h: 1.0 / (150.0 * CM2A),
            inv_curv_v: 1.0 / (80.0 * CM2A),
            reflectivity: 0.7,
            truncate_vertical_linear: false,
        }
    }

    #[test]
    fn curved_crystal_matches_reference_blocks() {
        let blocks = OpticalElementBuilder::new(&TasGeometry).build(&curved_monochromator());

        let expected_quadratic = [
            ((0, 0), 46990.68395039448),
            ((0, 1), -14599.356053990427),
            ((1, 0), -14599.356053990427),
            ((1, 1), 31841.639382715908),
            ((2, 2), 5902.144549307435),
        ];
        for ((r, c), expected) in expected_quadratic {
            assert_close(blocks.quadratic[(r, c)], expected, 1.0e-12);
        }

        // the mosaic/curvature cross terms make Av[0,1] positive here
        assert_close(blocks.vertical[(0, 0)], 12043.512834200226, 1.0e-12);
        assert_close(blocks.vertical[(0, 1)], 5731.724231792641, 1.0e-12);
        assert_close(blocks.vertical[(1, 1)], 5349.404423462685, 1.0e-12);

        assert_close(blocks.linear[(0, 1)], -2.8911096194796277e-6, 1.0e-12);
        assert_close(blocks.linear[(1, 1)], -1.4692054871695003e-6, 1.0e-12);
        assert_close(blocks.vertical_linear[0], -2.8056887174769004e-6, 1.0e-12);
        assert_close(blocks.vertical_linear[1], -1.7415600169402055e-6, 1.0e-12);
        assert_close(blocks.linear[(2, 2)], -9.396600982094293e-7, 1.0e-12);

        assert_close(blocks.constant[(1, 1)], 2.077400477995998e-16, 1.0e-12);
        assert_close(blocks.vertical_constant, 2.110496956385317e-16, 1.0e-12);
        assert_close(blocks.constant[(2, 2)], 6.930348183098233e-17, 1.0e-11);

        assert_close(blocks.reflectivity, 0.016963687371081747, 1.0e-12);
        assert_close(
            blocks.reflectivity,
            0.7 * (PI / blocks.vertical[(1, 1)]).sqrt(),
            1.0e-15,
        );
    }
}
