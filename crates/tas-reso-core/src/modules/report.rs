use super::engine::ResolutionResult;
use crate::common::constants::RAD2DEG;
use crate::domain::RESOLUTION_AXES;

/// Plain-text summary of a resolution evaluation.
pub fn render_summary(result: &ResolutionResult) -> String {
    let mut lines = Vec::new();
    lines.push(format!(
        "ki = {:.4} 1/A, kf = {:.4} 1/A, Q = {:.4} 1/A, E = {:.4} meV",
        result.ki, result.kf, result.q_avg[0], result.q_avg[3]
    ));
    lines.push(format!(
        "2theta = {:.3} deg, theta_m = {:.3} deg, theta_a = {:.3} deg",
        result.two_theta * RAD2DEG,
        result.theta_m * RAD2DEG,
        result.theta_a * RAD2DEG
    ));
    lines.push(format!(
        "status: {}",
        if result.ok { "ok" } else { "INVALID" }
    ));
    lines.push(String::new());
    lines.push(format!("Resolution volume: {:.6e} meV/A^3", result.res_vol));
    lines.push(format!("R0: {:.6e}", result.r0));
    lines.push(format!(
        "Reflectivities: mono {:.6e}, ana {:.6e}",
        result.mono_reflectivity, result.ana_reflectivity
    ));
    lines.push(String::new());

    lines.push(format!(
        "{:>8} {:>14} {:>14}",
        "axis", "coherent", "incoherent"
    ));
    for (index, axis) in RESOLUTION_AXES.iter().enumerate() {
        lines.push(format!(
            "{:>8} {:>14.6} {:>14.6} {}",
            axis,
            result.coherent_fwhms.get(index).copied().unwrap_or(f64::NAN),
            result.incoherent_fwhms.get(index).copied().unwrap_or(f64::NAN),
            axis_unit(index)
        ));
    }
    lines.push(String::new());

    lines.push("Resolution matrix:".to_string());
    for row in 0..result.reso.nrows() {
        lines.push(
            (0..result.reso.ncols())
                .map(|col| format!("{:>16.6e}", result.reso[(row, col)]))
                .collect(),
        );
    }
    lines.push("Resolution vector:".to_string());
    lines.push(
        result
            .reso_v
            .iter()
            .map(|value| format!("{value:>16.6e}"))
            .collect(),
    );
    lines.push(format!("Resolution scalar: {:.6e}", result.reso_s));

    if let Some(ellipsoid) = &result.ellipsoid {
        lines.push(String::new());
        lines.push("Ellipsoid offsets:".to_string());
        for (index, (axis, offset)) in RESOLUTION_AXES.iter().zip(&ellipsoid.offsets).enumerate() {
            lines.push(format!("{axis:>8} {offset:>14.6e} {}", axis_unit(index)));
        }
        lines.push(format!(
            "Ellipsoid HWHMs (principal axes): {}",
            ellipsoid
                .principal_hwhms
                .iter()
                .map(|hwhm| format!("{hwhm:.6}"))
                .collect::<Vec<_>>()
                .join(", ")
        ));
    }

    if let Some(classification) = result.classification {
        lines.push(format!(
            "Quadric rank {} (+{} -{} 0:{}), extended rank {} (+{} -{} 0:{})",
            classification.rank,
            classification.positive,
            classification.negative,
            classification.zero,
            classification.rank_extended,
            classification.positive_extended,
            classification.negative_extended,
            classification.zero_extended,
        ));
    }

    lines.join("\n")
}

fn axis_unit(index: usize) -> &'static str {
    if index == 3 { "meV" } else { "1/A" }
}
