use super::CliError;
use anyhow::Context;
use std::fs;
use std::path::PathBuf;
use tas_reso_core::common::config::{InstrumentParameters, load_instrument_parameters};
use tas_reso_core::domain::ResoError;
use tas_reso_core::modules::render_summary;
use tas_reso_core::ResolutionEngine;
use tracing::info;

#[derive(clap::Args)]
pub(super) struct CalcArgs {
    /// Instrument parameter file (JSON, missing keys use the defaults)
    #[arg(long)]
    params: PathBuf,

    /// Override the incident wavevector (1/A)
    #[arg(long)]
    ki: Option<f64>,

    /// Override the final wavevector (1/A)
    #[arg(long)]
    kf: Option<f64>,

    /// Override the momentum transfer (1/A)
    #[arg(long)]
    q: Option<f64>,

    /// Write the full result as JSON
    #[arg(long)]
    json: Option<PathBuf>,
}

impl CalcArgs {
    fn load_parameters(&self) -> Result<InstrumentParameters, ResoError> {
        let mut params = load_instrument_parameters(&self.params)?;
        if self.ki.is_some() || self.kf.is_some() || self.q.is_some() {
            let ki = self.ki.unwrap_or(params.ki);
            let kf = self.kf.unwrap_or(params.kf);
            let q = self.q.unwrap_or(params.q);
            params = params.with_target(ki, kf, q).validated()?;
        }
        Ok(params)
    }
}

pub(super) fn run_calc_command(args: CalcArgs) -> Result<i32, CliError> {
    let params = args.load_parameters().map_err(CliError::Compute)?;
    let result = ResolutionEngine::new()
        .calc(&params)
        .map_err(CliError::Compute)?;

    println!("{}", render_summary(&result));

    if let Some(path) = &args.json {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create report directory '{}'", parent.display())
            })?;
        }
        let report = serde_json::to_string_pretty(&result).map_err(serialization_error)?;
        fs::write(path, report)
            .with_context(|| format!("failed to write JSON report '{}'", path.display()))?;
        info!(path = %path.display(), "wrote JSON report");
        println!("JSON report: {}", path.display());
    }

    if result.ok { Ok(0) } else { Ok(1) }
}

pub(super) fn run_defaults_command() -> Result<i32, CliError> {
    let defaults = serde_json::to_string_pretty(&InstrumentParameters::default())
        .map_err(serialization_error)?;
    println!("{defaults}");
    Ok(0)
}

pub(super) fn serialization_error(error: serde_json::Error) -> CliError {
    CliError::Compute(ResoError::internal(
        "INTERNAL.SERIALIZE",
        format!("failed to serialize JSON output: {error}"),
    ))
}
