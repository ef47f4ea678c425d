//! Gaussian resolution function of a triple-axis neutron spectrometer in the
//! extended Eckold-Sobolev formalism.

pub mod common;
pub mod domain;
pub mod modules;
pub mod numerics;

pub use common::config::{InstrumentParameters, load_instrument_parameters};
pub use domain::{ComputeResult, ResoError, ResoErrorCategory};
pub use modules::engine::{ResolutionEngine, ResolutionResult, calc_resolution};
