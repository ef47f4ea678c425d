pub mod config;
pub mod constants;

pub use config::{
    CurvatureFormula, InstrumentParameters, ParameterError, ReflectivityCurve,
    ScatterFactorFlags, load_instrument_parameters, parse_instrument_parameters,
};
