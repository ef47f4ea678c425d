pub mod errors;

pub use errors::{ComputeResult, ResoError, ResoErrorCategory, ResoResult};

use std::fmt::{Display, Formatter};

/// Optical element of the spectrometer that contributes a resolution block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpticalElement {
    Monochromator,
    Analyser,
}

impl OpticalElement {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Monochromator => "monochromator",
            Self::Analyser => "analyser",
        }
    }
}

impl Display for OpticalElement {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

/// Axis labels of the reduced (Q, E) resolution quadric.
pub const RESOLUTION_AXES: [&str; 4] = ["Q_para", "Q_perp", "Q_z", "E"];
