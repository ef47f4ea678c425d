pub mod element;
pub mod engine;
pub mod report;
pub mod scatter;

pub use element::{OpticalElementBlocks, OpticalElementBuilder, OpticalElementInput};
pub use engine::{ResolutionEngine, ResolutionResult, calc_resolution};
pub use report::render_summary;
pub use scatter::{ScatterFactors, effective_reflectivities, scatter_factors};
