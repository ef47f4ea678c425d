pub mod geometry;
pub mod linalg;
pub mod quadric;

pub use geometry::{TasGeometry, TasGeometryApi, energy_transfer};
pub use linalg::{LinalgError, LuDecomposition, RealMatrix};
pub use quadric::{
    QuadricAlgebra, QuadricAlgebraApi, QuadricClassification, ResolutionEllipsoid,
    classify_quadric, resolution_ellipsoid,
};
