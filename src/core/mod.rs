//! Core shelf correction modules

pub mod correction;
pub mod fill_value;
pub mod interpolation;
pub mod polygon_mask;
pub mod projection;
pub mod timeseries;
pub mod triangulation;

// Re-export main types
pub use correction::{
    hydrostatic_thickness, BeamSummary, CorrectionParams, CorrectionPipeline, FirnEpoch, FirnModel,
    FirnSource, TideCorrection,
};
pub use fill_value::{normalize, FillSpec};
pub use interpolation::{interpolate, ScatteredInterpolator};
pub use polygon_mask::{contains, PolygonBoundary, PolygonCatalog, PolygonMask};
pub use projection::{Hemisphere, PlanarUnit, PolarStereographic, ProjectionParams};
pub use timeseries::{cumulative_integrate, mean_ignoring_missing, spatial_mean, HeightChangeSeries};
pub use triangulation::Triangulation;
