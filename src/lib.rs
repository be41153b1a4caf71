//! shelfcorr: ice-shelf altimetry correction
//!
//! Turns ATL06 land-ice heights over floating ice shelves into hydrostatic
//! ice thickness. Each beam record is normalized, projected to polar
//! stereographic coordinates, masked against a shelf outline, sampled
//! against a firn-air-content grid and corrected for mean dynamic
//! topography and the geoid. Gridded model fields can be reduced to
//! regional time series of cumulative height and mass change.
//!
//! Missing samples are `NaN` throughout (see [`types::MISSING`]).

pub mod types;
pub mod io;
pub mod core;

#[cfg(feature = "python")]
mod python;

// Re-export main types and functions for easier access
pub use types::{GeoPoint, PlanarBounds, PlanarPoint, ShelfError, ShelfResult, MISSING};

pub use crate::core::{CorrectionParams, CorrectionPipeline, FirnSource, ProjectionParams};
pub use io::{BeamRecord, GridField, PipelineConfig, RawBeam, ReferenceData};
