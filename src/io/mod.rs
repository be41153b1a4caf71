//! Input boundary: raw beam extraction, grid fields, reference data and configuration

pub mod beam;
pub mod config;
pub mod grid;
pub mod reference;

pub use beam::{BeamId, BeamRecord, BeamSide, RawBeam, RawField};
pub use config::{load_polygon_catalog, PipelineConfig};
pub use grid::GridField;
pub use reference::ReferenceData;
