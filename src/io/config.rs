use crate::core::correction::{CorrectionParams, FirnSource};
use crate::core::polygon_mask::PolygonCatalog;
use crate::core::projection::ProjectionParams;
use crate::types::ShelfResult;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Everything a correction run needs besides the data itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub projection: ProjectionParams,
    /// Identifier of the shelf outline in the polygon catalog
    pub shelf_polygon: String,
    pub firn: FirnSource,
    #[serde(default)]
    pub correction: CorrectionParams,
}

impl PipelineConfig {
    pub fn new(projection: ProjectionParams, shelf_polygon: impl Into<String>, firn: FirnSource) -> Self {
        Self {
            projection,
            shelf_polygon: shelf_polygon.into(),
            firn,
            correction: CorrectionParams::default(),
        }
    }

    pub fn from_json_str(json: &str) -> ShelfResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> ShelfResult<Self> {
        log::info!("Loading pipeline configuration: {}", path.as_ref().display());
        let text = fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> ShelfResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> ShelfResult<()> {
        self.projection.validate()?;
        self.firn.validate()?;
        self.correction.validate()
    }
}

/// Load a polygon catalog serialized as JSON
pub fn load_polygon_catalog<P: AsRef<Path>>(path: P) -> ShelfResult<PolygonCatalog> {
    log::info!("Loading polygon catalog: {}", path.as_ref().display());
    let text = fs::read_to_string(path.as_ref())?;
    let catalog: PolygonCatalog = serde_json::from_str(&text)?;
    log::debug!("Loaded {} polygons", catalog.len());
    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::correction::FirnEpoch;
    use crate::core::polygon_mask::PolygonBoundary;
    use crate::core::projection::Hemisphere;
    use crate::types::{PlanarPoint, ShelfError};
    use std::io::Write;

    const CONFIG: &str = r#"{
        "projection": {
            "hemisphere": "south",
            "true_scale_latitude": -71.0,
            "central_meridian": 0.0,
            "unit": "meters"
        },
        "shelf_polygon": "Amery",
        "firn": {"grid": {"name": "fac", "epoch": {"nearest": 2019.5}}},
        "correction": {"mdt_correction": -1.1}
    }"#;

    #[test]
    fn test_parse_config() {
        let config = PipelineConfig::from_json_str(CONFIG).unwrap();
        assert_eq!(config.projection.hemisphere, Hemisphere::South);
        assert_eq!(config.shelf_polygon, "Amery");
        assert_eq!(config.correction.mdt_correction, -1.1);
        assert_eq!(config.correction.rho_ocean, 1028.0);
        match &config.firn {
            FirnSource::Grid { name, epoch, buffer } => {
                assert_eq!(name, "fac");
                assert_eq!(*epoch, FirnEpoch::Nearest(2019.5));
                assert_eq!(*buffer, None);
            }
            other => panic!("unexpected firn source {:?}", other),
        }
    }

    #[test]
    fn test_rejects_degenerate_densities() {
        let json = CONFIG.replace(
            r#""mdt_correction": -1.1"#,
            r#""rho_ice": 1000.0, "rho_ocean": 1000.0"#,
        );
        assert!(matches!(
            PipelineConfig::from_json_str(&json),
            Err(ShelfError::DegenerateConfiguration(_))
        ));
    }

    #[test]
    fn test_rejects_hemisphere_mismatch() {
        let json = CONFIG.replace("-71.0", "71.0");
        assert!(PipelineConfig::from_json_str(&json).is_err());
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            PipelineConfig::from_json_str("{\"projection\": "),
            Err(ShelfError::Config(_))
        ));
    }

    #[test]
    fn test_file_round_trip() {
        let config = PipelineConfig::new(ProjectionParams::epsg3413(), "Petermann", FirnSource::Constant(12.0));
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(config.to_json_string().unwrap().as_bytes()).unwrap();

        let loaded = PipelineConfig::from_file(file.path()).unwrap();
        assert_eq!(loaded, config);
        assert!(matches!(
            PipelineConfig::from_file("/nonexistent/shelfcorr.json"),
            Err(ShelfError::Io(_))
        ));
    }

    #[test]
    fn test_polygon_catalog_file() {
        let catalog: PolygonCatalog = vec![PolygonBoundary::new(
            "amery",
            vec![
                PlanarPoint::new(0.0, 0.0),
                PlanarPoint::new(1.0, 0.0),
                PlanarPoint::new(0.0, 1.0),
            ],
        )
        .with_attribute("TYPE", "FL")]
        .into_iter()
        .collect();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(serde_json::to_string(&catalog).unwrap().as_bytes()).unwrap();
        let loaded = load_polygon_catalog(file.path()).unwrap();
        assert_eq!(loaded.find_by_attribute("TYPE", "FL").len(), 1);
    }
}
