use crate::core::polygon_mask::{PolygonBoundary, PolygonCatalog, PolygonMask};
use crate::io::grid::GridField;
use crate::types::{ShelfError, ShelfResult};
use std::collections::BTreeMap;

/// Read-only reference data shared by every record of a run.
///
/// Polygons and grids are looked up by name, never by position.
#[derive(Debug, Clone, Default)]
pub struct ReferenceData {
    polygons: PolygonCatalog,
    grids: BTreeMap<String, GridField>,
}

impl ReferenceData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_polygon(mut self, boundary: PolygonBoundary) -> Self {
        self.insert_polygon(boundary);
        self
    }

    pub fn with_grid(mut self, grid: GridField) -> Self {
        self.insert_grid(grid);
        self
    }

    pub fn insert_polygon(&mut self, boundary: PolygonBoundary) {
        if let Some(previous) = self.polygons.insert(boundary) {
            log::warn!("Replaced polygon '{}' in reference data", previous.id);
        }
    }

    pub fn insert_grid(&mut self, grid: GridField) {
        log::debug!("Registering grid '{}' ({} slices)", grid.name, grid.n_times());
        if let Some(previous) = self.grids.insert(grid.name.clone(), grid) {
            log::warn!("Replaced grid '{}' in reference data", previous.name);
        }
    }

    pub fn polygon(&self, id: &str) -> ShelfResult<&PolygonBoundary> {
        self.polygons.get(id)
    }

    pub fn grid(&self, name: &str) -> ShelfResult<&GridField> {
        self.grids.get(name).ok_or_else(|| ShelfError::UnknownReference {
            kind: "grid".to_string(),
            id: name.to_string(),
        })
    }

    pub fn polygons(&self) -> &PolygonCatalog {
        &self.polygons
    }

    pub fn grid_names(&self) -> impl Iterator<Item = &str> {
        self.grids.keys().map(String::as_str)
    }

    /// Prepared mask for the named shelf outline
    pub fn shelf_mask(&self, id: &str) -> ShelfResult<PolygonMask> {
        PolygonMask::new(self.polygon(id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PlanarPoint;
    use ndarray::{array, Array3};

    #[test]
    fn test_lookup_by_name() {
        let square = PolygonBoundary::new(
            "amery",
            vec![
                PlanarPoint::new(0.0, 0.0),
                PlanarPoint::new(10.0, 0.0),
                PlanarPoint::new(10.0, 10.0),
                PlanarPoint::new(0.0, 10.0),
            ],
        );
        let grid = GridField::from_axes(
            "fac",
            &array![0.0, 1.0],
            &array![0.0, 1.0],
            Array3::zeros((1, 2, 2)),
            None,
        )
        .unwrap();
        let reference = ReferenceData::new().with_polygon(square).with_grid(grid);

        assert!(reference.shelf_mask("amery").unwrap().contains_point(5.0, 5.0));
        assert_eq!(reference.grid("fac").unwrap().n_times(), 1);
        assert_eq!(reference.grid_names().collect::<Vec<_>>(), vec!["fac"]);

        match reference.grid("smb") {
            Err(ShelfError::UnknownReference { kind, id }) => {
                assert_eq!(kind, "grid");
                assert_eq!(id, "smb");
            }
            other => panic!("expected UnknownReference, got {:?}", other),
        }
        assert!(reference.polygon("ross").is_err());
        assert_eq!(reference.polygons().ids().collect::<Vec<_>>(), vec!["amery"]);
    }
}
