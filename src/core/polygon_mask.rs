use crate::core::projection::PolarStereographic;
use crate::types::{GeoPoint, PlanarBounds, PlanarPoint, ShelfError, ShelfResult};
use ndarray::{Array1, ArrayBase, Data, Ix1, Zip};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ice-shelf outline in planar coordinates.
///
/// A boundary may consist of several simple rings (multi-part shelves); a
/// point is inside the boundary when it is inside any ring. Holes are not
/// represented.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolygonBoundary {
    /// Stable identifier, e.g. the shelf name in the source catalogue
    pub id: String,
    /// Free-form attributes carried from the source catalogue (NAME, TYPE, ...)
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    pub rings: Vec<Vec<PlanarPoint>>,
}

impl PolygonBoundary {
    /// Single-ring boundary
    pub fn new(id: impl Into<String>, vertices: Vec<PlanarPoint>) -> Self {
        Self::with_rings(id, vec![vertices])
    }

    pub fn with_rings(id: impl Into<String>, rings: Vec<Vec<PlanarPoint>>) -> Self {
        Self {
            id: id.into(),
            attributes: BTreeMap::new(),
            rings,
        }
    }

    /// Project a geographic outline into the plane
    pub fn from_geographic(
        id: impl Into<String>,
        rings: &[Vec<GeoPoint>],
        projection: &PolarStereographic,
    ) -> ShelfResult<Self> {
        let id = id.into();
        let mut planar_rings = Vec::with_capacity(rings.len());
        for ring in rings {
            let planar: Vec<PlanarPoint> = ring.iter().map(|p| projection.forward_point(*p)).collect();
            if let Some(pos) = planar.iter().position(|p| !p.is_valid()) {
                return Err(ShelfError::InvalidGeometry(format!(
                    "vertex {} of '{}' ({:?}) is outside the projection domain",
                    pos, id, ring[pos]
                )));
            }
            planar_rings.push(planar);
        }
        Ok(Self::with_rings(id, planar_rings))
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn bounds(&self) -> Option<PlanarBounds> {
        PlanarBounds::from_points(self.rings.iter().flatten())
    }

    pub fn vertex_count(&self) -> usize {
        self.rings.iter().map(Vec::len).sum()
    }
}

#[derive(Debug, Clone, Copy)]
struct Edge {
    ax: f64,
    ay: f64,
    bx: f64,
    by: f64,
}

impl Edge {
    /// Point lies on the segment within `tol`
    fn touches(&self, px: f64, py: f64, tol: f64) -> bool {
        if px < self.ax.min(self.bx) - tol
            || px > self.ax.max(self.bx) + tol
            || py < self.ay.min(self.by) - tol
            || py > self.ay.max(self.by) + tol
        {
            return false;
        }
        let dx = self.bx - self.ax;
        let dy = self.by - self.ay;
        let cross = dx * (py - self.ay) - dy * (px - self.ax);
        cross.abs() <= tol * dx.hypot(dy)
    }

    /// Half-open crossing rule for a ray cast towards +x
    fn crosses_ray(&self, px: f64, py: f64) -> bool {
        if (self.ay > py) == (self.by > py) {
            return false;
        }
        let x_at = self.ax + (py - self.ay) * (self.bx - self.ax) / (self.by - self.ay);
        px < x_at
    }
}

#[derive(Debug, Clone)]
struct Ring {
    edges: Vec<Edge>,
    bounds: PlanarBounds,
}

/// Precomputed point-in-polygon classifier.
///
/// Built once per boundary and reused for every query. Boundary policy:
/// a point on an edge or vertex (within a tolerance of 1e-12 of the
/// polygon extent) counts as inside.
#[derive(Debug, Clone)]
pub struct PolygonMask {
    id: String,
    rings: Vec<Ring>,
    bounds: PlanarBounds,
    tolerance: f64,
}

impl PolygonMask {
    pub fn new(boundary: &PolygonBoundary) -> ShelfResult<Self> {
        let mut rings = Vec::with_capacity(boundary.rings.len());
        for (index, vertices) in boundary.rings.iter().enumerate() {
            rings.push(prepare_ring(&boundary.id, index, vertices)?);
        }
        if rings.is_empty() {
            return Err(ShelfError::InvalidGeometry(format!(
                "polygon '{}' has no rings",
                boundary.id
            )));
        }

        let bounds = rings
            .iter()
            .skip(1)
            .fold(rings[0].bounds, |acc, r| PlanarBounds {
                min_x: acc.min_x.min(r.bounds.min_x),
                max_x: acc.max_x.max(r.bounds.max_x),
                min_y: acc.min_y.min(r.bounds.min_y),
                max_y: acc.max_y.max(r.bounds.max_y),
            });
        let tolerance = bounds.width().max(bounds.height()) * 1e-12;

        log::debug!(
            "Prepared polygon mask '{}': {} rings, {} edges",
            boundary.id,
            rings.len(),
            rings.iter().map(|r| r.edges.len()).sum::<usize>()
        );

        Ok(Self {
            id: boundary.id.clone(),
            rings,
            bounds,
            tolerance,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn bounds(&self) -> PlanarBounds {
        self.bounds
    }

    /// Classify one point; missing coordinates are outside
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        if !x.is_finite() || !y.is_finite() {
            return false;
        }
        let tol = self.tolerance;
        if !self.bounds.expand(tol).contains(x, y) {
            return false;
        }
        self.rings.iter().any(|ring| {
            if !ring.bounds.expand(tol).contains(x, y) {
                return false;
            }
            if ring.edges.iter().any(|e| e.touches(x, y, tol)) {
                return true;
            }
            ring.edges.iter().filter(|e| e.crosses_ray(x, y)).count() % 2 == 1
        })
    }

    pub fn contains(&self, points: &[PlanarPoint]) -> Vec<bool> {
        points.iter().map(|p| self.contains_point(p.x, p.y)).collect()
    }

    /// Classify parallel x/y arrays
    pub fn contains_xy<S1, S2>(&self, x: &ArrayBase<S1, Ix1>, y: &ArrayBase<S2, Ix1>) -> ShelfResult<Array1<bool>>
    where
        S1: Data<Elem = f64>,
        S2: Data<Elem = f64>,
    {
        if x.len() != y.len() {
            return Err(ShelfError::shape("y", x.len(), y.len()));
        }
        let mut inside = Array1::from_elem(x.len(), false);
        Zip::from(&mut inside)
            .and(x)
            .and(y)
            .for_each(|inside, &px, &py| *inside = self.contains_point(px, py));
        Ok(inside)
    }
}

/// One-shot classification of `points` against `polygon`
pub fn contains(polygon: &PolygonBoundary, points: &[PlanarPoint]) -> ShelfResult<Vec<bool>> {
    Ok(PolygonMask::new(polygon)?.contains(points))
}

fn prepare_ring(id: &str, index: usize, vertices: &[PlanarPoint]) -> ShelfResult<Ring> {
    if vertices.iter().any(|v| !v.is_valid()) {
        return Err(ShelfError::InvalidGeometry(format!(
            "ring {} of '{}' has a non-finite vertex",
            index, id
        )));
    }

    let mut cleaned: Vec<PlanarPoint> = Vec::with_capacity(vertices.len());
    for v in vertices {
        if cleaned.last() != Some(v) {
            cleaned.push(*v);
        }
    }
    // Closing vertex repeats the first
    while cleaned.len() > 1 && cleaned.first() == cleaned.last() {
        cleaned.pop();
    }
    if cleaned.len() < 3 {
        return Err(ShelfError::InvalidGeometry(format!(
            "ring {} of '{}' has {} distinct vertices, need at least 3",
            index,
            id,
            cleaned.len()
        )));
    }

    let edges = cleaned
        .iter()
        .zip(cleaned.iter().cycle().skip(1))
        .map(|(a, b)| Edge {
            ax: a.x,
            ay: a.y,
            bx: b.x,
            by: b.y,
        })
        .collect();

    let bounds = PlanarBounds::from_points(&cleaned)
        .ok_or_else(|| ShelfError::InvalidGeometry(format!("ring {} of '{}' is empty", index, id)))?;

    Ok(Ring { edges, bounds })
}

/// Read-only catalogue of shelf outlines keyed by identifier
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolygonCatalog {
    polygons: BTreeMap<String, PolygonBoundary>,
}

impl PolygonCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a boundary, replacing any previous one with the same id
    pub fn insert(&mut self, boundary: PolygonBoundary) -> Option<PolygonBoundary> {
        self.polygons.insert(boundary.id.clone(), boundary)
    }

    pub fn get(&self, id: &str) -> ShelfResult<&PolygonBoundary> {
        self.polygons.get(id).ok_or_else(|| ShelfError::UnknownReference {
            kind: "polygon".to_string(),
            id: id.to_string(),
        })
    }

    /// All boundaries whose attribute `key` equals `value`
    pub fn find_by_attribute(&self, key: &str, value: &str) -> Vec<&PolygonBoundary> {
        self.polygons
            .values()
            .filter(|p| p.attribute(key) == Some(value))
            .collect()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.polygons.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.polygons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty()
    }
}

impl FromIterator<PolygonBoundary> for PolygonCatalog {
    fn from_iter<I: IntoIterator<Item = PolygonBoundary>>(iter: I) -> Self {
        let mut catalog = Self::new();
        for boundary in iter {
            catalog.insert(boundary);
        }
        catalog
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::projection::ProjectionParams;
    use crate::types::MISSING;
    use ndarray::array;

    fn square() -> PolygonBoundary {
        PolygonBoundary::new(
            "square",
            vec![
                PlanarPoint::new(0.0, 0.0),
                PlanarPoint::new(0.0, 10.0),
                PlanarPoint::new(10.0, 10.0),
                PlanarPoint::new(10.0, 0.0),
            ],
        )
    }

    #[test]
    fn test_square_inside_outside() {
        let result = contains(
            &square(),
            &[PlanarPoint::new(5.0, 5.0), PlanarPoint::new(15.0, 15.0)],
        )
        .unwrap();
        assert_eq!(result, vec![true, false]);
    }

    #[test]
    fn test_boundary_counts_as_inside() {
        let mask = PolygonMask::new(&square()).unwrap();
        assert!(mask.contains_point(0.0, 5.0));
        assert!(mask.contains_point(10.0, 5.0));
        assert!(mask.contains_point(5.0, 10.0));
        assert!(mask.contains_point(5.0, 0.0));
        assert!(mask.contains_point(10.0, 10.0));
        assert!(mask.contains_point(0.0, 0.0));
        assert!(!mask.contains_point(10.000001, 5.0));
        assert!(!mask.contains_point(MISSING, 5.0));
    }

    #[test]
    fn test_repeated_queries_are_deterministic() {
        let mask = PolygonMask::new(&square()).unwrap();
        let points: Vec<PlanarPoint> = (0..200)
            .map(|i| PlanarPoint::new((i as f64) * 0.37 - 20.0, (i as f64) * 0.11 - 5.0))
            .collect();
        let first = mask.contains(&points);
        let second = mask.contains(&points);
        assert_eq!(first, second);
        assert!(first.iter().any(|&b| b));
        assert!(first.iter().any(|&b| !b));
    }

    #[test]
    fn test_concave_polygon_and_closing_vertex() {
        // U shape, explicitly closed
        let boundary = PolygonBoundary::new(
            "u",
            vec![
                PlanarPoint::new(0.0, 0.0),
                PlanarPoint::new(3.0, 0.0),
                PlanarPoint::new(3.0, 3.0),
                PlanarPoint::new(2.0, 3.0),
                PlanarPoint::new(2.0, 1.0),
                PlanarPoint::new(1.0, 1.0),
                PlanarPoint::new(1.0, 3.0),
                PlanarPoint::new(0.0, 3.0),
                PlanarPoint::new(0.0, 0.0),
            ],
        );
        let mask = PolygonMask::new(&boundary).unwrap();
        assert!(mask.contains_point(0.5, 2.0));
        assert!(mask.contains_point(2.5, 2.0));
        assert!(!mask.contains_point(1.5, 2.0));
        assert!(mask.contains_point(1.5, 0.5));
    }

    #[test]
    fn test_multipart_union() {
        let boundary = PolygonBoundary::with_rings(
            "two-part",
            vec![
                vec![
                    PlanarPoint::new(0.0, 0.0),
                    PlanarPoint::new(1.0, 0.0),
                    PlanarPoint::new(1.0, 1.0),
                ],
                vec![
                    PlanarPoint::new(5.0, 5.0),
                    PlanarPoint::new(6.0, 5.0),
                    PlanarPoint::new(6.0, 6.0),
                    PlanarPoint::new(5.0, 6.0),
                ],
            ],
        );
        let mask = PolygonMask::new(&boundary).unwrap();
        let inside = mask
            .contains_xy(&array![0.8, 5.5, 3.0], &array![0.2, 5.5, 3.0])
            .unwrap();
        assert_eq!(inside, array![true, true, false]);
    }

    #[test]
    fn test_degenerate_ring_rejected() {
        let boundary = PolygonBoundary::new(
            "line",
            vec![
                PlanarPoint::new(0.0, 0.0),
                PlanarPoint::new(1.0, 1.0),
                PlanarPoint::new(0.0, 0.0),
            ],
        );
        assert!(matches!(
            PolygonMask::new(&boundary),
            Err(ShelfError::InvalidGeometry(_))
        ));
    }

    #[test]
    fn test_geographic_outline_and_catalog_lookup() {
        let proj = PolarStereographic::new(ProjectionParams::epsg3031()).unwrap();
        let outline = vec![
            GeoPoint::new(-68.0, 68.0),
            GeoPoint::new(-68.0, 75.0),
            GeoPoint::new(-73.0, 75.0),
            GeoPoint::new(-73.0, 68.0),
        ];
        let amery = PolygonBoundary::from_geographic("Amery", &[outline], &proj)
            .unwrap()
            .with_attribute("TYPE", "FL");
        let grounded = square().with_attribute("TYPE", "GR");

        let catalog: PolygonCatalog = vec![amery, grounded].into_iter().collect();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.find_by_attribute("TYPE", "FL").len(), 1);
        assert!(matches!(
            catalog.get("Ross"),
            Err(ShelfError::UnknownReference { .. })
        ));

        let mask = PolygonMask::new(catalog.get("Amery").unwrap()).unwrap();
        let centre = proj.forward_point(GeoPoint::new(-70.5, 71.5));
        assert!(mask.contains_point(centre.x, centre.y));
        let outside = proj.forward_point(GeoPoint::new(-70.5, 90.0));
        assert!(!mask.contains_point(outside.x, outside.y));
    }
}
