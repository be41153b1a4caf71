use crate::core::triangulation::Triangulation;
use crate::types::{PlanarBounds, PlanarPoint, ShelfError, ShelfResult, MISSING};
use ndarray::{Array1, ArrayBase, ArrayView2, Data, Ix1, Zip};

/// Linear interpolation from scattered source samples onto query points.
///
/// Source samples with a missing value are excluded before triangulating,
/// so a gap in the source field shrinks the interpolation domain instead of
/// poisoning neighbouring triangles. Queries outside the convex hull of the
/// remaining sources are missing; nothing is extrapolated.
#[derive(Debug, Clone)]
pub struct ScatteredInterpolator {
    triangulation: Triangulation,
    values: Vec<f64>,
}

impl ScatteredInterpolator {
    pub fn new(points: &[PlanarPoint], values: &[f64]) -> ShelfResult<Self> {
        if points.len() != values.len() {
            return Err(ShelfError::shape("source_values", points.len(), values.len()));
        }

        let (kept_points, kept_values): (Vec<PlanarPoint>, Vec<f64>) = points
            .iter()
            .zip(values.iter())
            .filter(|(p, v)| p.is_valid() && v.is_finite())
            .map(|(p, v)| (*p, *v))
            .unzip();

        let triangulation = Triangulation::new(&kept_points);
        if triangulation.is_empty() {
            log::warn!(
                "No triangles from {} valid source samples; every query will be missing",
                kept_points.len()
            );
        }
        Ok(Self {
            triangulation,
            values: kept_values,
        })
    }

    /// Build from a gridded field, keeping only cells inside `subset`.
    ///
    /// The bounding-box prefilter limits the triangulation to the region of
    /// interest and keeps unrelated regions from contaminating it.
    pub fn from_grid(
        x: ArrayView2<'_, f64>,
        y: ArrayView2<'_, f64>,
        values: ArrayView2<'_, f64>,
        subset: Option<&PlanarBounds>,
    ) -> ShelfResult<Self> {
        if x.dim() != values.dim() || y.dim() != values.dim() {
            return Err(ShelfError::ShapeMismatch {
                field: "grid coordinates".to_string(),
                expected: format!("{:?}", values.dim()),
                found: format!("x {:?}, y {:?}", x.dim(), y.dim()),
            });
        }

        let mut points = Vec::new();
        let mut kept = Vec::new();
        Zip::from(&x).and(&y).and(&values).for_each(|&px, &py, &v| {
            if subset.map_or(true, |b| b.contains(px, py)) {
                points.push(PlanarPoint::new(px, py));
                kept.push(v);
            }
        });
        log::debug!(
            "Grid subset kept {} of {} source cells",
            points.len(),
            values.len()
        );
        Self::new(&points, &kept)
    }

    /// Number of source samples that took part in the triangulation
    pub fn source_count(&self) -> usize {
        self.triangulation.vertex_count()
    }

    pub fn triangulation(&self) -> &Triangulation {
        &self.triangulation
    }

    pub fn interpolate_point(&self, query: PlanarPoint) -> f64 {
        match self.triangulation.locate(query) {
            Some(hit) => hit
                .vertices
                .iter()
                .zip(hit.weights.iter())
                .map(|(&v, &w)| self.values[v] * w)
                .sum(),
            None => MISSING,
        }
    }

    pub fn interpolate(&self, queries: &[PlanarPoint]) -> Vec<f64> {
        queries.iter().map(|q| self.interpolate_point(*q)).collect()
    }

    /// Interpolate at parallel x/y arrays
    pub fn interpolate_xy<S1, S2>(&self, x: &ArrayBase<S1, Ix1>, y: &ArrayBase<S2, Ix1>) -> ShelfResult<Array1<f64>>
    where
        S1: Data<Elem = f64>,
        S2: Data<Elem = f64>,
    {
        if x.len() != y.len() {
            return Err(ShelfError::shape("y", x.len(), y.len()));
        }
        let mut out = Array1::from_elem(x.len(), MISSING);
        Zip::from(&mut out)
            .and(x)
            .and(y)
            .for_each(|out, &px, &py| *out = self.interpolate_point(PlanarPoint::new(px, py)));
        Ok(out)
    }
}

/// One-shot interpolation of `source_values` at `query_points`
pub fn interpolate(
    source_points: &[PlanarPoint],
    source_values: &[f64],
    query_points: &[PlanarPoint],
) -> ShelfResult<Vec<f64>> {
    Ok(ScatteredInterpolator::new(source_points, source_values)?.interpolate(query_points))
}
