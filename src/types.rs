use serde::{Deserialize, Serialize};

/// Universal missing-value marker.
///
/// Every dataset-specific fill value is replaced by `NaN` on extraction.
/// IEEE arithmetic then propagates it: any sum, difference, product or
/// quotient involving a missing operand is itself missing. Comparisons
/// against `NaN` are always false, so code that branches on values must
/// test [`is_missing`] explicitly.
pub const MISSING: f64 = f64::NAN;

/// True when `value` is the missing marker (or any other non-finite value).
#[inline]
pub fn is_missing(value: f64) -> bool {
    !value.is_finite()
}

/// Geographic coordinate in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

/// Planar polar-stereographic coordinate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlanarPoint {
    pub x: f64,
    pub y: f64,
}

impl PlanarPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// A point with a missing coordinate cannot be placed on the plane.
    pub fn is_valid(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Axis-aligned region in planar coordinates (inclusive on all edges)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlanarBounds {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl PlanarBounds {
    pub fn new(min_x: f64, max_x: f64, min_y: f64, max_y: f64) -> Self {
        Self { min_x, max_x, min_y, max_y }
    }

    /// Smallest bounds covering every valid point, `None` if there are none.
    pub fn from_points<'a, I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a PlanarPoint>,
    {
        let mut bounds: Option<Self> = None;
        for p in points.into_iter().filter(|p| p.is_valid()) {
            bounds = Some(match bounds {
                None => Self::new(p.x, p.x, p.y, p.y),
                Some(b) => Self::new(
                    b.min_x.min(p.x),
                    b.max_x.max(p.x),
                    b.min_y.min(p.y),
                    b.max_y.max(p.y),
                ),
            });
        }
        bounds
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Grow the bounds by `margin` on every side
    pub fn expand(&self, margin: f64) -> Self {
        Self::new(
            self.min_x - margin,
            self.max_x + margin,
            self.min_y - margin,
            self.max_y + margin,
        )
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }
}

/// Error types for shelf correction processing
#[derive(Debug, thiserror::Error)]
pub enum ShelfError {
    #[error("Missing field '{field}' in record {record}")]
    MissingField { record: String, field: String },

    #[error("Shape mismatch for '{field}': expected {expected}, found {found}")]
    ShapeMismatch {
        field: String,
        expected: String,
        found: String,
    },

    #[error("Degenerate configuration: {0}")]
    DegenerateConfiguration(String),

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Unknown {kind} '{id}'")]
    UnknownReference { kind: String, id: String },

    #[error("Invalid time axis: {0}")]
    InvalidTimeAxis(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration parse error: {0}")]
    Config(#[from] serde_json::Error),
}

impl ShelfError {
    pub(crate) fn shape(field: &str, expected: usize, found: usize) -> Self {
        ShelfError::ShapeMismatch {
            field: field.to_string(),
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    pub(crate) fn missing_field(record: impl ToString, field: &str) -> Self {
        ShelfError::MissingField {
            record: record.to_string(),
            field: field.to_string(),
        }
    }
}

/// Result type for shelf correction operations
pub type ShelfResult<T> = Result<T, ShelfError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_marker_propagates() {
        assert!(is_missing(MISSING));
        assert!(is_missing(MISSING + 1.0));
        assert!(is_missing(2.0 * MISSING - 3.0));
        assert!(!is_missing(0.0));
    }

    #[test]
    fn test_bounds_from_points_skips_missing() {
        let points = vec![
            PlanarPoint::new(1.0, 2.0),
            PlanarPoint::new(MISSING, 100.0),
            PlanarPoint::new(-3.0, 5.0),
        ];
        let bounds = PlanarBounds::from_points(&points).unwrap();
        assert_eq!(bounds, PlanarBounds::new(-3.0, 1.0, 2.0, 5.0));
        assert!(bounds.contains(1.0, 5.0));
        assert!(!bounds.contains(1.5, 5.0));

        let grown = bounds.expand(1.0);
        assert_eq!(grown.width(), 6.0);
        assert_eq!(grown.height(), 5.0);
    }

    #[test]
    fn test_bounds_of_empty_set() {
        let points: Vec<PlanarPoint> = Vec::new();
        assert!(PlanarBounds::from_points(&points).is_none());
    }
}
