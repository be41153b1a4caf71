use crate::core::fill_value::{normalize_with_spec, FillSpec};
use crate::core::projection::PolarStereographic;
use crate::core::timeseries::mean_ignoring_missing;
use crate::types::{PlanarBounds, PlanarPoint, ShelfError, ShelfResult};
use ndarray::{Array1, Array2, Array3, ArrayView2, Axis};

/// Gridded model field (firn air content, surface mass balance, ...).
///
/// Values are stored as `(time, row, col)`; a field without a time axis
/// has a single time slice. Cell coordinates are always planar: a field
/// delivered on latitude/longitude is projected once at load.
#[derive(Debug, Clone)]
pub struct GridField {
    pub name: String,
    pub units: Option<String>,
    x: Array2<f64>,
    y: Array2<f64>,
    values: Array3<f64>,
    /// Decimal years, strictly increasing
    times: Option<Array1<f64>>,
}

impl GridField {
    pub fn new(
        name: impl Into<String>,
        x: Array2<f64>,
        y: Array2<f64>,
        values: Array3<f64>,
        times: Option<Array1<f64>>,
    ) -> ShelfResult<Self> {
        let name = name.into();
        let (n_times, rows, cols) = values.dim();
        if x.dim() != (rows, cols) || y.dim() != (rows, cols) {
            return Err(ShelfError::ShapeMismatch {
                field: format!("{} coordinates", name),
                expected: format!("{:?}", (rows, cols)),
                found: format!("x {:?}, y {:?}", x.dim(), y.dim()),
            });
        }
        if n_times == 0 {
            return Err(ShelfError::InvalidTimeAxis(format!("grid '{}' has no time slices", name)));
        }
        if let Some(times) = &times {
            if times.len() != n_times {
                return Err(ShelfError::shape(&format!("{} times", name), n_times, times.len()));
            }
            check_increasing(&name, times)?;
        }

        log::debug!(
            "Grid field '{}': {} time slices of {}x{} cells",
            name,
            n_times,
            rows,
            cols
        );
        Ok(Self {
            name,
            units: None,
            x,
            y,
            values,
            times,
        })
    }

    /// Field with a single time slice
    pub fn single(name: impl Into<String>, x: Array2<f64>, y: Array2<f64>, values: Array2<f64>) -> ShelfResult<Self> {
        Self::new(name, x, y, values.insert_axis(Axis(0)), None)
    }

    /// Build cell coordinates from 1-D axes (`x` along columns, `y` along rows)
    pub fn from_axes(
        name: impl Into<String>,
        x_axis: &Array1<f64>,
        y_axis: &Array1<f64>,
        values: Array3<f64>,
        times: Option<Array1<f64>>,
    ) -> ShelfResult<Self> {
        let shape = (y_axis.len(), x_axis.len());
        let x = Array2::from_shape_fn(shape, |(_, i)| x_axis[i]);
        let y = Array2::from_shape_fn(shape, |(j, _)| y_axis[j]);
        Self::new(name, x, y, values, times)
    }

    /// Field delivered on a latitude/longitude mesh
    pub fn from_geographic(
        name: impl Into<String>,
        latitude: ArrayView2<'_, f64>,
        longitude: ArrayView2<'_, f64>,
        values: Array3<f64>,
        times: Option<Array1<f64>>,
        projection: &PolarStereographic,
    ) -> ShelfResult<Self> {
        let (x, y) = projection.forward_array(&latitude, &longitude)?;
        Self::new(name, x, y, values, times)
    }

    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = Some(units.into());
        self
    }

    /// Replace the dataset's fill sentinel (and out-of-range values) with missing
    pub fn normalized(mut self, fill: &FillSpec) -> Self {
        self.values = normalize_with_spec(&self.values, fill);
        self
    }

    pub fn x(&self) -> ArrayView2<'_, f64> {
        self.x.view()
    }

    pub fn y(&self) -> ArrayView2<'_, f64> {
        self.y.view()
    }

    pub fn values(&self) -> &Array3<f64> {
        &self.values
    }

    pub fn times(&self) -> Option<&Array1<f64>> {
        self.times.as_ref()
    }

    pub fn n_times(&self) -> usize {
        self.values.len_of(Axis(0))
    }

    /// `(rows, cols)` of one slice
    pub fn grid_shape(&self) -> (usize, usize) {
        self.x.dim()
    }

    /// Values at time index `t`
    pub fn slice(&self, t: usize) -> ShelfResult<ArrayView2<'_, f64>> {
        if t >= self.n_times() {
            return Err(ShelfError::InvalidTimeAxis(format!(
                "time index {} out of range for '{}' ({} slices)",
                t,
                self.name,
                self.n_times()
            )));
        }
        Ok(self.values.index_axis(Axis(0), t))
    }

    /// Index of the slice closest to `time` (decimal years); ties go to the earlier slice
    pub fn nearest_time_index(&self, time: f64) -> ShelfResult<usize> {
        let times = self.times.as_ref().ok_or_else(|| {
            ShelfError::InvalidTimeAxis(format!("grid '{}' has no time axis", self.name))
        })?;
        if !time.is_finite() {
            return Err(ShelfError::InvalidTimeAxis(format!(
                "cannot select a slice of '{}' for a missing time",
                self.name
            )));
        }
        let mut best = 0;
        for (i, t) in times.iter().enumerate() {
            if (t - time).abs() < (times[best] - time).abs() {
                best = i;
            }
        }
        Ok(best)
    }

    /// Per-cell mean over time, ignoring missing values
    pub fn time_mean(&self) -> Array2<f64> {
        self.values
            .map_axis(Axis(0), |lane| mean_ignoring_missing(lane.iter()))
    }

    /// Extent of the valid cell coordinates
    pub fn bounds(&self) -> Option<PlanarBounds> {
        let points: Vec<PlanarPoint> = self
            .x
            .iter()
            .zip(self.y.iter())
            .map(|(&x, &y)| PlanarPoint::new(x, y))
            .collect();
        PlanarBounds::from_points(&points)
    }
}

fn check_increasing(name: &str, times: &Array1<f64>) -> ShelfResult<()> {
    if let Some(t) = times.iter().find(|t| !t.is_finite()) {
        return Err(ShelfError::InvalidTimeAxis(format!(
            "grid '{}' has a missing time point ({})",
            name, t
        )));
    }
    for (i, pair) in times.windows(2).into_iter().enumerate() {
        if pair[1] <= pair[0] {
            return Err(ShelfError::InvalidTimeAxis(format!(
                "grid '{}' time axis is not strictly increasing at index {}",
                name,
                i + 1
            )));
        }
    }
    Ok(())
}
