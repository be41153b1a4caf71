//! Aggregation of gridded fields into regional time series.
//!
//! Regional means ignore missing cells; a region with no valid cells
//! yields the missing marker. Cumulative change is computed by trapezoidal
//! integration of the mean-removed series.

use crate::core::polygon_mask::PolygonMask;
use crate::io::grid::GridField;
use crate::types::{is_missing, PlanarBounds, ShelfError, ShelfResult, MISSING};
use chrono::{DateTime, Datelike, Timelike, Utc};
use ndarray::{Array1, ArrayBase, Data, Dimension, Ix1, Zip};
use serde::{Deserialize, Serialize};

const SECONDS_PER_DAY: f64 = 86_400.0;
/// Kilograms per gigatonne
const KG_PER_GT: f64 = 1e12;

/// Fractional year of a timestamp, e.g. 2019-07-02T12:00Z → 2019.5
pub fn decimal_year(time: &DateTime<Utc>) -> f64 {
    let year = time.year();
    let leap = (year % 4 == 0 && year % 100 != 0) || year % 400 == 0;
    let days_in_year = if leap { 366.0 } else { 365.0 };
    let seconds = time.num_seconds_from_midnight() as f64 + time.nanosecond() as f64 * 1e-9;
    let day = time.ordinal0() as f64 + seconds / SECONDS_PER_DAY;
    year as f64 + day / days_in_year
}

/// Mean of the valid values, missing when there are none
pub fn mean_ignoring_missing<'a, I>(values: I) -> f64
where
    I: IntoIterator<Item = &'a f64>,
{
    let (sum, count) = values
        .into_iter()
        .filter(|v| !is_missing(**v))
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        MISSING
    } else {
        sum / count as f64
    }
}

/// Mean of `values` over cells whose coordinates fall inside `region`
pub fn spatial_mean<S1, S2, S3, D>(
    values: &ArrayBase<S1, D>,
    x: &ArrayBase<S2, D>,
    y: &ArrayBase<S3, D>,
    region: &PlanarBounds,
) -> ShelfResult<f64>
where
    S1: Data<Elem = f64>,
    S2: Data<Elem = f64>,
    S3: Data<Elem = f64>,
    D: Dimension,
{
    if values.shape() != x.shape() || values.shape() != y.shape() {
        return Err(ShelfError::ShapeMismatch {
            field: "region coordinates".to_string(),
            expected: format!("{:?}", values.shape()),
            found: format!("x {:?}, y {:?}", x.shape(), y.shape()),
        });
    }
    let mut selected = Vec::new();
    Zip::from(values).and(x).and(y).for_each(|&v, &px, &py| {
        if region.contains(px, py) {
            selected.push(v);
        }
    });
    Ok(mean_ignoring_missing(&selected))
}

/// Bounding-box mean of one time slice of `field`
pub fn regional_mean(field: &GridField, t: usize, region: &PlanarBounds) -> ShelfResult<f64> {
    spatial_mean(&field.slice(t)?, &field.x(), &field.y(), region)
}

/// Bounding-box mean of every time slice
pub fn regional_mean_series(field: &GridField, region: &PlanarBounds) -> ShelfResult<Array1<f64>> {
    let series = (0..field.n_times())
        .map(|t| regional_mean(field, t, region))
        .collect::<ShelfResult<Vec<f64>>>()?;
    let valid = series.iter().filter(|v| !is_missing(**v)).count();
    if valid == 0 {
        log::warn!("No valid cells of '{}' inside {:?}", field.name, region);
    }
    Ok(Array1::from_vec(series))
}

/// Mean of every time slice over the cells inside a polygon mask
pub fn masked_mean_series(field: &GridField, mask: &PolygonMask) -> ShelfResult<Array1<f64>> {
    let x = field.x();
    let y = field.y();
    let inside: Vec<(usize, usize)> = x
        .indexed_iter()
        .filter(|&(idx, &px)| mask.contains_point(px, y[idx]))
        .map(|(idx, _)| idx)
        .collect();
    log::debug!(
        "Mask '{}' covers {} cells of '{}'",
        mask.id(),
        inside.len(),
        field.name
    );
    if inside.is_empty() {
        log::warn!("Mask '{}' contains no cells of '{}'", mask.id(), field.name);
    }

    let mut series = Array1::from_elem(field.n_times(), MISSING);
    for (t, out) in series.iter_mut().enumerate() {
        let slice = field.slice(t)?;
        let values: Vec<f64> = inside.iter().map(|&idx| slice[idx]).collect();
        *out = mean_ignoring_missing(&values);
    }
    Ok(series)
}

/// Subtract the mean of the valid values
pub fn remove_mean<S>(series: &ArrayBase<S, Ix1>) -> Array1<f64>
where
    S: Data<Elem = f64>,
{
    let mean = mean_ignoring_missing(series.iter());
    series.mapv(|v| v - mean)
}

/// Running trapezoidal integral, one value per interval (length n − 1).
///
/// A missing sample makes every later value missing.
pub fn cumulative_trapezoid<S1, S2>(series: &ArrayBase<S1, Ix1>, times: &ArrayBase<S2, Ix1>) -> ShelfResult<Array1<f64>>
where
    S1: Data<Elem = f64>,
    S2: Data<Elem = f64>,
{
    check_time_axis(series.len(), times)?;
    let n = series.len();
    let mut out = Array1::zeros(n.saturating_sub(1));
    let mut total = 0.0;
    for i in 1..n {
        total += 0.5 * (times[i] - times[i - 1]) * (series[i] + series[i - 1]);
        out[i - 1] = total;
    }
    Ok(out)
}

/// Cumulative change of a series relative to its mean
pub fn cumulative_integrate<S1, S2>(series: &ArrayBase<S1, Ix1>, times: &ArrayBase<S2, Ix1>) -> ShelfResult<Array1<f64>>
where
    S1: Data<Elem = f64>,
    S2: Data<Elem = f64>,
{
    check_time_axis(series.len(), times)?;
    cumulative_trapezoid(&remove_mean(series), times)
}

fn check_time_axis<S>(n: usize, times: &ArrayBase<S, Ix1>) -> ShelfResult<()>
where
    S: Data<Elem = f64>,
{
    if times.len() != n {
        return Err(ShelfError::shape("times", n, times.len()));
    }
    for i in 1..n {
        if !(times[i] > times[i - 1]) {
            return Err(ShelfError::InvalidTimeAxis(format!(
                "time points must be strictly increasing (index {}: {} after {})",
                i,
                times[i],
                times[i - 1]
            )));
        }
    }
    Ok(())
}

/// Column mass (kg/m²) of an ice column of `thickness` metres
pub fn column_mass(thickness: f64, rho_ice: f64) -> f64 {
    thickness * rho_ice
}

/// Surface mass balance flux (kg m⁻² yr⁻¹) as a height rate (m/yr)
pub fn smb_to_height_rate(smb: f64, density: f64) -> ShelfResult<f64> {
    if !(density.is_finite() && density > 0.0) {
        return Err(ShelfError::DegenerateConfiguration(format!(
            "density must be positive, got {}",
            density
        )));
    }
    Ok(smb / density)
}

/// Mass change (Gt) for a mean height change over an area (m²)
pub fn height_change_to_mass_gt(height_change: f64, area: f64, density: f64) -> f64 {
    height_change * area * density / KG_PER_GT
}

/// Cumulative height change at the end of each integration interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeightChangeSeries {
    /// Decimal years
    pub times: Vec<f64>,
    /// Metres, relative to the mean state of the period
    pub height_change: Vec<f64>,
}

impl HeightChangeSeries {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Mass change (Gt) at each time over `area` m²
    pub fn to_mass_gt(&self, area: f64, density: f64) -> Vec<f64> {
        self.height_change
            .iter()
            .map(|dh| height_change_to_mass_gt(*dh, area, density))
            .collect()
    }
}

/// Height-change series implied by a regional SMB series (kg m⁻² yr⁻¹)
pub fn height_change_from_smb<S1, S2>(
    smb: &ArrayBase<S1, Ix1>,
    times: &ArrayBase<S2, Ix1>,
    density: f64,
) -> ShelfResult<HeightChangeSeries>
where
    S1: Data<Elem = f64>,
    S2: Data<Elem = f64>,
{
    let rates = smb
        .iter()
        .map(|&v| smb_to_height_rate(v, density))
        .collect::<ShelfResult<Array1<f64>>>()?;
    let height_change = cumulative_integrate(&rates, times)?;
    Ok(HeightChangeSeries {
        times: times.iter().skip(1).cloned().collect(),
        height_change: height_change.to_vec(),
    })
}
