//! Fill-value normalization.
//!
//! Raw geophysical datasets mark absent samples with large sentinel values
//! (`3.4028235e38` in ATL06, `-9999` in many model grids). These are replaced
//! by the missing marker immediately after extraction so that no geometric or
//! arithmetic step ever sees them as real numbers.

use ndarray::{Array, ArrayBase, Data, DataMut, Dimension};
use num_traits::Float;
use serde::{Deserialize, Serialize};

/// Per-dataset description of which raw values are not data
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FillSpec {
    /// Declared `_FillValue` sentinel
    pub fill_value: Option<f64>,
    /// Declared `valid_min` attribute
    pub valid_min: Option<f64>,
    /// Declared `valid_max` attribute
    pub valid_max: Option<f64>,
}

impl FillSpec {
    pub fn fill(fill_value: f64) -> Self {
        Self {
            fill_value: Some(fill_value),
            ..Self::default()
        }
    }

    pub fn with_valid_range(mut self, min: f64, max: f64) -> Self {
        self.valid_min = Some(min);
        self.valid_max = Some(max);
        self
    }

    /// True when `value` should become the missing marker
    pub fn is_fill<A: Float>(&self, value: A) -> bool {
        if value.is_nan() {
            return true;
        }
        if let Some(fill) = self.fill_value.and_then(num_traits::cast::<f64, A>) {
            if value == fill {
                return true;
            }
        }
        if let Some(min) = self.valid_min.and_then(num_traits::cast::<f64, A>) {
            if value < min {
                return true;
            }
        }
        if let Some(max) = self.valid_max.and_then(num_traits::cast::<f64, A>) {
            if value > max {
                return true;
            }
        }
        false
    }
}

/// Replace every element equal to `fill_value` with the missing marker.
///
/// All other elements pass through unchanged. Comparison is exact: the
/// sentinel must be given in the array's own precision.
pub fn normalize<A, S, D>(array: &ArrayBase<S, D>, fill_value: A) -> Array<A, D>
where
    A: Float,
    S: Data<Elem = A>,
    D: Dimension,
{
    array.mapv(|v| if v == fill_value { A::nan() } else { v })
}

/// In-place variant of [`normalize`]; returns the number of replaced elements
pub fn normalize_in_place<A, S, D>(array: &mut ArrayBase<S, D>, fill_value: A) -> usize
where
    A: Float,
    S: DataMut<Elem = A>,
    D: Dimension,
{
    let mut replaced = 0;
    array.map_inplace(|v| {
        if *v == fill_value {
            *v = A::nan();
            replaced += 1;
        }
    });
    replaced
}

/// Apply a full [`FillSpec`] (sentinel and valid range) to an array
pub fn normalize_with_spec<A, S, D>(array: &ArrayBase<S, D>, spec: &FillSpec) -> Array<A, D>
where
    A: Float,
    S: Data<Elem = A>,
    D: Dimension,
{
    let normalized = array.mapv(|v| if spec.is_fill(v) { A::nan() } else { v });
    let missing = normalized.iter().filter(|v| v.is_nan()).count();
    if missing > 0 {
        log::debug!(
            "Normalized {} of {} samples to missing ({:?})",
            missing,
            normalized.len(),
            spec
        );
    }
    normalized
}

/// Widen a normalized single-precision array, keeping missing samples missing
pub fn widen<S, D>(array: &ArrayBase<S, D>) -> Array<f64, D>
where
    S: Data<Elem = f32>,
    D: Dimension,
{
    array.mapv(|v| if v.is_nan() { f64::NAN } else { v as f64 })
}
