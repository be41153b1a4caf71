use crate::core::fill_value::{normalize_with_spec, FillSpec};
use crate::types::{ShelfError, ShelfResult, MISSING};
use chrono::{DateTime, Utc};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// ATL06 dataset names consumed from each beam group
pub mod fields {
    pub const H_LI: &str = "h_li";
    pub const LATITUDE: &str = "latitude";
    pub const LONGITUDE: &str = "longitude";
    pub const QUALITY: &str = "atl06_quality_summary";
    pub const GEOID: &str = "geoid_h";
    pub const TIDE_OCEAN: &str = "tide_ocean";
    pub const TIDE_LOAD: &str = "tide_load";
    pub const DAC: &str = "dac";
    pub const DELTA_TIME: &str = "delta_time";
    pub const MODEL_TIDE: &str = "model_tide";
}

/// Left or right beam of a ground-track pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BeamSide {
    Left,
    Right,
}

/// Identifies one beam of one granule, e.g. `ATL06_20190102..._gt2l`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BeamId {
    pub granule: String,
    /// Ground-track pair, 1..=3
    pub pair: u8,
    pub side: BeamSide,
}

impl BeamId {
    pub fn new(granule: impl Into<String>, pair: u8, side: BeamSide) -> ShelfResult<Self> {
        if !(1..=3).contains(&pair) {
            return Err(ShelfError::InvalidIdentifier(format!(
                "ground-track pair {} is not in 1..=3",
                pair
            )));
        }
        Ok(Self {
            granule: granule.into(),
            pair,
            side,
        })
    }

    /// Parse a beam group name such as `gt1l` or `gt3r`
    pub fn parse(granule: impl Into<String>, beam: &str) -> ShelfResult<Self> {
        let lower = beam.to_lowercase();
        let invalid = || ShelfError::InvalidIdentifier(format!("invalid beam name: {}", beam));
        let rest = lower.strip_prefix("gt").ok_or_else(invalid)?;
        let mut chars = rest.chars();
        let pair = chars
            .next()
            .and_then(|c| c.to_digit(10))
            .ok_or_else(invalid)? as u8;
        let side = match chars.next() {
            Some('l') => BeamSide::Left,
            Some('r') => BeamSide::Right,
            _ => return Err(invalid()),
        };
        if chars.next().is_some() {
            return Err(invalid());
        }
        Self::new(granule, pair, side)
    }

    /// Beam group name (`gt1l` ... `gt3r`)
    pub fn beam_name(&self) -> String {
        let side = match self.side {
            BeamSide::Left => 'l',
            BeamSide::Right => 'r',
        };
        format!("gt{}{}", self.pair, side)
    }
}

impl std::fmt::Display for BeamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.granule, self.beam_name())
    }
}

/// One raw dataset as extracted from a granule, before normalization
#[derive(Debug, Clone, PartialEq)]
pub struct RawField {
    pub values: Vec<f64>,
    pub fill: FillSpec,
}

impl RawField {
    pub fn new(values: Vec<f64>, fill_value: Option<f64>) -> Self {
        Self {
            values,
            fill: FillSpec {
                fill_value,
                ..FillSpec::default()
            },
        }
    }

    pub fn with_fill_spec(values: Vec<f64>, fill: FillSpec) -> Self {
        Self { values, fill }
    }
}

/// Raw per-beam datasets keyed by dataset name
#[derive(Debug, Clone)]
pub struct RawBeam {
    pub id: BeamId,
    pub fields: HashMap<String, RawField>,
}

impl RawBeam {
    pub fn new(id: BeamId) -> Self {
        Self {
            id,
            fields: HashMap::new(),
        }
    }

    /// Raw beam from in-memory datasets sharing one fill sentinel.
    ///
    /// The quality summary is an integer flag with its own sentinel, given
    /// by `quality_fill`.
    pub fn from_arrays<'a, I>(id: BeamId, arrays: I, fill_value: Option<f64>, quality_fill: Option<f64>) -> Self
    where
        I: IntoIterator<Item = (&'a str, Vec<f64>)>,
    {
        let mut raw = Self::new(id);
        for (name, values) in arrays {
            let fill = if name == fields::QUALITY { quality_fill } else { fill_value };
            raw.insert(name, values, fill);
        }
        raw
    }

    pub fn insert(&mut self, name: &str, values: Vec<f64>, fill_value: Option<f64>) -> &mut Self {
        self.fields.insert(name.to_string(), RawField::new(values, fill_value));
        self
    }

    pub fn insert_field(&mut self, name: &str, field: RawField) -> &mut Self {
        self.fields.insert(name.to_string(), field);
        self
    }
}

/// Start of the ATLAS standard data product clock, 2018-01-01T00:00:00Z,
/// as Unix seconds. Leap seconds since then are not applied.
pub const ATLAS_EPOCH_UNIX_SECONDS: i64 = 1_514_764_800;

/// Convert an ATL06 `delta_time` to a UTC timestamp; missing stays `None`
pub fn delta_time_to_datetime(delta_time: f64) -> Option<DateTime<Utc>> {
    if !delta_time.is_finite() || delta_time.abs() > 1e15 {
        return None;
    }
    let whole = delta_time.floor();
    let nanos = ((delta_time - whole) * 1e9).round().min(999_999_999.0) as u32;
    let seconds = ATLAS_EPOCH_UNIX_SECONDS.checked_add(whole as i64)?;
    DateTime::from_timestamp(seconds, nanos)
}

/// Per-beam record of parallel sample sequences.
///
/// Every sequence has the same length and index `i` refers to the same
/// physical sample in all of them. Input fields are normalized on
/// construction; derived fields start out missing (`false` for the
/// floating mask) and are filled in place by the correction pipeline.
#[derive(Debug, Clone)]
pub struct BeamRecord {
    pub id: BeamId,

    pub h_li: Array1<f64>,
    pub latitude: Array1<f64>,
    pub longitude: Array1<f64>,
    pub quality: Array1<f64>,
    pub geoid_h: Array1<f64>,
    pub tide_ocean: Option<Array1<f64>>,
    pub tide_load: Option<Array1<f64>>,
    pub dac: Option<Array1<f64>>,
    pub delta_time: Option<Array1<f64>>,
    /// Externally computed replacement tide (e.g. from CATS2008)
    pub model_tide: Option<Array1<f64>>,

    /// Height after quality filtering and tide re-referencing
    pub h_corrected: Array1<f64>,
    pub x: Array1<f64>,
    pub y: Array1<f64>,
    pub floating: Array1<bool>,
    pub firn_air_content: Array1<f64>,
    pub h_msl: Array1<f64>,
    pub thickness: Array1<f64>,
}

impl BeamRecord {
    /// Assemble a record from already normalized arrays
    pub fn new(
        id: BeamId,
        h_li: Array1<f64>,
        latitude: Array1<f64>,
        longitude: Array1<f64>,
        quality: Array1<f64>,
        geoid_h: Array1<f64>,
    ) -> ShelfResult<Self> {
        let n = h_li.len();
        for (name, array) in [
            (fields::LATITUDE, &latitude),
            (fields::LONGITUDE, &longitude),
            (fields::QUALITY, &quality),
            (fields::GEOID, &geoid_h),
        ] {
            if array.len() != n {
                return Err(ShelfError::shape(name, n, array.len()));
            }
        }

        Ok(Self {
            id,
            h_li,
            latitude,
            longitude,
            quality,
            geoid_h,
            tide_ocean: None,
            tide_load: None,
            dac: None,
            delta_time: None,
            model_tide: None,
            h_corrected: Array1::from_elem(n, MISSING),
            x: Array1::from_elem(n, MISSING),
            y: Array1::from_elem(n, MISSING),
            floating: Array1::from_elem(n, false),
            firn_air_content: Array1::from_elem(n, MISSING),
            h_msl: Array1::from_elem(n, MISSING),
            thickness: Array1::from_elem(n, MISSING),
        })
    }

    /// Extract a record from raw datasets, normalizing each field's fill
    /// values before anything else touches it
    pub fn from_raw(raw: RawBeam) -> ShelfResult<Self> {
        let RawBeam { id, mut fields } = raw;
        log::debug!("Extracting beam record {} ({} datasets)", id, fields.len());

        let mut required = |name: &str| -> ShelfResult<Array1<f64>> {
            let field = fields
                .remove(name)
                .ok_or_else(|| ShelfError::missing_field(&id, name))?;
            Ok(normalize_field(field))
        };
        let h_li = required(fields::H_LI)?;
        let latitude = required(fields::LATITUDE)?;
        let longitude = required(fields::LONGITUDE)?;
        let quality = required(fields::QUALITY)?;
        let geoid_h = required(fields::GEOID)?;

        let mut record = Self::new(id, h_li, latitude, longitude, quality, geoid_h)?;
        let n = record.len();
        let mut optional = |name: &str| -> ShelfResult<Option<Array1<f64>>> {
            match fields.remove(name) {
                Some(field) => {
                    let values = normalize_field(field);
                    if values.len() != n {
                        return Err(ShelfError::shape(name, n, values.len()));
                    }
                    Ok(Some(values))
                }
                None => Ok(None),
            }
        };
        record.tide_ocean = optional(fields::TIDE_OCEAN)?;
        record.tide_load = optional(fields::TIDE_LOAD)?;
        record.dac = optional(fields::DAC)?;
        record.delta_time = optional(fields::DELTA_TIME)?;
        record.model_tide = optional(fields::MODEL_TIDE)?;

        if !fields.is_empty() {
            let mut ignored: Vec<&String> = fields.keys().collect();
            ignored.sort();
            log::debug!("Ignoring unused datasets for {}: {:?}", record.id, ignored);
        }
        Ok(record)
    }

    pub fn len(&self) -> usize {
        self.h_li.len()
    }

    pub fn is_empty(&self) -> bool {
        self.h_li.is_empty()
    }

    /// Check the parallel-sequence invariant over every field
    pub fn validate(&self) -> ShelfResult<()> {
        let n = self.len();
        let required = [
            (fields::LATITUDE, self.latitude.len()),
            (fields::LONGITUDE, self.longitude.len()),
            (fields::QUALITY, self.quality.len()),
            (fields::GEOID, self.geoid_h.len()),
            ("h_corrected", self.h_corrected.len()),
            ("x", self.x.len()),
            ("y", self.y.len()),
            ("floating", self.floating.len()),
            ("firn_air_content", self.firn_air_content.len()),
            ("h_msl", self.h_msl.len()),
            ("thickness", self.thickness.len()),
        ];
        for (name, len) in required {
            if len != n {
                return Err(ShelfError::shape(name, n, len));
            }
        }
        let optional = [
            (fields::TIDE_OCEAN, &self.tide_ocean),
            (fields::TIDE_LOAD, &self.tide_load),
            (fields::DAC, &self.dac),
            (fields::DELTA_TIME, &self.delta_time),
            (fields::MODEL_TIDE, &self.model_tide),
        ];
        for (name, array) in optional {
            if let Some(array) = array {
                if array.len() != n {
                    return Err(ShelfError::shape(name, n, array.len()));
                }
            }
        }
        Ok(())
    }

    /// Borrow an optional field, failing when it was never extracted
    pub fn require(&self, name: &str) -> ShelfResult<&Array1<f64>> {
        let field = match name {
            fields::TIDE_OCEAN => self.tide_ocean.as_ref(),
            fields::TIDE_LOAD => self.tide_load.as_ref(),
            fields::DAC => self.dac.as_ref(),
            fields::DELTA_TIME => self.delta_time.as_ref(),
            fields::MODEL_TIDE => self.model_tide.as_ref(),
            _ => None,
        };
        field.ok_or_else(|| ShelfError::missing_field(&self.id, name))
    }

    /// Mean acquisition time of the valid samples
    pub fn mean_acquisition_time(&self) -> Option<DateTime<Utc>> {
        let delta_time = self.delta_time.as_ref()?;
        let valid: Vec<f64> = delta_time.iter().cloned().filter(|t| t.is_finite()).collect();
        if valid.is_empty() {
            return None;
        }
        delta_time_to_datetime(valid.iter().sum::<f64>() / valid.len() as f64)
    }
}

fn normalize_field(field: RawField) -> Array1<f64> {
    normalize_with_spec(&Array1::from_vec(field.values), &field.fill)
}
