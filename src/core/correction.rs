use crate::core::interpolation::ScatteredInterpolator;
use crate::core::polygon_mask::PolygonMask;
use crate::core::projection::{PlanarUnit, PolarStereographic};
use crate::io::beam::{fields, BeamId, BeamRecord};
use crate::io::config::PipelineConfig;
use crate::io::reference::ReferenceData;
use crate::types::{is_missing, PlanarBounds, ShelfError, ShelfResult, MISSING};
use ndarray::{Array1, ArrayBase, Data, Ix1, Zip};
use serde::{Deserialize, Serialize};

/// Default density of glacial ice (kg/m³)
pub const RHO_ICE: f64 = 917.0;
/// Default density of sea water (kg/m³)
pub const RHO_OCEAN: f64 = 1028.0;

/// Which of the distributed geophysical corrections to undo or replace.
///
/// ATL06 heights arrive with ocean tide, load tide and the dynamic
/// atmosphere correction already removed. Restoring a term adds it back;
/// a model tide attached to the record is subtracted instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TideCorrection {
    pub restore_ocean_tide: bool,
    pub restore_load_tide: bool,
    pub restore_dac: bool,
    pub apply_model_tide: bool,
}

impl TideCorrection {
    /// Record fields required by this selection
    pub fn required_fields(&self) -> Vec<&'static str> {
        let mut required = Vec::new();
        if self.restore_ocean_tide {
            required.push(fields::TIDE_OCEAN);
        }
        if self.restore_load_tide {
            required.push(fields::TIDE_LOAD);
        }
        if self.restore_dac {
            required.push(fields::DAC);
        }
        if self.apply_model_tide {
            required.push(fields::MODEL_TIDE);
        }
        required
    }
}

/// Physical constants and switches for the per-sample corrections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrectionParams {
    /// Regional mean dynamic topography offset (m)
    pub mdt_correction: f64,
    /// Ice density (kg/m³)
    pub rho_ice: f64,
    /// Ocean density (kg/m³)
    pub rho_ocean: f64,
    /// Largest `atl06_quality_summary` value still accepted
    pub max_quality_flag: f64,
    pub tides: TideCorrection,
    /// Report thickness only for samples over floating ice
    pub floating_only: bool,
}

impl Default for CorrectionParams {
    fn default() -> Self {
        Self {
            mdt_correction: 0.0,
            rho_ice: RHO_ICE,
            rho_ocean: RHO_OCEAN,
            max_quality_flag: 0.0,
            tides: TideCorrection::default(),
            floating_only: true,
        }
    }
}

impl CorrectionParams {
    pub fn validate(&self) -> ShelfResult<()> {
        if !self.mdt_correction.is_finite() {
            return Err(ShelfError::DegenerateConfiguration(format!(
                "mdt_correction must be finite, got {}",
                self.mdt_correction
            )));
        }
        hydrostatic_factor(self.rho_ice, self.rho_ocean).map(|_| ())
    }
}

/// `(1/ρ_ice − 1/ρ_ocean)^(−1) / ρ_ice`, the freeboard-to-thickness factor
pub fn hydrostatic_factor(rho_ice: f64, rho_ocean: f64) -> ShelfResult<f64> {
    if !(rho_ice.is_finite() && rho_ice > 0.0 && rho_ocean.is_finite() && rho_ocean > 0.0) {
        return Err(ShelfError::DegenerateConfiguration(format!(
            "densities must be positive, got rho_ice={} rho_ocean={}",
            rho_ice, rho_ocean
        )));
    }
    if rho_ice == rho_ocean {
        return Err(ShelfError::DegenerateConfiguration(format!(
            "rho_ice equals rho_ocean ({}); hydrostatic thickness is undefined",
            rho_ice
        )));
    }
    if rho_ice > rho_ocean {
        return Err(ShelfError::DegenerateConfiguration(format!(
            "rho_ice ({}) exceeds rho_ocean ({}); ice cannot float",
            rho_ice, rho_ocean
        )));
    }
    Ok(1.0 / (1.0 / rho_ice - 1.0 / rho_ocean) / rho_ice)
}

/// Ice-shelf thickness from hydrostatic equilibrium.
///
/// `thickness = (1/ρ_ice − 1/ρ_ocean)^(−1) × (h_msl − firn_air_content) / ρ_ice`.
/// A missing height or firn value gives a missing thickness.
pub fn hydrostatic_thickness(h_msl: f64, firn_air_content: f64, rho_ice: f64, rho_ocean: f64) -> ShelfResult<f64> {
    Ok(hydrostatic_factor(rho_ice, rho_ocean)? * (h_msl - firn_air_content))
}

/// `h_msl = h − mdt_correction − geoid_height`
pub fn height_above_msl(height: f64, mdt_correction: f64, geoid_height: f64) -> f64 {
    height - mdt_correction - geoid_height
}

/// Time slice of a gridded firn product to sample
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FirnEpoch {
    /// Explicit time index
    Index(usize),
    /// Slice closest to a decimal year
    Nearest(f64),
    /// Mean over all slices
    #[default]
    TimeMean,
}

/// Margin around the shelf bounds used when a grid source names none (metres)
pub const DEFAULT_FIRN_BUFFER_METERS: f64 = 50_000.0;

/// Where firn air content comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FirnSource {
    /// A named grid from the reference data, subset to the shelf bounds
    /// grown by `buffer` planar units. Without a buffer the margin is
    /// [`DEFAULT_FIRN_BUFFER_METERS`] in the projection's unit.
    Grid {
        name: String,
        #[serde(default)]
        epoch: FirnEpoch,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        buffer: Option<f64>,
    },
    /// Uniform firn air content (m)
    Constant(f64),
}

impl FirnSource {
    pub fn validate(&self) -> ShelfResult<()> {
        match self {
            FirnSource::Grid {
                buffer: Some(buffer), ..
            } if !(buffer.is_finite() && *buffer >= 0.0) => {
                Err(ShelfError::DegenerateConfiguration(format!(
                    "firn grid buffer must be non-negative, got {}",
                    buffer
                )))
            }
            FirnSource::Constant(value) if !value.is_finite() => Err(ShelfError::DegenerateConfiguration(
                "constant firn air content must be finite".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

/// Firn air content ready for sampling at planar locations
#[derive(Debug, Clone)]
pub enum FirnModel {
    Constant(f64),
    Interpolated(ScatteredInterpolator),
}

impl FirnModel {
    /// Resolve `source` against the reference data.
    ///
    /// Grid sources are triangulated only inside `region` grown by the
    /// source's buffer, with `region` in `unit` planar coordinates.
    pub fn from_source(
        source: &FirnSource,
        reference: &ReferenceData,
        region: &PlanarBounds,
        unit: PlanarUnit,
    ) -> ShelfResult<Self> {
        source.validate()?;
        match source {
            FirnSource::Constant(value) => Ok(FirnModel::Constant(*value)),
            FirnSource::Grid { name, epoch, buffer } => {
                let grid = reference.grid(name)?;
                let buffer = buffer.unwrap_or(DEFAULT_FIRN_BUFFER_METERS * unit.per_meter());
                let subset = region.expand(buffer);
                let x = grid.x();
                let y = grid.y();
                let interpolator = match epoch {
                    FirnEpoch::Index(t) => ScatteredInterpolator::from_grid(x, y, grid.slice(*t)?, Some(&subset))?,
                    FirnEpoch::Nearest(year) => {
                        let t = grid.nearest_time_index(*year)?;
                        ScatteredInterpolator::from_grid(x, y, grid.slice(t)?, Some(&subset))?
                    }
                    FirnEpoch::TimeMean => {
                        let mean = grid.time_mean();
                        ScatteredInterpolator::from_grid(x, y, mean.view(), Some(&subset))?
                    }
                };
                log::info!(
                    "Firn grid '{}' ({:?}): {} source cells inside the shelf subset",
                    name,
                    epoch,
                    interpolator.source_count()
                );
                Ok(FirnModel::Interpolated(interpolator))
            }
        }
    }

    /// Firn air content at each planar location; missing locations stay missing
    pub fn sample<S1, S2>(&self, x: &ArrayBase<S1, Ix1>, y: &ArrayBase<S2, Ix1>) -> ShelfResult<Array1<f64>>
    where
        S1: Data<Elem = f64>,
        S2: Data<Elem = f64>,
    {
        match self {
            FirnModel::Interpolated(interpolator) => interpolator.interpolate_xy(x, y),
            FirnModel::Constant(value) => {
                if x.len() != y.len() {
                    return Err(ShelfError::shape("y", x.len(), y.len()));
                }
                Ok(Zip::from(x).and(y).map_collect(|&px, &py| {
                    if is_missing(px) || is_missing(py) {
                        MISSING
                    } else {
                        *value
                    }
                }))
            }
        }
    }
}

/// Per-record outcome counts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeamSummary {
    pub id: BeamId,
    pub samples: usize,
    /// Samples whose corrected height survived quality filtering
    pub valid_heights: usize,
    pub floating: usize,
    pub valid_thickness: usize,
    /// Mean of the valid thickness values, missing if there are none
    pub mean_thickness: f64,
}

impl BeamSummary {
    pub fn floating_fraction(&self) -> f64 {
        if self.samples == 0 {
            return 0.0;
        }
        self.floating as f64 / self.samples as f64
    }
}

/// Shelf correction processor.
///
/// Holds the read-only reference state (projection, shelf mask, firn
/// interpolator) and enriches beam records in place.
#[derive(Debug, Clone)]
pub struct CorrectionPipeline {
    params: CorrectionParams,
    projection: PolarStereographic,
    mask: PolygonMask,
    firn: FirnModel,
    thickness_factor: f64,
}

impl CorrectionPipeline {
    /// Build a pipeline from a validated configuration and loaded reference data
    pub fn new(config: &PipelineConfig, reference: &ReferenceData) -> ShelfResult<Self> {
        config.validate()?;
        let projection = PolarStereographic::new(config.projection)?;
        let mask = reference.shelf_mask(&config.shelf_polygon)?;
        let firn = FirnModel::from_source(&config.firn, reference, &mask.bounds(), config.projection.unit)?;
        Self::from_parts(config.correction.clone(), projection, mask, firn)
    }

    pub fn from_parts(
        params: CorrectionParams,
        projection: PolarStereographic,
        mask: PolygonMask,
        firn: FirnModel,
    ) -> ShelfResult<Self> {
        params.validate()?;
        let thickness_factor = hydrostatic_factor(params.rho_ice, params.rho_ocean)?;

        log::info!(
            "Correction pipeline for shelf '{}' ({} hemisphere)",
            mask.id(),
            projection.params().hemisphere
        );
        log::debug!("Correction parameters: {:?}", params);
        log::debug!("Hydrostatic factor: {:.4}", thickness_factor);

        Ok(Self {
            params,
            projection,
            mask,
            firn,
            thickness_factor,
        })
    }

    pub fn params(&self) -> &CorrectionParams {
        &self.params
    }

    pub fn mask(&self) -> &PolygonMask {
        &self.mask
    }

    pub fn projection(&self) -> &PolarStereographic {
        &self.projection
    }

    /// Run every correction stage over one record.
    ///
    /// Record-level problems (absent or mismatched fields) fail before
    /// anything is modified. Out-of-domain samples become missing.
    pub fn process(&self, record: &mut BeamRecord) -> ShelfResult<BeamSummary> {
        record.validate()?;
        for name in self.params.tides.required_fields() {
            record.require(name)?;
        }
        log::debug!("Processing {} ({} samples)", record.id, record.len());

        let max_flag = self.params.max_quality_flag;
        let h_filtered = Zip::from(&record.h_li)
            .and(&record.quality)
            .map_collect(|&h, &q| if is_missing(q) || q > max_flag { MISSING } else { h });

        let mut h_corrected = h_filtered.clone();
        let tides = self.params.tides;
        if tides.restore_ocean_tide {
            h_corrected += record.require(fields::TIDE_OCEAN)?;
        }
        if tides.restore_load_tide {
            h_corrected += record.require(fields::TIDE_LOAD)?;
        }
        if tides.restore_dac {
            h_corrected += record.require(fields::DAC)?;
        }
        if tides.apply_model_tide {
            h_corrected -= record.require(fields::MODEL_TIDE)?;
        }

        let (x, y) = self.projection.forward_array(&record.latitude, &record.longitude)?;
        let floating = self.mask.contains_xy(&x, &y)?;
        let firn_air_content = self.firn.sample(&x, &y)?;

        let mdt = self.params.mdt_correction;
        let h_msl = Zip::from(&h_corrected)
            .and(&record.geoid_h)
            .map_collect(|&h, &geoid| height_above_msl(h, mdt, geoid));

        let factor = self.thickness_factor;
        let floating_only = self.params.floating_only;
        let thickness = Zip::from(&h_msl)
            .and(&firn_air_content)
            .and(&floating)
            .map_collect(|&h, &fac, &is_floating| {
                if floating_only && !is_floating {
                    MISSING
                } else {
                    factor * (h - fac)
                }
            });

        record.h_li = h_filtered;
        record.h_corrected = h_corrected;
        record.x = x;
        record.y = y;
        record.floating = floating;
        record.firn_air_content = firn_air_content;
        record.h_msl = h_msl;
        record.thickness = thickness;

        let summary = summarize(record);
        if summary.floating == 0 {
            log::warn!("{}: no samples over floating ice of '{}'", record.id, self.mask.id());
        }
        log::info!(
            "{}: {}/{} valid heights, {:.1}% floating, {} thickness values (mean {:.1} m)",
            summary.id,
            summary.valid_heights,
            summary.samples,
            summary.floating_fraction() * 100.0,
            summary.valid_thickness,
            summary.mean_thickness
        );
        Ok(summary)
    }

    /// Process a batch of independent records; the first fatal error aborts the batch
    pub fn process_all(&self, records: &mut [BeamRecord]) -> ShelfResult<Vec<BeamSummary>> {
        log::info!("Processing {} beam records", records.len());

        #[cfg(feature = "parallel")]
        let summaries = {
            use rayon::prelude::*;
            records
                .par_iter_mut()
                .map(|record| self.process(record))
                .collect::<ShelfResult<Vec<_>>>()?
        };
        #[cfg(not(feature = "parallel"))]
        let summaries = records
            .iter_mut()
            .map(|record| self.process(record))
            .collect::<ShelfResult<Vec<_>>>()?;

        Ok(summaries)
    }
}

fn summarize(record: &BeamRecord) -> BeamSummary {
    let valid: Vec<f64> = record.thickness.iter().cloned().filter(|t| !is_missing(*t)).collect();
    let mean_thickness = if valid.is_empty() {
        MISSING
    } else {
        valid.iter().sum::<f64>() / valid.len() as f64
    };
    BeamSummary {
        id: record.id.clone(),
        samples: record.len(),
        valid_heights: record.h_corrected.iter().filter(|h| !is_missing(**h)).count(),
        floating: record.floating.iter().filter(|f| **f).count(),
        valid_thickness: valid.len(),
        mean_thickness,
    }
}
