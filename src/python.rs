//! Python bindings

use crate::core::correction::{self, CorrectionPipeline};
use crate::core::polygon_mask::PolygonBoundary;
use crate::core::timeseries;
use crate::io::beam::{fields, BeamId, BeamRecord, RawBeam};
use crate::io::config::PipelineConfig;
use crate::io::grid::GridField;
use crate::io::reference::ReferenceData;
use crate::types::{PlanarPoint, ShelfError};
use numpy::{IntoPyArray, PyArray1, PyReadonlyArray1, PyReadonlyArray2, PyReadonlyArray3};
use pyo3::exceptions::{PyKeyError, PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyDict;

impl From<ShelfError> for PyErr {
    fn from(err: ShelfError) -> PyErr {
        match err {
            ShelfError::UnknownReference { .. } | ShelfError::MissingField { .. } => {
                PyKeyError::new_err(err.to_string())
            }
            ShelfError::Io(_) => PyRuntimeError::new_err(err.to_string()),
            _ => PyValueError::new_err(err.to_string()),
        }
    }
}

#[pymodule]
fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_class::<PyReferenceData>()?;
    m.add_class::<PyCorrectionPipeline>()?;
    m.add_function(wrap_pyfunction!(hydrostatic_thickness, m)?)?;
    m.add_function(wrap_pyfunction!(cumulative_integrate, m)?)?;
    Ok(())
}

/// Python wrapper for ReferenceData
#[pyclass(name = "ReferenceData")]
#[derive(Default)]
struct PyReferenceData {
    inner: ReferenceData,
}

#[pymethods]
impl PyReferenceData {
    #[new]
    fn new() -> Self {
        Self::default()
    }

    /// Register a single-ring shelf outline given in planar coordinates
    fn add_polygon(&mut self, id: String, x: Vec<f64>, y: Vec<f64>) -> PyResult<()> {
        if x.len() != y.len() {
            return Err(ShelfError::shape("y", x.len(), y.len()).into());
        }
        let vertices = x.into_iter().zip(y).map(|(x, y)| PlanarPoint::new(x, y)).collect();
        self.inner.insert_polygon(PolygonBoundary::new(id, vertices));
        Ok(())
    }

    #[pyo3(signature = (name, x, y, values, times=None, fill_value=None))]
    fn add_grid(
        &mut self,
        name: String,
        x: PyReadonlyArray2<f64>,
        y: PyReadonlyArray2<f64>,
        values: PyReadonlyArray3<f64>,
        times: Option<PyReadonlyArray1<f64>>,
        fill_value: Option<f64>,
    ) -> PyResult<()> {
        let mut grid = GridField::new(
            name,
            x.to_owned_array(),
            y.to_owned_array(),
            values.to_owned_array(),
            times.map(|t| t.to_owned_array()),
        )?;
        if let Some(fill) = fill_value {
            grid = grid.normalized(&crate::core::fill_value::FillSpec::fill(fill));
        }
        self.inner.insert_grid(grid);
        Ok(())
    }

    fn polygon_ids(&self) -> Vec<String> {
        self.inner.polygons().ids().map(String::from).collect()
    }
}

/// Python wrapper for CorrectionPipeline
#[pyclass(name = "CorrectionPipeline")]
struct PyCorrectionPipeline {
    inner: CorrectionPipeline,
}

#[pymethods]
impl PyCorrectionPipeline {
    #[new]
    fn new(config_json: &str, reference: PyRef<PyReferenceData>) -> PyResult<Self> {
        let config = PipelineConfig::from_json_str(config_json)?;
        let inner = CorrectionPipeline::new(&config, &reference.inner)?;
        Ok(Self { inner })
    }

    /// Correct one beam; returns a dict of derived arrays.
    ///
    /// `fill_value` marks missing samples in every dataset except the
    /// quality summary, which uses `quality_fill`.
    #[pyo3(signature = (
        granule, beam, h_li, latitude, longitude, quality, geoid_h,
        tide_ocean=None, tide_load=None, dac=None, model_tide=None, delta_time=None,
        fill_value=None, quality_fill=None
    ))]
    #[allow(clippy::too_many_arguments)]
    fn process<'py>(
        &self,
        py: Python<'py>,
        granule: &str,
        beam: &str,
        h_li: PyReadonlyArray1<f64>,
        latitude: PyReadonlyArray1<f64>,
        longitude: PyReadonlyArray1<f64>,
        quality: PyReadonlyArray1<f64>,
        geoid_h: PyReadonlyArray1<f64>,
        tide_ocean: Option<PyReadonlyArray1<f64>>,
        tide_load: Option<PyReadonlyArray1<f64>>,
        dac: Option<PyReadonlyArray1<f64>>,
        model_tide: Option<PyReadonlyArray1<f64>>,
        delta_time: Option<PyReadonlyArray1<f64>>,
        fill_value: Option<f64>,
        quality_fill: Option<f64>,
    ) -> PyResult<&'py PyDict> {
        let id = BeamId::parse(granule, beam)?;
        let mut arrays = vec![
            (fields::H_LI, h_li.as_array().to_vec()),
            (fields::LATITUDE, latitude.as_array().to_vec()),
            (fields::LONGITUDE, longitude.as_array().to_vec()),
            (fields::QUALITY, quality.as_array().to_vec()),
            (fields::GEOID, geoid_h.as_array().to_vec()),
        ];
        let optional = [
            (fields::TIDE_OCEAN, tide_ocean),
            (fields::TIDE_LOAD, tide_load),
            (fields::DAC, dac),
            (fields::MODEL_TIDE, model_tide),
            (fields::DELTA_TIME, delta_time),
        ];
        for (name, array) in optional {
            if let Some(array) = array {
                arrays.push((name, array.as_array().to_vec()));
            }
        }
        let raw = RawBeam::from_arrays(id, arrays, fill_value, quality_fill);
        let mut record = BeamRecord::from_raw(raw)?;

        let summary = self.inner.process(&mut record)?;

        let out = PyDict::new(py);
        out.set_item("h_corrected", record.h_corrected.into_pyarray(py))?;
        out.set_item("x", record.x.into_pyarray(py))?;
        out.set_item("y", record.y.into_pyarray(py))?;
        out.set_item("floating", record.floating.into_pyarray(py))?;
        out.set_item("firn_air_content", record.firn_air_content.into_pyarray(py))?;
        out.set_item("h_msl", record.h_msl.into_pyarray(py))?;
        out.set_item("thickness", record.thickness.into_pyarray(py))?;
        out.set_item("valid_thickness", summary.valid_thickness)?;
        out.set_item("mean_thickness", summary.mean_thickness)?;
        Ok(out)
    }
}

#[pyfunction]
#[pyo3(signature = (h_msl, firn_air_content, rho_ice=correction::RHO_ICE, rho_ocean=correction::RHO_OCEAN))]
fn hydrostatic_thickness(h_msl: f64, firn_air_content: f64, rho_ice: f64, rho_ocean: f64) -> PyResult<f64> {
    Ok(correction::hydrostatic_thickness(h_msl, firn_air_content, rho_ice, rho_ocean)?)
}

#[pyfunction]
fn cumulative_integrate<'py>(
    py: Python<'py>,
    series: PyReadonlyArray1<f64>,
    times: PyReadonlyArray1<f64>,
) -> PyResult<&'py PyArray1<f64>> {
    let out = timeseries::cumulative_integrate(&series.as_array(), &times.as_array())?;
    Ok(out.into_pyarray(py))
}
