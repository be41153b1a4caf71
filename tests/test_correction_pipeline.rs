use approx::assert_abs_diff_eq;
use ndarray::{Array1, Array3};
use shelfcorr::core::correction::hydrostatic_thickness;
use shelfcorr::core::polygon_mask::PolygonBoundary;
use shelfcorr::core::projection::{PolarStereographic, ProjectionParams};
use shelfcorr::io::beam::{fields, BeamId, BeamRecord, RawBeam};
use shelfcorr::types::{GeoPoint, ShelfError};
use shelfcorr::{CorrectionPipeline, GridField, PipelineConfig, ReferenceData};
use std::io::Write;

const ATL06_FILL: f64 = 3.4028234663852886e38;
const MDT: f64 = -1.1;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn projection() -> PolarStereographic {
    PolarStereographic::new(ProjectionParams::epsg3031()).unwrap()
}

/// Shelf outline between 77S and 79S, 165E to 175E
fn shelf(projection: &PolarStereographic) -> PolygonBoundary {
    let ring: Vec<GeoPoint> = [(-77.0, 165.0), (-77.0, 175.0), (-79.0, 175.0), (-79.0, 165.0)]
        .iter()
        .map(|&(lat, lon)| GeoPoint::new(lat, lon))
        .collect();
    PolygonBoundary::from_geographic("Ross", &[ring], projection)
        .unwrap()
        .with_attribute("TYPE", "FL")
}

/// Planar firn field: 10 m at the shelf centre rising 1 cm per km eastwards,
/// plus one metre per time slice
fn firn_value(x: f64, centre_x: f64, slice: usize) -> f64 {
    10.0 + 1e-5 * (x - centre_x) + slice as f64
}

fn firn_grid(projection: &PolarStereographic, name: &str, offset: f64) -> GridField {
    let (cx, cy) = projection.forward(-78.0, 170.0);
    let (cx, cy) = (cx + offset, cy + offset);
    let n = 31;
    let x_axis = Array1::from_shape_fn(n, |i| cx - 300_000.0 + 20_000.0 * i as f64);
    let y_axis = Array1::from_shape_fn(n, |j| cy - 300_000.0 + 20_000.0 * j as f64);
    let values = Array3::from_shape_fn((3, n, n), |(t, _, i)| firn_value(x_axis[i], cx, t));
    GridField::from_axes(name, &x_axis, &y_axis, values, Some(Array1::from(vec![2018.5, 2019.5, 2020.5])))
        .unwrap()
        .with_units("m")
}

fn reference() -> ReferenceData {
    let projection = projection();
    ReferenceData::new()
        .with_polygon(shelf(&projection))
        .with_grid(firn_grid(&projection, "fac", 0.0))
        .with_grid(firn_grid(&projection, "fac_elsewhere", 2_000_000.0))
}

fn config(grid: &str) -> PipelineConfig {
    let json = format!(
        r#"{{
            "projection": {{
                "hemisphere": "south",
                "true_scale_latitude": -71.0,
                "central_meridian": 0.0,
                "unit": "meters"
            }},
            "shelf_polygon": "Ross",
            "firn": {{"grid": {{"name": "{}", "epoch": {{"nearest": 2019.4}}, "buffer": 100000.0}}}},
            "correction": {{"mdt_correction": {}}}
        }}"#,
        grid, MDT
    );
    PipelineConfig::from_json_str(&json).unwrap()
}

/// Five samples along 170E: four on the shelf (one with a fill height),
/// one north of the ice front
fn raw_beam() -> RawBeam {
    let id = BeamId::parse("ATL06_20191201000000_10000510_005_01", "gt1r").unwrap();
    let mut raw = RawBeam::new(id);
    raw.insert(fields::H_LI, vec![60.0, 61.0, ATL06_FILL, 63.0, 40.0], Some(ATL06_FILL))
        .insert(fields::LATITUDE, vec![-77.5, -77.8, -78.0, -78.5, -76.0], Some(ATL06_FILL))
        .insert(fields::LONGITUDE, vec![170.0, 170.5, 170.0, 169.0, 170.0], Some(ATL06_FILL))
        .insert(fields::QUALITY, vec![0.0, 0.0, 0.0, 0.0, 0.0], Some(127.0))
        .insert(fields::GEOID, vec![-55.0, -55.0, -55.0, -55.0, -55.0], Some(ATL06_FILL))
        .insert(fields::DELTA_TIME, vec![6.0e7; 5], Some(ATL06_FILL));
    raw
}

#[test]
fn test_end_to_end_thickness() {
    init_logging();
    let reference = reference();
    let pipeline = CorrectionPipeline::new(&config("fac"), &reference).unwrap();
    let mut record = BeamRecord::from_raw(raw_beam()).unwrap();

    let summary = pipeline.process(&mut record).unwrap();
    assert_eq!(summary.samples, 5);
    assert_eq!(summary.valid_heights, 4);
    assert_eq!(summary.floating, 4);
    assert_eq!(summary.valid_thickness, 3);

    let projection = projection();
    let (cx, _) = projection.forward(-78.0, 170.0);
    for i in [0usize, 1, 3] {
        let (x, y) = projection.forward(record.latitude[i], record.longitude[i]);
        assert_abs_diff_eq!(record.x[i], x, epsilon = 1e-6);
        assert_abs_diff_eq!(record.y[i], y, epsilon = 1e-6);
        assert!(record.floating[i]);

        // Nearest slice to 2019.4 is the second one
        let fac = firn_value(x, cx, 1);
        assert_abs_diff_eq!(record.firn_air_content[i], fac, epsilon = 1e-6);

        let h_msl = record.h_li[i] - MDT - (-55.0);
        assert_abs_diff_eq!(record.h_msl[i], h_msl, epsilon = 1e-9);
        let expected = hydrostatic_thickness(h_msl, fac, 917.0, 1028.0).unwrap();
        assert_abs_diff_eq!(record.thickness[i], expected, epsilon = 1e-4);
    }

    // Fill height stays missing all the way through
    assert!(record.h_li[2].is_nan());
    assert!(record.h_msl[2].is_nan());
    assert!(record.thickness[2].is_nan());
    assert!(record.floating[2]);

    // North of the ice front: not floating, no thickness
    assert!(!record.floating[4]);
    assert!(record.thickness[4].is_nan());
}

#[test]
fn test_firn_grid_away_from_shelf_yields_missing() {
    init_logging();
    let reference = reference();
    let pipeline = CorrectionPipeline::new(&config("fac_elsewhere"), &reference).unwrap();
    let mut record = BeamRecord::from_raw(raw_beam()).unwrap();

    let summary = pipeline.process(&mut record).unwrap();
    assert!(record.firn_air_content.iter().all(|f| f.is_nan()));
    assert_eq!(summary.valid_thickness, 0);
    assert!(summary.mean_thickness.is_nan());
}

#[test]
fn test_missing_inputs_propagate() {
    init_logging();
    let reference = reference();
    let pipeline = CorrectionPipeline::new(&config("fac"), &reference).unwrap();

    let mut raw = raw_beam();
    raw.insert(fields::H_LI, vec![60.0, 61.0, 62.0, 63.0, 40.0], Some(ATL06_FILL));
    raw.insert(fields::GEOID, vec![-55.0, ATL06_FILL, -55.0, -55.0, -55.0], Some(ATL06_FILL));
    raw.insert(fields::LATITUDE, vec![-77.5, -77.8, ATL06_FILL, -78.5, -76.0], Some(ATL06_FILL));
    raw.insert(fields::QUALITY, vec![0.0, 0.0, 0.0, 1.0, 0.0], Some(127.0));
    let mut record = BeamRecord::from_raw(raw).unwrap();
    pipeline.process(&mut record).unwrap();

    assert!(!record.thickness[0].is_nan());
    // Missing geoid
    assert!(record.h_msl[1].is_nan());
    assert!(record.thickness[1].is_nan());
    // Missing latitude: no planar position, no firn, not floating
    assert!(record.x[2].is_nan());
    assert!(record.firn_air_content[2].is_nan());
    assert!(!record.floating[2]);
    assert!(record.thickness[2].is_nan());
    // Low quality
    assert!(record.h_li[3].is_nan());
    assert!(record.thickness[3].is_nan());
}

#[test]
fn test_fatal_record_errors() {
    init_logging();
    let reference = reference();

    let mut raw = raw_beam();
    raw.fields.remove(fields::H_LI);
    assert!(matches!(BeamRecord::from_raw(raw), Err(ShelfError::MissingField { .. })));

    let mut raw = raw_beam();
    raw.insert(fields::GEOID, vec![-55.0; 4], Some(ATL06_FILL));
    assert!(matches!(BeamRecord::from_raw(raw), Err(ShelfError::ShapeMismatch { .. })));

    let mut bad = config("fac");
    bad.shelf_polygon = "Amery".to_string();
    assert!(matches!(
        CorrectionPipeline::new(&bad, &reference),
        Err(ShelfError::UnknownReference { .. })
    ));

    let mut bad = config("fac");
    bad.correction.rho_ocean = bad.correction.rho_ice;
    assert!(matches!(
        CorrectionPipeline::new(&bad, &reference),
        Err(ShelfError::DegenerateConfiguration(_))
    ));
}

#[test]
fn test_batch_from_config_file() {
    init_logging();
    let reference = reference();
    let config = config("fac");
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(config.to_json_string().unwrap().as_bytes()).unwrap();

    let loaded = PipelineConfig::from_file(file.path()).unwrap();
    let pipeline = CorrectionPipeline::new(&loaded, &reference).unwrap();

    let mut records: Vec<BeamRecord> = ["gt1l", "gt2l", "gt3l"]
        .iter()
        .map(|beam| {
            let mut raw = raw_beam();
            raw.id = BeamId::parse("ATL06_20191201000000_10000510_005_01", beam).unwrap();
            BeamRecord::from_raw(raw).unwrap()
        })
        .collect();
    let summaries = pipeline.process_all(&mut records).unwrap();

    assert_eq!(summaries.len(), 3);
    assert_eq!(summaries[2].id.beam_name(), "gt3l");
    for (summary, record) in summaries.iter().zip(records.iter()) {
        assert_eq!(summary.valid_thickness, 3);
        assert!(record.mean_acquisition_time().is_some());
    }
    assert_abs_diff_eq!(summaries[0].mean_thickness, summaries[1].mean_thickness, epsilon = 1e-12);
}

#[test]
fn test_catalog_attribute_lookup() {
    let reference = reference();
    let floating = reference.polygons().find_by_attribute("TYPE", "FL");
    assert_eq!(floating.len(), 1);
    assert_eq!(floating[0].id, "Ross");
}
