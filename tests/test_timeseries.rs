use approx::assert_abs_diff_eq;
use ndarray::{array, Array1, Array3};
use shelfcorr::core::polygon_mask::{PolygonBoundary, PolygonMask};
use shelfcorr::core::timeseries::{
    cumulative_integrate, decimal_year, height_change_from_smb, masked_mean_series, regional_mean_series,
};
use shelfcorr::io::beam::delta_time_to_datetime;
use shelfcorr::types::{PlanarBounds, PlanarPoint, MISSING};
use shelfcorr::GridField;

/// 10 x 10 km grid at 1 km spacing; left half wetter than right half.
/// Slice t adds t to every cell; cell (0, 0) is missing in slice 1.
fn smb_grid() -> GridField {
    let axis = Array1::from_shape_fn(11, |i| i as f64 * 1000.0);
    let mut values = Array3::from_shape_fn((4, 11, 11), |(t, _, i)| {
        let base = if i <= 5 { 400.0 } else { 200.0 };
        base + t as f64
    });
    values[[1, 0, 0]] = MISSING;
    GridField::from_axes("smb", &axis, &axis, values, Some(array![2018.0, 2019.0, 2020.0, 2021.0]))
        .unwrap()
        .with_units("kg m-2 yr-1")
}

#[test]
fn test_regional_series_over_box_and_polygon() {
    let _ = env_logger::builder().is_test(true).try_init();
    let field = smb_grid();

    // Box covering columns 0..=2 on rows 0..=2; all in the wet half
    let region = PlanarBounds::new(0.0, 2000.0, 0.0, 2000.0);
    let series = regional_mean_series(&field, &region).unwrap();
    assert_eq!(series.len(), 4);
    assert_abs_diff_eq!(series[0], 400.0, epsilon = 1e-12);
    // The missing cell is ignored rather than poisoning the mean
    assert_abs_diff_eq!(series[1], 401.0, epsilon = 1e-12);

    // Polygon spanning columns 4..=7 on rows 4..=6: 2 wet and 2 dry columns
    let mask = PolygonMask::new(&PolygonBoundary::new(
        "strip",
        vec![
            PlanarPoint::new(4000.0, 4000.0),
            PlanarPoint::new(7000.0, 4000.0),
            PlanarPoint::new(7000.0, 6000.0),
            PlanarPoint::new(4000.0, 6000.0),
        ],
    ))
    .unwrap();
    let series = masked_mean_series(&field, &mask).unwrap();
    assert_abs_diff_eq!(series[0], 300.0, epsilon = 1e-12);
    assert_abs_diff_eq!(series[3], 303.0, epsilon = 1e-12);

    let outside = PlanarBounds::new(50_000.0, 60_000.0, 0.0, 1000.0);
    assert!(regional_mean_series(&field, &outside).unwrap().iter().all(|v| v.is_nan()));
}

#[test]
fn test_cumulative_height_change() {
    let field = smb_grid();
    let region = PlanarBounds::new(6000.0, 10_000.0, 0.0, 10_000.0);
    let smb = regional_mean_series(&field, &region).unwrap();
    let times = field.times().unwrap();

    // SMB rises by 1 kg/m² per year: anomalies are symmetric about the mean
    let series = height_change_from_smb(&smb, times, 917.0).unwrap();
    assert_eq!(series.times, vec![2019.0, 2020.0, 2021.0]);
    let rates = smb.mapv(|v| v / 917.0);
    let direct = cumulative_integrate(&rates, times).unwrap();
    for (a, b) in series.height_change.iter().zip(direct.iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-15);
    }
    // Integral of a linear anomaly over the full symmetric period returns to zero
    assert_abs_diff_eq!(series.height_change[2], 0.0, epsilon = 1e-12);
    assert!(series.height_change[0] < 0.0);

    let mass = series.to_mass_gt(4.0e6, 917.0);
    assert_abs_diff_eq!(mass[2], 0.0, epsilon = 1e-12);
}

#[test]
fn test_acquisition_epochs_as_decimal_years() {
    let t = delta_time_to_datetime(0.0).unwrap();
    assert_abs_diff_eq!(decimal_year(&t), 2018.0, epsilon = 1e-12);

    let half_year = 0.5 * 365.0 * 86_400.0;
    let t = delta_time_to_datetime(half_year).unwrap();
    assert_abs_diff_eq!(decimal_year(&t), 2018.5, epsilon = 1e-9);
}
