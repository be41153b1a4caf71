//! Ellipsoidal polar stereographic projection.
//!
//! Forward and inverse transforms between geographic coordinates (degrees)
//! and planar polar-stereographic coordinates, following the ellipsoidal
//! formulation in Snyder (1987), "Map Projections: A Working Manual",
//! eqs. 15-9, 21-33 to 21-40. The projection parameters include:
//! - Hemisphere: which pole the plane is tangent/secant to
//! - True-scale latitude: the standard parallel (signed, degrees)
//! - Central meridian: the longitude pointing along +y (south) or -y (north)
//! - Planar unit: metres or kilometres
//! - Ellipsoid: WGS-84 unless specified otherwise

use crate::types::{GeoPoint, PlanarPoint, ShelfError, ShelfResult, MISSING};
use ndarray::{Array, ArrayBase, Data, Dimension, Zip};
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

/// Pole the projection plane is centred on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hemisphere {
    North,
    South,
}

impl Hemisphere {
    /// +1 for north, -1 for south
    pub fn sign(self) -> f64 {
        match self {
            Hemisphere::North => 1.0,
            Hemisphere::South => -1.0,
        }
    }
}

impl std::fmt::Display for Hemisphere {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Hemisphere::North => write!(f, "north"),
            Hemisphere::South => write!(f, "south"),
        }
    }
}

/// Unit of the planar coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanarUnit {
    Meters,
    Kilometers,
}

impl PlanarUnit {
    /// Planar units per metre
    pub fn per_meter(self) -> f64 {
        match self {
            PlanarUnit::Meters => 1.0,
            PlanarUnit::Kilometers => 1e-3,
        }
    }
}

/// Reference ellipsoid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ellipsoid {
    /// Semi-major axis (metres)
    pub semi_major_axis: f64,
    /// First eccentricity
    pub eccentricity: f64,
}

impl Ellipsoid {
    pub fn wgs84() -> Self {
        let flattening: f64 = 1.0 / 298.257_223_563;
        Self {
            semi_major_axis: 6_378_137.0,
            eccentricity: (flattening * (2.0 - flattening)).sqrt(),
        }
    }

    /// Snyder eq. 15-9: isometric-latitude term used by the polar aspect
    fn t(&self, phi: f64) -> f64 {
        let e = self.eccentricity;
        let es = e * phi.sin();
        (FRAC_PI_4 - phi / 2.0).tan() / ((1.0 - es) / (1.0 + es)).powf(e / 2.0)
    }

    fn m(&self, phi: f64) -> f64 {
        let e = self.eccentricity;
        phi.cos() / (1.0 - (e * phi.sin()).powi(2)).sqrt()
    }
}

impl Default for Ellipsoid {
    fn default() -> Self {
        Self::wgs84()
    }
}

/// Polar stereographic projection parameters.
///
/// No `Default`: Antarctic and Arctic runs name their projection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProjectionParams {
    pub hemisphere: Hemisphere,
    /// Latitude of true scale in degrees, signed (negative in the south)
    pub true_scale_latitude: f64,
    /// Central meridian in degrees
    pub central_meridian: f64,
    pub unit: PlanarUnit,
    #[serde(default)]
    pub ellipsoid: Ellipsoid,
}

impl ProjectionParams {
    /// Antarctic Polar Stereographic (EPSG:3031)
    pub fn epsg3031() -> Self {
        Self {
            hemisphere: Hemisphere::South,
            true_scale_latitude: -71.0,
            central_meridian: 0.0,
            unit: PlanarUnit::Meters,
            ellipsoid: Ellipsoid::wgs84(),
        }
    }

    /// NSIDC Sea Ice Polar Stereographic North (EPSG:3413)
    pub fn epsg3413() -> Self {
        Self {
            hemisphere: Hemisphere::North,
            true_scale_latitude: 70.0,
            central_meridian: -45.0,
            unit: PlanarUnit::Meters,
            ellipsoid: Ellipsoid::wgs84(),
        }
    }

    /// Reject parameter sets that would silently project into the wrong plane
    pub fn validate(&self) -> ShelfResult<()> {
        let lat_ts = self.true_scale_latitude;
        if !lat_ts.is_finite() || lat_ts.abs() > 90.0 {
            return Err(ShelfError::DegenerateConfiguration(format!(
                "true-scale latitude {} is outside [-90, 90]",
                lat_ts
            )));
        }
        if lat_ts == 0.0 || lat_ts.signum() != self.hemisphere.sign() {
            return Err(ShelfError::DegenerateConfiguration(format!(
                "true-scale latitude {} does not lie in the {} hemisphere",
                lat_ts, self.hemisphere
            )));
        }
        if !self.central_meridian.is_finite() {
            return Err(ShelfError::DegenerateConfiguration(
                "central meridian must be finite".to_string(),
            ));
        }
        let e = self.ellipsoid.eccentricity;
        if !(self.ellipsoid.semi_major_axis > 0.0) || !(0.0..1.0).contains(&e) {
            return Err(ShelfError::DegenerateConfiguration(format!(
                "invalid ellipsoid: a = {}, e = {}",
                self.ellipsoid.semi_major_axis, e
            )));
        }
        Ok(())
    }
}

/// Polar stereographic projection with precomputed constants
#[derive(Debug, Clone)]
pub struct PolarStereographic {
    params: ProjectionParams,
    /// rho = rho_scale * t, in metres
    rho_scale: f64,
}

impl PolarStereographic {
    pub fn new(params: ProjectionParams) -> ShelfResult<Self> {
        params.validate()?;

        let ellipsoid = params.ellipsoid;
        let a = ellipsoid.semi_major_axis;
        let e = ellipsoid.eccentricity;
        let phi_c = params.true_scale_latitude.abs().to_radians();

        let rho_scale = if (90.0 - params.true_scale_latitude.abs()).abs() < 1e-10 {
            // Snyder 21-33: scale true at the pole (k0 = 1)
            2.0 * a / ((1.0 + e).powf(1.0 + e) * (1.0 - e).powf(1.0 - e)).sqrt()
        } else {
            // Snyder 21-34: scale true along the standard parallel
            a * ellipsoid.m(phi_c) / ellipsoid.t(phi_c)
        };

        log::debug!(
            "Polar stereographic ({}): lat_ts={}, lon0={}, unit={:?}",
            params.hemisphere,
            params.true_scale_latitude,
            params.central_meridian,
            params.unit
        );

        Ok(Self { params, rho_scale })
    }

    pub fn params(&self) -> &ProjectionParams {
        &self.params
    }

    /// Project one geographic coordinate.
    ///
    /// Coordinates outside the projection's hemisphere, or missing inputs,
    /// yield missing planar coordinates.
    pub fn forward(&self, latitude: f64, longitude: f64) -> (f64, f64) {
        let h = self.params.hemisphere.sign();
        if !latitude.is_finite() || !longitude.is_finite() {
            return (MISSING, MISSING);
        }
        if latitude.abs() > 90.0 || latitude * h < 0.0 {
            return (MISSING, MISSING);
        }

        let phi = latitude.abs().to_radians();
        let lambda = (longitude - self.params.central_meridian).to_radians();
        let rho = self.rho_scale * self.params.ellipsoid.t(phi);

        let x = rho * h * (h * lambda).sin();
        let y = -rho * h * (h * lambda).cos();

        let scale = self.params.unit.per_meter();
        (x * scale, y * scale)
    }

    /// Recover the geographic coordinate of one planar point
    pub fn inverse(&self, x: f64, y: f64) -> (f64, f64) {
        if !x.is_finite() || !y.is_finite() {
            return (MISSING, MISSING);
        }
        let h = self.params.hemisphere.sign();
        let to_meters = 1.0 / self.params.unit.per_meter();
        let (xm, ym) = (x * to_meters, y * to_meters);

        let rho = xm.hypot(ym);
        if rho == 0.0 {
            return (h * 90.0, wrap_longitude(self.params.central_meridian));
        }

        // Snyder 7-9, iterated to convergence
        let e = self.params.ellipsoid.eccentricity;
        let t = rho / self.rho_scale;
        let mut phi = FRAC_PI_2 - 2.0 * t.atan();
        for _ in 0..20 {
            let es = e * phi.sin();
            let next = FRAC_PI_2 - 2.0 * (t * ((1.0 - es) / (1.0 + es)).powf(e / 2.0)).atan();
            let delta = (next - phi).abs();
            phi = next;
            if delta < 1e-14 {
                break;
            }
        }

        let lambda = h * (h * xm).atan2(-h * ym);
        let latitude = h * phi.to_degrees();
        let longitude = wrap_longitude(lambda.to_degrees() + self.params.central_meridian);
        (latitude, longitude)
    }

    pub fn forward_point(&self, point: GeoPoint) -> PlanarPoint {
        let (x, y) = self.forward(point.latitude, point.longitude);
        PlanarPoint::new(x, y)
    }

    pub fn inverse_point(&self, point: PlanarPoint) -> GeoPoint {
        let (lat, lon) = self.inverse(point.x, point.y);
        GeoPoint::new(lat, lon)
    }

    /// Project equally shaped latitude/longitude arrays element-wise
    pub fn forward_array<S1, S2, D>(
        &self,
        latitude: &ArrayBase<S1, D>,
        longitude: &ArrayBase<S2, D>,
    ) -> ShelfResult<(Array<f64, D>, Array<f64, D>)>
    where
        S1: Data<Elem = f64>,
        S2: Data<Elem = f64>,
        D: Dimension,
    {
        check_same_shape("longitude", latitude.shape(), longitude.shape())?;

        let mut x = Array::from_elem(latitude.raw_dim(), MISSING);
        let mut y = Array::from_elem(latitude.raw_dim(), MISSING);
        Zip::from(&mut x)
            .and(&mut y)
            .and(latitude)
            .and(longitude)
            .for_each(|x, y, &lat, &lon| {
                let (px, py) = self.forward(lat, lon);
                *x = px;
                *y = py;
            });
        Ok((x, y))
    }

    /// Inverse-project equally shaped x/y arrays element-wise
    pub fn inverse_array<S1, S2, D>(
        &self,
        x: &ArrayBase<S1, D>,
        y: &ArrayBase<S2, D>,
    ) -> ShelfResult<(Array<f64, D>, Array<f64, D>)>
    where
        S1: Data<Elem = f64>,
        S2: Data<Elem = f64>,
        D: Dimension,
    {
        check_same_shape("y", x.shape(), y.shape())?;

        let mut lat = Array::from_elem(x.raw_dim(), MISSING);
        let mut lon = Array::from_elem(x.raw_dim(), MISSING);
        Zip::from(&mut lat)
            .and(&mut lon)
            .and(x)
            .and(y)
            .for_each(|lat, lon, &px, &py| {
                let (la, lo) = self.inverse(px, py);
                *lat = la;
                *lon = lo;
            });
        Ok((lat, lon))
    }
}

/// Project a single coordinate with explicit parameters
pub fn forward(latitude: f64, longitude: f64, params: &ProjectionParams) -> ShelfResult<(f64, f64)> {
    Ok(PolarStereographic::new(*params)?.forward(latitude, longitude))
}

/// Inverse-project a single coordinate with explicit parameters
pub fn inverse(x: f64, y: f64, params: &ProjectionParams) -> ShelfResult<(f64, f64)> {
    Ok(PolarStereographic::new(*params)?.inverse(x, y))
}

fn check_same_shape(field: &str, expected: &[usize], found: &[usize]) -> ShelfResult<()> {
    if expected != found {
        return Err(ShelfError::ShapeMismatch {
            field: field.to_string(),
            expected: format!("{:?}", expected),
            found: format!("{:?}", found),
        });
    }
    Ok(())
}

/// Wrap a longitude into [-180, 180)
fn wrap_longitude(lon: f64) -> f64 {
    let wrapped = (lon + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped.abs() < 1e-12 {
        0.0
    } else {
        wrapped
    }
}
