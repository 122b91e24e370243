//! Map projections supported by the registry.

use std::f64::consts::{FRAC_PI_4, PI};

use super::error::DomainViolation;
use super::tmerc::TransverseMercator;

/// Radius of the sphere used by Web Mercator (the WGS 84 semi-major axis).
const WEB_MERCATOR_RADIUS: f64 = 6_378_137.0;

/// Latitude limit of Web Mercator, where the map becomes square.
pub const WEB_MERCATOR_MAX_LAT: f64 = 85.051_128_779_806_59;

/// Projection from geographic coordinates on the datum ellipsoid to the
/// CRS's own coordinates.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// Longitude/latitude in degrees; no projection.
    Geographic,
    /// Spherical ("pseudo") Mercator, EPSG:3857.
    WebMercator,
    TransverseMercator(TransverseMercator),
}

impl Projection {
    pub fn is_geographic(&self) -> bool {
        matches!(self, Projection::Geographic)
    }

    /// Geographic degrees to CRS coordinates.
    pub(crate) fn forward(&self, lon: f64, lat: f64) -> Result<(f64, f64), DomainViolation> {
        match self {
            Projection::Geographic => check_geographic(lon, lat).map(|_| (lon, lat)),
            Projection::WebMercator => {
                check_geographic(lon, lat)?;
                if lat.abs() > WEB_MERCATOR_MAX_LAT {
                    return Err(DomainViolation::new(format!(
                        "latitude {} beyond the Web Mercator limit of {}",
                        lat, WEB_MERCATOR_MAX_LAT
                    )));
                }
                let x = WEB_MERCATOR_RADIUS * lon.to_radians();
                let y = WEB_MERCATOR_RADIUS * (FRAC_PI_4 + lat.to_radians() / 2.0).tan().ln();
                Ok((x, y))
            }
            Projection::TransverseMercator(tm) => tm.forward(lon, lat),
        }
    }

    /// CRS coordinates to geographic degrees.
    pub(crate) fn inverse(&self, x: f64, y: f64) -> Result<(f64, f64), DomainViolation> {
        match self {
            Projection::Geographic => check_geographic(x, y).map(|_| (x, y)),
            Projection::WebMercator => {
                if !x.is_finite() || !y.is_finite() {
                    return Err(DomainViolation::new("non-finite coordinate"));
                }
                let limit = PI * WEB_MERCATOR_RADIUS;
                if x.abs() > limit * (1.0 + 1e-12) || y.abs() > limit * (1.0 + 1e-12) {
                    return Err(DomainViolation::new("outside the Web Mercator square"));
                }
                let lon = (x / WEB_MERCATOR_RADIUS).to_degrees();
                let lat = (2.0 * (y / WEB_MERCATOR_RADIUS).exp().atan() - PI / 2.0).to_degrees();
                Ok((lon, lat))
            }
            Projection::TransverseMercator(tm) => tm.inverse(x, y),
        }
    }
}

fn check_geographic(lon: f64, lat: f64) -> Result<(), DomainViolation> {
    if !lon.is_finite() || !lat.is_finite() {
        return Err(DomainViolation::new("non-finite coordinate"));
    }
    if !(-90.0..=90.0).contains(&lat) {
        return Err(DomainViolation::new(format!(
            "latitude {} outside [-90, 90]",
            lat
        )));
    }
    if !(-540.0..=540.0).contains(&lon) {
        return Err(DomainViolation::new(format!(
            "longitude {} outside [-540, 540]",
            lon
        )));
    }
    Ok(())
}
