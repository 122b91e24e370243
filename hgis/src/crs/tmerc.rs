//! Ellipsoidal transverse Mercator.
//!
//! Krüger series to sixth order in the third flattening, evaluated with
//! Clenshaw summation (Karney, "Transverse Mercator with an accuracy of a few
//! nanometers", J. Geodesy 85, 2011). Sub-millimetre within a few thousand
//! kilometres of the central meridian.
//!
//! A non-zero latitude of origin (the Korean belts use 38N) is handled by
//! subtracting the projected northing of the origin.

use num_complex::Complex64;
use std::f64::consts::FRAC_PI_2;

use super::ellipsoid::Ellipsoid;
use super::error::DomainViolation;
use super::math::{ang_diff, ang_normalize, polyval, sincosd, tauf, taupf};

const ORDER: usize = 6;

/// Longitude offset from the central meridian beyond which points are
/// rejected as out of domain.
pub const MAX_CENTRAL_MERIDIAN_OFFSET: f64 = 30.0;

// ============================================================================
// Series coefficients
// ============================================================================

// Each row: polynomial in n (highest power first) followed by the divisor.
const ALPHA: [&[f64]; ORDER] = [
    &[31564.0, -66675.0, 34440.0, 47250.0, -100800.0, 75600.0, 151200.0],
    &[-1983433.0, 863232.0, 748608.0, -1161216.0, 524160.0, 1935360.0],
    &[670412.0, 406647.0, -533952.0, 184464.0, 725760.0],
    &[6601661.0, -7732800.0, 2230245.0, 7257600.0],
    &[-13675556.0, 3438171.0, 7983360.0],
    &[212378941.0, 319334400.0],
];

const BETA: [&[f64]; ORDER] = [
    &[384796.0, -382725.0, -6720.0, 932400.0, -1612800.0, 1209600.0, 2419200.0],
    &[-1118711.0, 1695744.0, -1174656.0, 258048.0, 80640.0, 3870720.0],
    &[22276.0, -16929.0, -15984.0, 12852.0, 362880.0],
    &[-830251.0, -158400.0, 197865.0, 7257600.0],
    &[-435388.0, 453717.0, 15966720.0],
    &[20648693.0, 638668800.0],
];

// b1 = (1 + n^2/4 + n^4/64 + n^6/256) / (1 + n), polynomial in n^2.
const B1: [f64; 5] = [1.0, 4.0, 64.0, 256.0, 256.0];

/// Transverse Mercator projection with precomputed series coefficients.
#[derive(Debug, Clone, PartialEq)]
pub struct TransverseMercator {
    pub ellipsoid: Ellipsoid,
    pub lon0: f64,
    pub lat0: f64,
    pub k0: f64,
    pub false_easting: f64,
    pub false_northing: f64,
    es: f64,
    e2: f64,
    e2m: f64,
    a1: f64,
    alp: [f64; ORDER],
    bet: [f64; ORDER],
    origin_northing: f64,
}

impl TransverseMercator {
    pub fn new(
        ellipsoid: Ellipsoid,
        lon0: f64,
        lat0: f64,
        k0: f64,
        false_easting: f64,
        false_northing: f64,
    ) -> Self {
        let f = ellipsoid.f;
        let e2 = ellipsoid.e2();
        let es = f.signum() * e2.abs().sqrt();
        let n = ellipsoid.n();

        let b1 = polyval(&B1[..4], n * n) / (B1[4] * (1.0 + n));
        let a1 = b1 * ellipsoid.a;

        let mut alp = [0.0; ORDER];
        let mut bet = [0.0; ORDER];
        let mut d = n;
        for l in 0..ORDER {
            let m = ALPHA[l].len() - 1;
            alp[l] = d * polyval(&ALPHA[l][..m], n) / ALPHA[l][m];
            bet[l] = d * polyval(&BETA[l][..m], n) / BETA[l][m];
            d *= n;
        }

        let mut tm = Self {
            ellipsoid,
            lon0,
            lat0,
            k0,
            false_easting,
            false_northing,
            es,
            e2,
            e2m: 1.0 - e2,
            a1,
            alp,
            bet,
            origin_northing: 0.0,
        };
        tm.origin_northing = tm.meridian_northing(lat0);
        tm
    }

    /// UTM zone `zone` (1-60) on the given ellipsoid.
    pub fn utm(zone: u8, north: bool, ellipsoid: Ellipsoid) -> Self {
        let lon0 = f64::from(zone) * 6.0 - 183.0;
        let false_northing = if north { 0.0 } else { 10_000_000.0 };
        Self::new(ellipsoid, lon0, 0.0, 0.9996, 500_000.0, false_northing)
    }

    /// Unscaled, unshifted northing of a point on the central meridian.
    fn meridian_northing(&self, lat: f64) -> f64 {
        if lat == 0.0 {
            return 0.0;
        }
        let (xi, _) = self.series_forward(lat.abs(), 0.0);
        self.a1 * self.k0 * xi * lat.signum()
    }

    /// Gauss-Schreiber then Krüger series. `lat` and `dlon` are in degrees,
    /// both non-negative with `dlon <= 90`. Returns `(xi, eta)`.
    fn series_forward(&self, lat: f64, dlon: f64) -> (f64, f64) {
        let (xip, etap) = if lat == 90.0 {
            (FRAC_PI_2, 0.0)
        } else {
            let (sphi, cphi) = sincosd(lat);
            let (slam, clam) = sincosd(dlon);
            let taup = taupf(sphi / cphi, self.es);
            (taup.atan2(clam), (slam / taup.hypot(clam)).asinh())
        };

        let c0 = (2.0 * xip).cos();
        let ch0 = (2.0 * etap).cosh();
        let s0 = (2.0 * xip).sin();
        let sh0 = (2.0 * etap).sinh();
        let a = Complex64::new(2.0 * c0 * ch0, -2.0 * s0 * sh0);

        let mut y0 = Complex64::new(0.0, 0.0);
        let mut y1 = Complex64::new(0.0, 0.0);
        for j in (0..ORDER).rev() {
            let prev = y0;
            y0 = a * y0 - y1 + self.alp[j];
            y1 = prev;
        }

        let zeta = Complex64::new(xip, etap) + Complex64::new(s0 * ch0, c0 * sh0) * y0;
        (zeta.re, zeta.im)
    }

    /// Geographic degrees to projected metres.
    pub(crate) fn forward(&self, lon: f64, lat: f64) -> Result<(f64, f64), DomainViolation> {
        if !lon.is_finite() || !lat.is_finite() {
            return Err(DomainViolation::new("non-finite coordinate"));
        }
        if !(-90.0..=90.0).contains(&lat) {
            return Err(DomainViolation::new("latitude outside [-90, 90]"));
        }
        let dlon = ang_diff(self.lon0, lon);
        if dlon.abs() > MAX_CENTRAL_MERIDIAN_OFFSET {
            return Err(DomainViolation::new(format!(
                "{:.3} degrees from the central meridian (limit {})",
                dlon.abs(),
                MAX_CENTRAL_MERIDIAN_OFFSET
            )));
        }

        let (xi, eta) = self.series_forward(lat.abs(), dlon.abs());
        let x = self.a1 * self.k0 * eta * dlon.signum();
        let y = self.a1 * self.k0 * xi * lat.signum();

        Ok((
            x + self.false_easting,
            y - self.origin_northing + self.false_northing,
        ))
    }

    /// Projected metres to geographic degrees.
    pub(crate) fn inverse(&self, x: f64, y: f64) -> Result<(f64, f64), DomainViolation> {
        if !x.is_finite() || !y.is_finite() {
            return Err(DomainViolation::new("non-finite coordinate"));
        }
        let xi = (y - self.false_northing + self.origin_northing) / (self.a1 * self.k0);
        let eta = (x - self.false_easting) / (self.a1 * self.k0);
        if xi.abs() > FRAC_PI_2 {
            return Err(DomainViolation::new("northing beyond the pole"));
        }

        let xi_sign = xi.signum();
        let eta_sign = eta.signum();
        let (xi, eta) = (xi.abs(), eta.abs());

        let c0 = (2.0 * xi).cos();
        let ch0 = (2.0 * eta).cosh();
        let s0 = (2.0 * xi).sin();
        let sh0 = (2.0 * eta).sinh();
        let a = Complex64::new(2.0 * c0 * ch0, -2.0 * s0 * sh0);

        let mut y0 = Complex64::new(0.0, 0.0);
        let mut y1 = Complex64::new(0.0, 0.0);
        for j in (0..ORDER).rev() {
            let prev = y0;
            y0 = a * y0 - y1 - self.bet[j];
            y1 = prev;
        }
        let zeta = Complex64::new(xi, eta) + Complex64::new(s0 * ch0, c0 * sh0) * y0;
        let (xip, etap) = (zeta.re, zeta.im);

        let s = etap.sinh();
        let c = xip.cos().max(0.0);
        let r = s.hypot(c);
        let (dlon, lat) = if r == 0.0 {
            (0.0, 90.0)
        } else {
            let tau = tauf(xip.sin() / r, self.es);
            (s.atan2(c).to_degrees(), tau.atan().to_degrees())
        };

        if dlon > MAX_CENTRAL_MERIDIAN_OFFSET + 1e-6 {
            return Err(DomainViolation::new(
                "easting too far from the central meridian",
            ));
        }

        Ok((ang_normalize(self.lon0 + dlon * eta_sign), lat * xi_sign))
    }

    /// Point scale factor at a geographic position, from a numerical
    /// derivative of the forward projection along the meridian.
    pub fn scale_factor_at(&self, lon: f64, lat: f64) -> Option<f64> {
        let step = 1e-5;
        let (_, y1) = self.forward(lon, lat - step).ok()?;
        let (_, y2) = self.forward(lon, lat + step).ok()?;
        let (sphi, _) = sincosd(lat);
        // Meridional radius of curvature.
        let m = self.ellipsoid.a * self.e2m / (1.0 - self.e2 * sphi * sphi).powf(1.5);
        Some((y2 - y1) / (m * (2.0 * step).to_radians()))
    }
}
