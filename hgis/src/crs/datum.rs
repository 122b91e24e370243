//! Geodetic datums and seven-parameter Helmert shifts.

use super::ellipsoid::Ellipsoid;

const ARCSEC_TO_RAD: f64 = std::f64::consts::PI / (180.0 * 3600.0);

/// Seven-parameter Helmert transformation to WGS 84, position-vector
/// convention (the `towgs84` parameter order used by PROJ and EPSG).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Helmert {
    /// Translations in metres.
    pub dx: f64,
    pub dy: f64,
    pub dz: f64,
    /// Rotations in arc-seconds.
    pub rx: f64,
    pub ry: f64,
    pub rz: f64,
    /// Scale difference in parts per million.
    pub ds: f64,
}

impl Helmert {
    pub const ZERO: Helmert = Helmert {
        dx: 0.0,
        dy: 0.0,
        dz: 0.0,
        rx: 0.0,
        ry: 0.0,
        rz: 0.0,
        ds: 0.0,
    };

    pub const fn new(dx: f64, dy: f64, dz: f64, rx: f64, ry: f64, rz: f64, ds: f64) -> Self {
        Self {
            dx,
            dy,
            dz,
            rx,
            ry,
            rz,
            ds,
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// Rotation-scale matrix `(1 + s) * R` for the small-angle rotation.
    fn matrix(&self) -> [[f64; 3]; 3] {
        let (rx, ry, rz) = (
            self.rx * ARCSEC_TO_RAD,
            self.ry * ARCSEC_TO_RAD,
            self.rz * ARCSEC_TO_RAD,
        );
        let m = 1.0 + self.ds * 1e-6;
        [
            [m, -rz * m, ry * m],
            [rz * m, m, -rx * m],
            [-ry * m, rx * m, m],
        ]
    }

    /// Local datum geocentric XYZ to WGS 84 geocentric XYZ.
    pub fn apply(&self, p: [f64; 3]) -> [f64; 3] {
        let r = self.matrix();
        [
            self.dx + r[0][0] * p[0] + r[0][1] * p[1] + r[0][2] * p[2],
            self.dy + r[1][0] * p[0] + r[1][1] * p[1] + r[1][2] * p[2],
            self.dz + r[2][0] * p[0] + r[2][1] * p[1] + r[2][2] * p[2],
        ]
    }

    /// Exact inverse of [`Helmert::apply`].
    pub fn apply_inverse(&self, p: [f64; 3]) -> [f64; 3] {
        let v = [p[0] - self.dx, p[1] - self.dy, p[2] - self.dz];
        let r = self.matrix();
        let det = r[0][0] * (r[1][1] * r[2][2] - r[1][2] * r[2][1])
            - r[0][1] * (r[1][0] * r[2][2] - r[1][2] * r[2][0])
            + r[0][2] * (r[1][0] * r[2][1] - r[1][1] * r[2][0]);

        // Adjugate divided by the determinant.
        let inv = [
            [
                (r[1][1] * r[2][2] - r[1][2] * r[2][1]) / det,
                (r[0][2] * r[2][1] - r[0][1] * r[2][2]) / det,
                (r[0][1] * r[1][2] - r[0][2] * r[1][1]) / det,
            ],
            [
                (r[1][2] * r[2][0] - r[1][0] * r[2][2]) / det,
                (r[0][0] * r[2][2] - r[0][2] * r[2][0]) / det,
                (r[0][2] * r[1][0] - r[0][0] * r[1][2]) / det,
            ],
            [
                (r[1][0] * r[2][1] - r[1][1] * r[2][0]) / det,
                (r[0][1] * r[2][0] - r[0][0] * r[2][1]) / det,
                (r[0][0] * r[1][1] - r[0][1] * r[1][0]) / det,
            ],
        ];
        [
            inv[0][0] * v[0] + inv[0][1] * v[1] + inv[0][2] * v[2],
            inv[1][0] * v[0] + inv[1][1] * v[1] + inv[1][2] * v[2],
            inv[2][0] * v[0] + inv[2][1] * v[1] + inv[2][2] * v[2],
        ]
    }
}

/// Geodetic datum: an ellipsoid plus its relation to WGS 84.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Datum {
    pub name: &'static str,
    pub ellipsoid: Ellipsoid,
    /// `None` for WGS 84 itself.
    pub to_wgs84: Option<Helmert>,
}

impl Datum {
    pub const WGS84: Datum = Datum {
        name: "World Geodetic System 1984",
        ellipsoid: Ellipsoid::WGS84,
        to_wgs84: None,
    };

    pub const KOREA_2000: Datum = Datum {
        name: "Geocentric datum of Korea",
        ellipsoid: Ellipsoid::GRS80,
        to_wgs84: Some(Helmert::ZERO),
    };

    pub const KOREAN_1985: Datum = Datum {
        name: "Korean Datum 1985",
        ellipsoid: Ellipsoid::BESSEL_1841,
        to_wgs84: Some(Helmert::new(-115.80, 474.99, 674.11, 1.16, -2.31, -1.63, 6.43)),
    };

    /// True when the datum coincides with WGS 84 at the precision this
    /// engine works to, so no geocentric shift is needed.
    pub fn is_wgs84_compatible(&self) -> bool {
        self.to_wgs84.is_none_or(|h| h.is_zero())
    }

    /// Whether moving between `self` and `other` needs a datum shift.
    pub fn needs_shift_to(&self, other: &Datum) -> bool {
        if self.is_wgs84_compatible() && other.is_wgs84_compatible() {
            return false;
        }
        self.to_wgs84 != other.to_wgs84 || self.ellipsoid != other.ellipsoid
    }

    /// Geographic (lon, lat, h) on this datum to geographic on WGS 84.
    pub fn to_wgs84_geographic(&self, lon: f64, lat: f64, h: f64) -> (f64, f64, f64) {
        let xyz = self.ellipsoid.to_geocentric(lon, lat, h);
        let shifted = match self.to_wgs84 {
            Some(helmert) => helmert.apply(xyz),
            None => xyz,
        };
        Ellipsoid::WGS84.from_geocentric(shifted)
    }

    /// Geographic (lon, lat, h) on WGS 84 to geographic on this datum.
    pub fn from_wgs84_geographic(&self, lon: f64, lat: f64, h: f64) -> (f64, f64, f64) {
        let xyz = Ellipsoid::WGS84.to_geocentric(lon, lat, h);
        let shifted = match self.to_wgs84 {
            Some(helmert) => helmert.apply_inverse(xyz),
            None => xyz,
        };
        self.ellipsoid.from_geocentric(shifted)
    }
}
