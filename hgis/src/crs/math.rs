//! Numerical helpers for the projection code.

/// Error-free sum: returns `(s, t)` with `s = fl(u + v)` and `u + v = s + t`.
fn two_sum(u: f64, v: f64) -> (f64, f64) {
    let s = u + v;
    let up = s - v;
    let vpp = s - up;
    (s, -((up - u) + (vpp - v)))
}

/// `e * atanh(e * x)`, with `es` negative for prolate ellipsoids.
fn eatanhe(x: f64, es: f64) -> f64 {
    if es > 0.0 {
        es * (es * x).atanh()
    } else {
        -es * (-es * x).atan()
    }
}

/// tan(phi) to tan(chi), geodetic to conformal latitude.
pub(crate) fn taupf(tau: f64, es: f64) -> f64 {
    let tau1 = tau.hypot(1.0);
    let sig = eatanhe(tau / tau1, es).sinh();
    sig.hypot(1.0) * tau - sig * tau1
}

/// tan(chi) to tan(phi), solved by Newton iteration.
pub(crate) fn tauf(taup: f64, es: f64) -> f64 {
    const MAX_ITER: usize = 8;
    let tol = f64::EPSILON.sqrt() / 10.0;

    let e2m = 1.0 - es * es;
    let mut tau = taup / e2m;
    let stol = tol * taup.abs().max(1.0);
    for _ in 0..MAX_ITER {
        let taupa = taupf(tau, es);
        let dtau = (taup - taupa) * (1.0 + e2m * tau * tau)
            / (e2m * tau.hypot(1.0) * taupa.hypot(1.0));
        tau += dtau;
        if dtau.abs() < stol {
            break;
        }
    }
    tau
}

/// Reduce an angle in degrees to [-180, 180).
pub(crate) fn ang_normalize(x: f64) -> f64 {
    let mut x = x % 360.0;
    if x < -180.0 {
        x += 360.0;
    } else if x >= 180.0 {
        x -= 360.0;
    }
    x
}

/// Exact difference `y - x` of two angles, reduced to [-180, 180).
pub(crate) fn ang_diff(x: f64, y: f64) -> f64 {
    let (d, t) = two_sum(ang_normalize(-x), ang_normalize(y));
    ang_normalize(d) + t
}

/// Sine and cosine of an angle in degrees, exact at multiples of 90.
pub(crate) fn sincosd(x: f64) -> (f64, f64) {
    let mut r = x % 360.0;
    if r < 0.0 {
        r += 360.0;
    }
    let q = (r / 90.0 + 0.5).floor() as i32;
    r -= 90.0 * f64::from(q);
    let (s, c) = r.to_radians().sin_cos();
    match q & 3 {
        0 => (s, c),
        1 => (c, -s),
        2 => (-s, -c),
        _ => (-c, s),
    }
}

/// Horner evaluation; `coeffs` are ordered from the highest power down.
pub(crate) fn polyval(coeffs: &[f64], x: f64) -> f64 {
    coeffs.iter().fold(0.0, |acc, &c| acc * x + c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conformal_latitude_round_trip() {
        let es = 0.081_819_190_842_6;
        for lat in [-89.0_f64, -37.5, 0.0, 12.25, 60.0, 89.0] {
            let tau = lat.to_radians().tan();
            let back = tauf(taupf(tau, es), es);
            assert!((tau - back).abs() <= 1e-12 * tau.abs().max(1.0), "lat {}", lat);
        }
    }

    #[test]
    fn test_ang_normalize() {
        assert_eq!(ang_normalize(190.0), -170.0);
        assert_eq!(ang_normalize(-190.0), 170.0);
        assert_eq!(ang_normalize(180.0), -180.0);
        assert_eq!(ang_normalize(45.0), 45.0);
    }

    #[test]
    fn test_ang_diff_wraps() {
        assert!((ang_diff(179.0, -179.0) - 2.0).abs() < 1e-12);
        assert!((ang_diff(127.0, 125.0) + 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_sincosd_quadrants() {
        let (s, c) = sincosd(90.0);
        assert_eq!((s, c), (1.0, 0.0));
        let (s, c) = sincosd(-90.0);
        assert_eq!(s, -1.0);
        assert!(c.abs() < 1e-15);
    }

    #[test]
    fn test_polyval() {
        // 2x^2 + 3x + 4 at x = 2
        assert_eq!(polyval(&[2.0, 3.0, 4.0], 2.0), 18.0);
    }
}
