//! Formatting helpers for the status bar.

use crate::crs::Units;
use crate::geometry::Coord;

/// Insert `,` between groups of three digits: `25000` becomes `25,000`.
pub fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Format a scale denominator as `1:25,000`.
///
/// # Examples
/// ```
/// use hgis::status::format_scale;
/// assert_eq!(format_scale(24_999.6), "1:25,000");
/// ```
pub fn format_scale(scale: f64) -> String {
    if !scale.is_finite() || scale <= 0.0 {
        return "1:?".to_string();
    }
    format!("1:{}", group_thousands(scale.round().max(1.0) as u64))
}

/// Format a coordinate for display: six decimals for degrees, two for
/// metres.
pub fn format_coordinate(c: Coord, units: Units) -> String {
    match units {
        Units::Degrees => format!("{:.6}, {:.6}", c.x, c.y),
        Units::Metres => format!("{:.2}, {:.2}", c.x, c.y),
    }
}
