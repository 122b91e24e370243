//! Default symbology.
//!
//! Styles are opaque references owned by the desktop shell. The engine only
//! needs a stable default look per layer: a `#rrggbb` style is used as the
//! colour directly, anything else is hashed onto a fixed palette.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Colours picked for readability on a light background.
const PALETTE: [[u8; 3]; 8] = [
    [31, 119, 180],
    [214, 39, 40],
    [44, 160, 44],
    [148, 103, 189],
    [255, 127, 14],
    [23, 190, 207],
    [140, 86, 75],
    [227, 119, 194],
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Symbol {
    /// Stroke colour, RGB.
    pub stroke: [u8; 3],
    /// Polygon fill alpha over the stroke colour.
    pub fill_alpha: u8,
    pub stroke_width: f32,
    pub point_radius: f32,
}

fn parse_hex(style: &str) -> Option<[u8; 3]> {
    let hex = style.trim().strip_prefix('#')?;
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some([channel(0)?, channel(2)?, channel(4)?])
}

impl Symbol {
    /// Symbol for a layer style reference, falling back to the layer name
    /// when the layer has no style.
    pub fn for_style(style: Option<&str>, layer_name: &str) -> Self {
        let key = style.unwrap_or(layer_name);
        let stroke = parse_hex(key).unwrap_or_else(|| {
            let mut hasher = DefaultHasher::new();
            key.hash(&mut hasher);
            PALETTE[(hasher.finish() % PALETTE.len() as u64) as usize]
        });
        Self {
            stroke,
            fill_alpha: 96,
            stroke_width: 1.5,
            point_radius: 3.0,
        }
    }
}
