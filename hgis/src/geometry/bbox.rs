//! Axis-aligned bounding boxes.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::Coord;

/// Axis-aligned bounding box in the units of some CRS.
///
/// A box with `min == max` on an axis is valid (a point or a vertical line
/// has zero extent on one axis); a box with `min > max` is never constructed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// Create a box from two opposite corners, in any order.
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self {
            min_x: x1.min(x2),
            min_y: y1.min(y2),
            max_x: x1.max(x2),
            max_y: y1.max(y2),
        }
    }

    /// Smallest box enclosing all coordinates, or `None` for an empty input.
    pub fn from_coords<'a>(coords: impl IntoIterator<Item = &'a Coord>) -> Option<Self> {
        let mut iter = coords.into_iter();
        let first = iter.next()?;
        let mut bbox = Self::new(first.x, first.y, first.x, first.y);
        for c in iter {
            bbox.expand_to_include(c.x, c.y);
        }
        Some(bbox)
    }

    /// Box centred on `center` with the given width and height.
    pub fn from_center(center: Coord, width: f64, height: f64) -> Self {
        Self::new(
            center.x - width / 2.0,
            center.y - height / 2.0,
            center.x + width / 2.0,
            center.y + height / 2.0,
        )
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn center(&self) -> Coord {
        Coord::new(
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    /// True when every bound is finite and the box has a positive area.
    pub fn is_valid_extent(&self) -> bool {
        [self.min_x, self.min_y, self.max_x, self.max_y]
            .iter()
            .all(|v| v.is_finite())
            && self.width() > 0.0
            && self.height() > 0.0
    }

    /// Closed-interval intersection test (touching boxes intersect).
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    pub fn contains_box(&self, other: &BoundingBox) -> bool {
        self.contains(other.min_x, other.min_y) && self.contains(other.max_x, other.max_y)
    }

    /// Overlapping region of two boxes, if any.
    pub fn intersection(&self, other: &BoundingBox) -> Option<BoundingBox> {
        if !self.intersects(other) {
            return None;
        }
        Some(BoundingBox {
            min_x: self.min_x.max(other.min_x),
            min_y: self.min_y.max(other.min_y),
            max_x: self.max_x.min(other.max_x),
            max_y: self.max_y.min(other.max_y),
        })
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    pub fn expand_to_include(&mut self, x: f64, y: f64) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    /// Grow the box by `ratio` of its size on every side.
    pub fn buffered(&self, ratio: f64) -> BoundingBox {
        let dx = self.width() * ratio;
        let dy = self.height() * ratio;
        BoundingBox {
            min_x: self.min_x - dx,
            min_y: self.min_y - dy,
            max_x: self.max_x + dx,
            max_y: self.max_y + dy,
        }
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}, {}, {}]",
            self.min_x, self.min_y, self.max_x, self.max_y
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_normalizes_corners() {
        let bbox = BoundingBox::new(10.0, 5.0, -2.0, 1.0);
        assert_eq!(bbox.min_x, -2.0);
        assert_eq!(bbox.min_y, 1.0);
        assert_eq!(bbox.max_x, 10.0);
        assert_eq!(bbox.max_y, 5.0);
    }

    #[test]
    fn test_touching_boxes_intersect() {
        let a = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        let b = BoundingBox::new(1.0, 1.0, 2.0, 2.0);
        assert!(a.intersects(&b));
        assert!(!a.intersects(&BoundingBox::new(1.5, 1.5, 2.0, 2.0)));
    }

    #[test]
    fn test_intersection_and_union() {
        let a = BoundingBox::new(0.0, 0.0, 4.0, 4.0);
        let b = BoundingBox::new(2.0, 1.0, 6.0, 3.0);
        assert_eq!(a.intersection(&b), Some(BoundingBox::new(2.0, 1.0, 4.0, 3.0)));
        assert_eq!(a.union(&b), BoundingBox::new(0.0, 0.0, 6.0, 4.0));
    }

    #[test]
    fn test_from_coords_empty_is_none() {
        let coords: Vec<Coord> = Vec::new();
        assert!(BoundingBox::from_coords(&coords).is_none());
    }

    #[test]
    fn test_point_box_is_not_valid_extent() {
        let c = Coord::new(127.0, 37.5);
        let bbox = BoundingBox::from_coords([&c]).unwrap();
        assert!(!bbox.is_valid_extent());
        assert!(bbox.contains(127.0, 37.5));
    }
}
