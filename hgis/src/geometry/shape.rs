//! Coordinates, shapes and CRS-tagged geometries.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::BoundingBox;
use crate::crs::CrsId;

/// A position in some CRS. `z` is carried through reprojection when present.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coord {
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
}

impl Coord {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: None }
    }

    pub const fn with_z(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z: Some(z) }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_none_or(f64::is_finite)
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.z {
            Some(z) => write!(f, "({}, {}, {})", self.x, self.y, z),
            None => write!(f, "({}, {})", self.x, self.y),
        }
    }
}

/// Regular grid of cells covering `extent`, the footprint of a raster.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RasterGrid {
    pub extent: BoundingBox,
    pub columns: u32,
    pub rows: u32,
}

impl RasterGrid {
    pub fn cell_width(&self) -> f64 {
        self.extent.width() / f64::from(self.columns.max(1))
    }

    pub fn cell_height(&self) -> f64 {
        self.extent.height() / f64::from(self.rows.max(1))
    }
}

/// Coordinate layout of a geometry, independent of its CRS.
///
/// Polygon rings are closed sequences; the first ring is the exterior and
/// any further rings are holes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Shape {
    Point(Coord),
    MultiPoint(Vec<Coord>),
    LineString(Vec<Coord>),
    MultiLineString(Vec<Vec<Coord>>),
    Polygon(Vec<Vec<Coord>>),
    MultiPolygon(Vec<Vec<Vec<Coord>>>),
    RasterGrid(RasterGrid),
}

/// Geometry type tag, as reported by data sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeometryType {
    Point,
    MultiPoint,
    LineString,
    MultiLineString,
    Polygon,
    MultiPolygon,
    RasterGrid,
}

impl fmt::Display for GeometryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GeometryType::Point => "Point",
            GeometryType::MultiPoint => "MultiPoint",
            GeometryType::LineString => "LineString",
            GeometryType::MultiLineString => "MultiLineString",
            GeometryType::Polygon => "Polygon",
            GeometryType::MultiPolygon => "MultiPolygon",
            GeometryType::RasterGrid => "RasterGrid",
        };
        f.write_str(name)
    }
}

impl Shape {
    pub fn geometry_type(&self) -> GeometryType {
        match self {
            Shape::Point(_) => GeometryType::Point,
            Shape::MultiPoint(_) => GeometryType::MultiPoint,
            Shape::LineString(_) => GeometryType::LineString,
            Shape::MultiLineString(_) => GeometryType::MultiLineString,
            Shape::Polygon(_) => GeometryType::Polygon,
            Shape::MultiPolygon(_) => GeometryType::MultiPolygon,
            Shape::RasterGrid(_) => GeometryType::RasterGrid,
        }
    }

    /// Visit every vertex. Raster grids visit their four extent corners.
    pub fn for_each_coord(&self, mut f: impl FnMut(&Coord)) {
        match self {
            Shape::Point(c) => f(c),
            Shape::MultiPoint(cs) | Shape::LineString(cs) => cs.iter().for_each(f),
            Shape::MultiLineString(parts) | Shape::Polygon(parts) => {
                parts.iter().flatten().for_each(f)
            }
            Shape::MultiPolygon(polys) => polys.iter().flatten().flatten().for_each(f),
            Shape::RasterGrid(grid) => {
                let e = grid.extent;
                for c in [
                    Coord::new(e.min_x, e.min_y),
                    Coord::new(e.max_x, e.min_y),
                    Coord::new(e.max_x, e.max_y),
                    Coord::new(e.min_x, e.max_y),
                ] {
                    f(&c);
                }
            }
        }
    }

    pub fn coord_count(&self) -> usize {
        let mut n = 0;
        self.for_each_coord(|_| n += 1);
        n
    }

    pub fn bbox(&self) -> Option<BoundingBox> {
        let mut bbox: Option<BoundingBox> = None;
        self.for_each_coord(|c| match bbox.as_mut() {
            Some(b) => b.expand_to_include(c.x, c.y),
            None => bbox = Some(BoundingBox::new(c.x, c.y, c.x, c.y)),
        });
        bbox
    }

    /// Build a new shape by mapping every vertex through `f`.
    ///
    /// Raster grids are not vertex-based and are returned unchanged; callers
    /// that reproject rasters transform the grid extent separately.
    pub fn try_map_coords<E>(
        &self,
        mut f: impl FnMut(Coord) -> Result<Coord, E>,
    ) -> Result<Shape, E> {
        fn map_seq<E>(
            seq: &[Coord],
            f: &mut impl FnMut(Coord) -> Result<Coord, E>,
        ) -> Result<Vec<Coord>, E> {
            seq.iter().map(|c| f(*c)).collect()
        }

        Ok(match self {
            Shape::Point(c) => Shape::Point(f(*c)?),
            Shape::MultiPoint(cs) => Shape::MultiPoint(map_seq(cs, &mut f)?),
            Shape::LineString(cs) => Shape::LineString(map_seq(cs, &mut f)?),
            Shape::MultiLineString(parts) => Shape::MultiLineString(
                parts
                    .iter()
                    .map(|p| map_seq(p, &mut f))
                    .collect::<Result<_, _>>()?,
            ),
            Shape::Polygon(rings) => Shape::Polygon(
                rings
                    .iter()
                    .map(|r| map_seq(r, &mut f))
                    .collect::<Result<_, _>>()?,
            ),
            Shape::MultiPolygon(polys) => Shape::MultiPolygon(
                polys
                    .iter()
                    .map(|rings| {
                        rings
                            .iter()
                            .map(|r| map_seq(r, &mut f))
                            .collect::<Result<Vec<_>, _>>()
                    })
                    .collect::<Result<_, _>>()?,
            ),
            Shape::RasterGrid(grid) => Shape::RasterGrid(*grid),
        })
    }
}

/// A shape together with the CRS its coordinates are expressed in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    shape: Shape,
    crs: CrsId,
}

impl Geometry {
    pub fn new(shape: Shape, crs: CrsId) -> Self {
        Self { shape, crs }
    }

    pub fn point(x: f64, y: f64, crs: CrsId) -> Self {
        Self::new(Shape::Point(Coord::new(x, y)), crs)
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn crs(&self) -> &CrsId {
        &self.crs
    }

    pub fn geometry_type(&self) -> GeometryType {
        self.shape.geometry_type()
    }

    pub fn bbox(&self) -> Option<BoundingBox> {
        self.shape.bbox()
    }

    pub fn into_parts(self) -> (Shape, CrsId) {
        (self.shape, self.crs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Vec<Coord> {
        vec![
            Coord::new(0.0, 0.0),
            Coord::new(2.0, 0.0),
            Coord::new(2.0, 3.0),
            Coord::new(0.0, 3.0),
            Coord::new(0.0, 0.0),
        ]
    }

    #[test]
    fn test_polygon_bbox() {
        let shape = Shape::Polygon(vec![square()]);
        assert_eq!(shape.bbox(), Some(BoundingBox::new(0.0, 0.0, 2.0, 3.0)));
        assert_eq!(shape.coord_count(), 5);
    }

    #[test]
    fn test_try_map_coords_preserves_structure() {
        let shape = Shape::MultiPolygon(vec![vec![square()], vec![square(), square()]]);
        let shifted = shape
            .try_map_coords::<()>(|c| Ok(Coord::new(c.x + 10.0, c.y)))
            .unwrap();

        match shifted {
            Shape::MultiPolygon(polys) => {
                assert_eq!(polys.len(), 2);
                assert_eq!(polys[1].len(), 2);
                assert_eq!(polys[1][1][1], Coord::new(12.0, 0.0));
            }
            other => panic!("unexpected shape {:?}", other),
        }
    }

    #[test]
    fn test_try_map_coords_stops_on_error() {
        let shape = Shape::LineString(square());
        let mut visited = 0;
        let result = shape.try_map_coords(|c| {
            visited += 1;
            if c.y > 0.0 {
                Err("out")
            } else {
                Ok(c)
            }
        });
        assert_eq!(result, Err("out"));
        assert_eq!(visited, 3);
    }

    #[test]
    fn test_raster_grid_cell_size() {
        let grid = RasterGrid {
            extent: BoundingBox::new(0.0, 0.0, 100.0, 50.0),
            columns: 10,
            rows: 5,
        };
        assert_eq!(grid.cell_width(), 10.0);
        assert_eq!(grid.cell_height(), 10.0);
        assert_eq!(Shape::RasterGrid(grid).bbox(), Some(grid.extent));
    }
}
