//! Raster surface painted by the render engine.
//!
//! Geometry is converted to pixel coordinates in `f64` before it reaches
//! tiny-skia, so large projected coordinates never pass through `f32`.

use image::RgbaImage;
use tiny_skia::{
    Color, FillRule, FilterQuality, Paint, PathBuilder, Pixmap, PixmapPaint,
    PremultipliedColorU8, Stroke, Transform,
};
use tracing::trace;

use super::{RenderError, Symbol};
use crate::geometry::{BoundingBox, Coord, Feature, Shape};

/// A pixmap bound to the world extent it shows.
pub struct Surface {
    pixmap: Pixmap,
    extent: BoundingBox,
    /// World units per pixel.
    res: f64,
}

impl Surface {
    pub fn new(width: u32, height: u32, extent: BoundingBox) -> Result<Self, RenderError> {
        let pixmap = Pixmap::new(width, height).ok_or(RenderError::Surface { width, height })?;
        Ok(Self {
            pixmap,
            res: extent.width() / f64::from(width.max(1)),
            extent,
        })
    }

    pub fn extent(&self) -> BoundingBox {
        self.extent
    }

    pub fn fill(&mut self, rgba: [u8; 4]) {
        self.pixmap
            .fill(Color::from_rgba8(rgba[0], rgba[1], rgba[2], rgba[3]));
    }

    fn to_px(&self, c: &Coord) -> (f32, f32) {
        (
            ((c.x - self.extent.min_x) / self.res) as f32,
            ((self.extent.max_y - c.y) / self.res) as f32,
        )
    }

    /// Map a world box onto this surface: scale then translate.
    fn placement(&self, extent: &BoundingBox, width: u32, height: u32) -> Transform {
        let sx = (extent.width() / self.res) / f64::from(width.max(1));
        let sy = (extent.height() / self.res) / f64::from(height.max(1));
        let tx = (extent.min_x - self.extent.min_x) / self.res;
        let ty = (self.extent.max_y - extent.max_y) / self.res;
        Transform::from_row(sx as f32, 0.0, 0.0, sy as f32, tx as f32, ty as f32)
    }

    fn add_ring(&self, pb: &mut PathBuilder, ring: &[Coord], close: bool) {
        let mut points = ring.iter().map(|c| self.to_px(c));
        let Some((x, y)) = points.next() else {
            return;
        };
        pb.move_to(x, y);
        for (x, y) in points {
            pb.line_to(x, y);
        }
        if close {
            pb.close();
        }
    }

    fn paint_polygons<'a>(
        &mut self,
        polygons: impl Iterator<Item = &'a Vec<Vec<Coord>>>,
        fill: &Paint<'_>,
        stroke_paint: &Paint<'_>,
        stroke: &Stroke,
    ) {
        let mut pb = PathBuilder::new();
        for rings in polygons {
            for ring in rings {
                self.add_ring(&mut pb, ring, true);
            }
        }
        if let Some(path) = pb.finish() {
            self.pixmap
                .fill_path(&path, fill, FillRule::EvenOdd, Transform::identity(), None);
            self.pixmap
                .stroke_path(&path, stroke_paint, stroke, Transform::identity(), None);
        }
    }

    fn paint_lines<'a>(
        &mut self,
        lines: impl Iterator<Item = &'a Vec<Coord>>,
        paint: &Paint<'_>,
        stroke: &Stroke,
    ) {
        let mut pb = PathBuilder::new();
        for line in lines {
            self.add_ring(&mut pb, line, false);
        }
        if let Some(path) = pb.finish() {
            self.pixmap
                .stroke_path(&path, paint, stroke, Transform::identity(), None);
        }
    }

    fn paint_points<'a>(
        &mut self,
        points: impl Iterator<Item = &'a Coord>,
        radius: f32,
        paint: &Paint<'_>,
    ) {
        let mut pb = PathBuilder::new();
        for p in points {
            let (x, y) = self.to_px(p);
            pb.push_circle(x, y, radius);
        }
        if let Some(path) = pb.finish() {
            self.pixmap
                .fill_path(&path, paint, FillRule::Winding, Transform::identity(), None);
        }
    }

    /// Paint features already in this surface's CRS.
    pub fn paint_features(&mut self, features: &[Feature], symbol: &Symbol) {
        let [r, g, b] = symbol.stroke;
        let mut stroke_paint = Paint::default();
        stroke_paint.set_color_rgba8(r, g, b, 255);
        stroke_paint.anti_alias = true;
        let mut fill_paint = stroke_paint.clone();
        fill_paint.set_color_rgba8(r, g, b, symbol.fill_alpha);
        let stroke = Stroke {
            width: symbol.stroke_width,
            ..Stroke::default()
        };

        for feature in features {
            match feature.geometry.shape() {
                Shape::Point(p) => {
                    self.paint_points(std::iter::once(p), symbol.point_radius, &stroke_paint)
                }
                Shape::MultiPoint(points) => {
                    self.paint_points(points.iter(), symbol.point_radius, &stroke_paint)
                }
                Shape::LineString(line) => {
                    self.paint_lines(std::iter::once(line), &stroke_paint, &stroke)
                }
                Shape::MultiLineString(lines) => {
                    self.paint_lines(lines.iter(), &stroke_paint, &stroke)
                }
                Shape::Polygon(rings) => self.paint_polygons(
                    std::iter::once(rings),
                    &fill_paint,
                    &stroke_paint,
                    &stroke,
                ),
                Shape::MultiPolygon(polygons) => {
                    self.paint_polygons(polygons.iter(), &fill_paint, &stroke_paint, &stroke)
                }
                Shape::RasterGrid(grid) => {
                    let e = grid.extent;
                    let outline = vec![
                        Coord::new(e.min_x, e.min_y),
                        Coord::new(e.max_x, e.min_y),
                        Coord::new(e.max_x, e.max_y),
                        Coord::new(e.min_x, e.max_y),
                        Coord::new(e.min_x, e.min_y),
                    ];
                    self.paint_lines(std::iter::once(&outline), &stroke_paint, &stroke);
                }
            }
        }
        trace!(features = features.len(), "Painted features");
    }

    /// Draw an image covering `extent` (in this surface's CRS).
    pub fn paint_image(&mut self, image: &RgbaImage, extent: &BoundingBox) {
        let Some(source) = pixmap_from_rgba(image) else {
            return;
        };
        let transform = self.placement(extent, image.width(), image.height());
        self.pixmap.draw_pixmap(
            0,
            0,
            source.as_ref(),
            &PixmapPaint {
                quality: FilterQuality::Bilinear,
                ..PixmapPaint::default()
            },
            transform,
            None,
        );
    }

    /// Composite another pixmap that shows `extent`, with `opacity`.
    ///
    /// When `extent` differs from this surface's extent the pixmap is
    /// scaled and shifted, which is how a previous frame stays on screen
    /// while the new one loads.
    pub fn draw_pixmap(&mut self, pixmap: &Pixmap, extent: &BoundingBox, opacity: f32) {
        let transform = self.placement(extent, pixmap.width(), pixmap.height());
        self.pixmap.draw_pixmap(
            0,
            0,
            pixmap.as_ref(),
            &PixmapPaint {
                opacity: opacity.clamp(0.0, 1.0),
                quality: FilterQuality::Bilinear,
                ..PixmapPaint::default()
            },
            transform,
            None,
        );
    }

    pub fn into_pixmap(self) -> Pixmap {
        self.pixmap
    }
}

/// Convert straight-alpha RGBA into a premultiplied pixmap.
pub fn pixmap_from_rgba(image: &RgbaImage) -> Option<Pixmap> {
    let mut pixmap = Pixmap::new(image.width(), image.height())?;
    for (dst, src) in pixmap.pixels_mut().iter_mut().zip(image.pixels()) {
        let [r, g, b, a] = src.0;
        *dst = tiny_skia::ColorU8::from_rgba(r, g, b, a).premultiply();
    }
    Some(pixmap)
}

/// Straight-alpha RGBA of one pixel.
pub fn pixel_rgba(pixmap: &Pixmap, x: u32, y: u32) -> Option<[u8; 4]> {
    let p: PremultipliedColorU8 = pixmap.pixel(x, y)?;
    let c = p.demultiply();
    Some([c.red(), c.green(), c.blue(), c.alpha()])
}
