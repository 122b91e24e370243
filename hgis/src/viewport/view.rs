use serde::{Deserialize, Serialize};
use tracing::trace;

use super::ViewportError;
use crate::crs::{registry, CrsEngine, CrsId};
use crate::geometry::{BoundingBox, Coord};

/// OGC standardized rendering pixel size in metres (0.28 mm).
pub const OGC_PIXEL_SIZE_M: f64 = 0.00028;

/// A position on the screen in pixels, origin top-left, y growing down.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

impl ScreenPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Scale bounds and zoom step applied by the interactive operations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewLimits {
    /// Most zoomed-in scale denominator.
    pub min_scale: f64,
    /// Most zoomed-out scale denominator.
    pub max_scale: f64,
    /// Step used by [`Viewport::zoom_in`] and [`Viewport::zoom_out`].
    pub zoom_factor: f64,
}

impl Default for ViewLimits {
    fn default() -> Self {
        Self {
            min_scale: 50.0,
            max_scale: 500_000_000.0,
            zoom_factor: 1.2,
        }
    }
}

impl ViewLimits {
    fn clamp(&self, scale: f64) -> f64 {
        scale.clamp(self.min_scale, self.max_scale)
    }
}

/// The persisted part of a viewport.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewState {
    pub extent: BoundingBox,
    /// Scale denominator at save time. Informational: the extent and pixel
    /// size are authoritative on restore.
    pub scale: f64,
    pub width: u32,
    pub height: u32,
}

/// Visible extent, pixel size and derived scale of the map view.
#[derive(Debug, Clone, PartialEq)]
pub struct Viewport {
    crs: CrsId,
    meters_per_unit: f64,
    extent: BoundingBox,
    width: u32,
    height: u32,
    limits: ViewLimits,
    generation: u64,
}

impl Viewport {
    /// Create a viewport showing at least `extent`.
    ///
    /// The extent is widened on its short side to match the pixel aspect
    /// ratio.
    pub fn new(
        crs: CrsId,
        extent: BoundingBox,
        width: u32,
        height: u32,
    ) -> Result<Self, ViewportError> {
        let meters_per_unit = registry::lookup(&crs)?.meters_per_unit();
        check_size(width, height)?;
        let mut viewport = Self {
            crs,
            meters_per_unit,
            extent,
            width,
            height,
            limits: ViewLimits::default(),
            generation: 0,
        };
        viewport.extent = viewport.fit(&extent)?;
        Ok(viewport)
    }

    /// Rebuild a viewport from a saved [`ViewState`].
    pub fn from_state(crs: CrsId, state: &ViewState) -> Result<Self, ViewportError> {
        Self::new(crs, state.extent, state.width, state.height)
    }

    pub fn with_limits(mut self, limits: ViewLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn state(&self) -> ViewState {
        ViewState {
            extent: self.extent,
            scale: self.scale(),
            width: self.width,
            height: self.height,
        }
    }

    pub fn crs(&self) -> &CrsId {
        &self.crs
    }

    pub fn extent(&self) -> BoundingBox {
        self.extent
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn limits(&self) -> &ViewLimits {
        &self.limits
    }

    /// Counter bumped on every change; redraws are tagged with it.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn center(&self) -> Coord {
        self.extent.center()
    }

    /// World units per pixel.
    pub fn resolution(&self) -> f64 {
        self.extent.width() / f64::from(self.width)
    }

    /// Scale denominator: ground metres per pixel over the 0.28 mm pixel.
    pub fn scale(&self) -> f64 {
        self.resolution() * self.meters_per_unit / OGC_PIXEL_SIZE_M
    }

    fn resolution_for_scale(&self, scale: f64) -> f64 {
        scale * OGC_PIXEL_SIZE_M / self.meters_per_unit
    }

    fn changed(&mut self, extent: BoundingBox) {
        self.extent = extent;
        self.generation += 1;
        trace!(
            generation = self.generation,
            extent = %self.extent,
            scale = self.scale(),
            "Viewport changed"
        );
    }

    /// Smallest extent containing `extent` with the viewport's aspect ratio.
    fn fit(&self, extent: &BoundingBox) -> Result<BoundingBox, ViewportError> {
        if !extent.is_valid_extent() {
            return Err(ViewportError::InvalidExtent(extent.to_string()));
        }
        let aspect = f64::from(self.width) / f64::from(self.height);
        let (w, h) = (extent.width(), extent.height());
        if ((w / h) - aspect).abs() <= aspect * 1e-12 {
            return Ok(*extent);
        }
        let (w, h) = if w / h < aspect {
            (h * aspect, h)
        } else {
            (w, w / aspect)
        };
        Ok(BoundingBox::from_center(extent.center(), w, h))
    }

    /// Show `extent`, widening its short side to keep square pixels.
    /// The scale limits are not applied.
    pub fn set_extent(&mut self, extent: BoundingBox) -> Result<(), ViewportError> {
        let fitted = self.fit(&extent)?;
        self.changed(fitted);
        Ok(())
    }

    /// Fit `extent` into the view, then clamp the scale to the limits.
    pub fn zoom_to(&mut self, extent: BoundingBox) -> Result<(), ViewportError> {
        let fitted = self.fit(&extent)?;
        let res = fitted.width() / f64::from(self.width);
        let scale = res * self.meters_per_unit / OGC_PIXEL_SIZE_M;
        let clamped = self.limits.clamp(scale);
        let fitted = if clamped == scale {
            fitted
        } else {
            let res = self.resolution_for_scale(clamped);
            BoundingBox::from_center(
                fitted.center(),
                res * f64::from(self.width),
                res * f64::from(self.height),
            )
        };
        self.changed(fitted);
        Ok(())
    }

    /// Move the map content by a pixel delta, as a mouse drag does:
    /// dragging right reveals what lies to the west.
    pub fn pan(&mut self, dx_px: f64, dy_px: f64) {
        if dx_px == 0.0 && dy_px == 0.0 {
            return;
        }
        let res = self.resolution();
        let (dx, dy) = (-dx_px * res, dy_px * res);
        let e = self.extent;
        self.changed(BoundingBox::new(
            e.min_x + dx,
            e.min_y + dy,
            e.max_x + dx,
            e.max_y + dy,
        ));
    }

    /// Centre the view on a world coordinate, keeping the scale.
    pub fn pan_to(&mut self, center: Coord) {
        let extent = BoundingBox::from_center(center, self.extent.width(), self.extent.height());
        if extent != self.extent {
            self.changed(extent);
        }
    }

    /// Zoom by `factor` (> 1 zooms in) keeping the world point under
    /// `anchor` fixed on screen. The resulting scale is clamped to the
    /// limits.
    pub fn zoom(&mut self, factor: f64, anchor: ScreenPoint) -> Result<(), ViewportError> {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(ViewportError::InvalidScale(format!(
                "zoom factor {} must be positive",
                factor
            )));
        }
        let current = self.scale();
        let target = self.limits.clamp(current / factor);
        if (target - current).abs() <= current * 1e-9 {
            return Ok(());
        }
        let anchor_world = self.screen_to_world(anchor);
        let res = self.resolution_for_scale(target);
        let min_x = anchor_world.x - anchor.x * res;
        let max_y = anchor_world.y + anchor.y * res;
        self.changed(BoundingBox::new(
            min_x,
            max_y - res * f64::from(self.height),
            min_x + res * f64::from(self.width),
            max_y,
        ));
        Ok(())
    }

    fn screen_center(&self) -> ScreenPoint {
        ScreenPoint::new(f64::from(self.width) / 2.0, f64::from(self.height) / 2.0)
    }

    pub fn zoom_in(&mut self) {
        let (factor, anchor) = (self.limits.zoom_factor, self.screen_center());
        // The zoom factor is validated when the limits are loaded.
        let _ = self.zoom(factor, anchor);
    }

    pub fn zoom_out(&mut self) {
        let (factor, anchor) = (1.0 / self.limits.zoom_factor, self.screen_center());
        let _ = self.zoom(factor, anchor);
    }

    /// Set the scale denominator around the current centre, clamped to the
    /// limits.
    pub fn set_scale(&mut self, scale: f64) -> Result<(), ViewportError> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(ViewportError::InvalidScale(format!(
                "scale denominator {} must be positive",
                scale
            )));
        }
        let res = self.resolution_for_scale(self.limits.clamp(scale));
        let extent = BoundingBox::from_center(
            self.center(),
            res * f64::from(self.width),
            res * f64::from(self.height),
        );
        if extent != self.extent {
            self.changed(extent);
        }
        Ok(())
    }

    /// Change the pixel size, keeping the centre and the scale.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), ViewportError> {
        check_size(width, height)?;
        if (width, height) == (self.width, self.height) {
            return Ok(());
        }
        let res = self.resolution();
        let center = self.center();
        self.width = width;
        self.height = height;
        self.changed(BoundingBox::from_center(
            center,
            res * f64::from(width),
            res * f64::from(height),
        ));
        Ok(())
    }

    /// Switch the project CRS, reprojecting the visible extent.
    pub fn set_crs(&mut self, crs: CrsId, engine: &CrsEngine) -> Result<(), ViewportError> {
        if crs == self.crs {
            return Ok(());
        }
        let meters_per_unit = registry::lookup(&crs)?.meters_per_unit();
        let extent = engine.transform_bbox(&self.extent, &self.crs, &crs)?;
        self.crs = crs;
        self.meters_per_unit = meters_per_unit;
        self.set_extent(extent)
    }

    pub fn screen_to_world(&self, p: ScreenPoint) -> Coord {
        let res = self.resolution();
        Coord::new(self.extent.min_x + p.x * res, self.extent.max_y - p.y * res)
    }

    pub fn world_to_screen(&self, c: Coord) -> ScreenPoint {
        let res = self.resolution();
        ScreenPoint::new(
            (c.x - self.extent.min_x) / res,
            (self.extent.max_y - c.y) / res,
        )
    }
}

fn check_size(width: u32, height: u32) -> Result<(), ViewportError> {
    if width == 0 || height == 0 {
        return Err(ViewportError::InvalidSize { width, height });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seoul() -> Viewport {
        // 8 km x 6 km in Korea 2000 / Central Belt 2010 at 800x600.
        Viewport::new(
            CrsId::epsg(5186),
            BoundingBox::new(196_000.0, 548_000.0, 204_000.0, 554_000.0),
            800,
            600,
        )
        .unwrap()
    }

    fn assert_close(a: f64, b: f64, tol: f64) {
        assert!((a - b).abs() <= tol, "{} != {} (tol {})", a, b, tol);
    }

    #[test]
    fn test_scale_matches_extent_and_pixels() {
        let vp = seoul();
        // 10 m per pixel / 0.28 mm.
        assert_close(vp.resolution(), 10.0, 1e-9);
        assert_close(vp.scale(), 10.0 / OGC_PIXEL_SIZE_M, 1e-6);
        assert_close(
            vp.extent().width(),
            vp.scale() * OGC_PIXEL_SIZE_M * f64::from(vp.width()),
            1e-6,
        );
    }

    #[test]
    fn test_geographic_scale_uses_metres_per_degree() {
        let vp = Viewport::new(
            CrsId::epsg(4326),
            BoundingBox::new(126.0, 37.0, 128.0, 38.5),
            800,
            600,
        )
        .unwrap();
        let expected = (2.0 / 800.0) * registry::METERS_PER_DEGREE / OGC_PIXEL_SIZE_M;
        assert_close(vp.scale(), expected, 1e-3);
    }

    #[test]
    fn test_zoom_keeps_center_fixed() {
        let mut vp = seoul();
        let before = vp.center();
        let scale = vp.scale();
        vp.zoom(2.0, ScreenPoint::new(400.0, 300.0)).unwrap();
        assert_close(vp.center().x, before.x, 1e-6);
        assert_close(vp.center().y, before.y, 1e-6);
        assert_close(vp.scale(), scale / 2.0, 1e-6);
    }

    #[test]
    fn test_zoom_is_anchored() {
        let mut vp = seoul();
        let anchor = ScreenPoint::new(120.0, 455.0);
        let world = vp.screen_to_world(anchor);
        vp.zoom(3.5, anchor).unwrap();
        let after = vp.screen_to_world(anchor);
        assert_close(after.x, world.x, 1e-6);
        assert_close(after.y, world.y, 1e-6);

        vp.zoom(0.25, anchor).unwrap();
        let after = vp.screen_to_world(anchor);
        assert_close(after.x, world.x, 1e-6);
        assert_close(after.y, world.y, 1e-6);
    }

    #[test]
    fn test_zoom_clamps_to_limits() {
        let mut vp = seoul().with_limits(ViewLimits {
            min_scale: 10_000.0,
            max_scale: 100_000.0,
            zoom_factor: 1.2,
        });
        vp.zoom(100.0, ScreenPoint::new(0.0, 0.0)).unwrap();
        assert_close(vp.scale(), 10_000.0, 1e-6);
        let generation = vp.generation();
        vp.zoom(2.0, ScreenPoint::new(0.0, 0.0)).unwrap();
        assert_eq!(vp.generation(), generation);

        assert!(vp.zoom(0.0, ScreenPoint::default()).is_err());
        assert!(vp.zoom(f64::NAN, ScreenPoint::default()).is_err());
    }

    #[test]
    fn test_zoom_in_out_round_trip() {
        let mut vp = seoul();
        let scale = vp.scale();
        vp.zoom_in();
        assert_close(vp.scale(), scale / 1.2, 1e-6);
        vp.zoom_out();
        assert_close(vp.scale(), scale, 1e-6);
    }

    #[test]
    fn test_pan_drag_semantics() {
        let mut vp = seoul();
        let before = vp.extent();
        vp.pan(100.0, 50.0);
        let after = vp.extent();
        // 10 m per pixel: content moves right/down, the view goes west/north.
        assert_close(after.min_x, before.min_x - 1_000.0, 1e-6);
        assert_close(after.max_y, before.max_y + 500.0, 1e-6);
        assert_close(after.width(), before.width(), 1e-6);
    }

    #[test]
    fn test_set_extent_expands_short_side() {
        let mut vp = seoul();
        // Square request into a 4:3 view: width grows.
        vp.set_extent(BoundingBox::new(0.0, 0.0, 3_000.0, 3_000.0))
            .unwrap();
        let e = vp.extent();
        assert_close(e.width(), 4_000.0, 1e-6);
        assert_close(e.height(), 3_000.0, 1e-6);
        assert_close(e.center().x, 1_500.0, 1e-6);

        // Very wide request: height grows.
        vp.set_extent(BoundingBox::new(0.0, 0.0, 8_000.0, 1_000.0))
            .unwrap();
        assert_close(vp.extent().height(), 6_000.0, 1e-6);

        assert!(vp
            .set_extent(BoundingBox::new(0.0, 0.0, 0.0, 10.0))
            .is_err());
    }

    #[test]
    fn test_resize_keeps_center_and_scale() {
        let mut vp = seoul();
        let (center, scale) = (vp.center(), vp.scale());
        vp.resize(1024, 300).unwrap();
        assert_close(vp.scale(), scale, 1e-6);
        assert_close(vp.center().x, center.x, 1e-6);
        assert_close(vp.center().y, center.y, 1e-6);
        assert!(vp.resize(0, 10).is_err());
    }

    #[test]
    fn test_set_scale_keeps_center() {
        let mut vp = seoul();
        let center = vp.center();
        vp.set_scale(25_000.0).unwrap();
        assert_close(vp.scale(), 25_000.0, 1e-6);
        assert_close(vp.center().x, center.x, 1e-6);
        assert!(vp.set_scale(-5.0).is_err());
    }

    #[test]
    fn test_screen_world_round_trip() {
        let vp = seoul();
        let p = ScreenPoint::new(123.5, 456.25);
        let back = vp.world_to_screen(vp.screen_to_world(p));
        assert_close(back.x, p.x, 1e-9);
        assert_close(back.y, p.y, 1e-9);

        let top_left = vp.screen_to_world(ScreenPoint::new(0.0, 0.0));
        assert_close(top_left.x, 196_000.0, 1e-9);
        assert_close(top_left.y, 554_000.0, 1e-9);
    }

    #[test]
    fn test_generation_bumps_on_change() {
        let mut vp = seoul();
        assert_eq!(vp.generation(), 0);
        vp.pan(1.0, 0.0);
        vp.zoom_in();
        assert_eq!(vp.generation(), 2);
        vp.pan(0.0, 0.0);
        assert_eq!(vp.generation(), 2);
    }

    #[test]
    fn test_set_crs_reprojects_extent() {
        let mut vp = seoul();
        let center = vp.center();
        vp.set_crs(CrsId::epsg(4326), &CrsEngine::new()).unwrap();
        assert_eq!(vp.crs(), &CrsId::epsg(4326));
        // Central belt origin is 127E 38N at (200000, 600000).
        assert_close(vp.center().x, 127.0, 0.05);
        assert!(vp.center().y > 37.4 && vp.center().y < 37.7);
        assert!(center.x != vp.center().x);
    }

    #[test]
    fn test_state_restores_view() {
        let vp = seoul();
        let restored = Viewport::from_state(CrsId::epsg(5186), &vp.state()).unwrap();
        assert_eq!(restored.extent(), vp.extent());
        assert_close(restored.scale(), vp.state().scale, 1e-9);
    }

    #[test]
    fn test_unknown_crs_is_rejected() {
        let result = Viewport::new(
            CrsId::new("EPSG:999999"),
            BoundingBox::new(0.0, 0.0, 1.0, 1.0),
            10,
            10,
        );
        assert!(matches!(result, Err(ViewportError::Crs(_))));
    }
}
