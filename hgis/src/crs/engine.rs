//! Transformation engine with a compiled-pipeline cache.

use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, trace};

use super::error::CrsError;
use super::id::CrsId;
use super::registry::{self, Crs};
use crate::geometry::{BoundingBox, Coord, Feature, FeatureId, Geometry, RasterGrid, Shape};

/// Number of segments each bbox edge is split into when sampling.
const BBOX_EDGE_SEGMENTS: usize = 16;

/// A compiled `source -> target` transformation.
#[derive(Debug)]
pub struct Pipeline {
    source: Arc<Crs>,
    target: Arc<Crs>,
    identity: bool,
    datum_shift: bool,
}

impl Pipeline {
    pub fn new(source: Arc<Crs>, target: Arc<Crs>) -> Self {
        let identity = source.id == target.id;
        let datum_shift = !identity && source.datum.needs_shift_to(&target.datum);
        Self {
            source,
            target,
            identity,
            datum_shift,
        }
    }

    pub fn source(&self) -> &Arc<Crs> {
        &self.source
    }

    pub fn target(&self) -> &Arc<Crs> {
        &self.target
    }

    pub fn is_identity(&self) -> bool {
        self.identity
    }

    pub fn has_datum_shift(&self) -> bool {
        self.datum_shift
    }

    pub fn transform_coord(&self, c: Coord) -> Result<Coord, CrsError> {
        if self.identity {
            return Ok(c);
        }

        let (lon, lat) = self.source.to_geographic(c.x, c.y)?;
        let (lon, lat, z) = if self.datum_shift {
            let (lon, lat, h) =
                self.source
                    .datum
                    .to_wgs84_geographic(lon, lat, c.z.unwrap_or(0.0));
            let (lon, lat, h) = self.target.datum.from_wgs84_geographic(lon, lat, h);
            (lon, lat, c.z.map(|_| h))
        } else {
            (lon, lat, c.z)
        };
        let (x, y) = self.target.from_geographic(lon, lat)?;
        Ok(Coord { x, y, z })
    }

    pub fn transform_shape(&self, shape: &Shape) -> Result<Shape, CrsError> {
        if self.identity {
            return Ok(shape.clone());
        }
        match shape {
            Shape::RasterGrid(grid) => Ok(Shape::RasterGrid(RasterGrid {
                extent: self.transform_bbox(&grid.extent)?,
                ..*grid
            })),
            other => other.try_map_coords(|c| self.transform_coord(c)),
        }
    }

    /// Enclosing box of the transformed region, sampled along densified
    /// edges and at the centre. Samples that fall outside the target domain
    /// are skipped; the call fails only when no sample transforms.
    pub fn transform_bbox(&self, bbox: &BoundingBox) -> Result<BoundingBox, CrsError> {
        if self.identity {
            return Ok(*bbox);
        }

        let mut out: Option<BoundingBox> = None;
        let mut first_error = None;
        for sample in bbox_samples(bbox) {
            match self.transform_coord(sample) {
                Ok(c) => match out.as_mut() {
                    Some(b) => b.expand_to_include(c.x, c.y),
                    None => out = Some(BoundingBox::new(c.x, c.y, c.x, c.y)),
                },
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        match (out, first_error) {
            (Some(b), _) => Ok(b),
            (None, Some(e)) => Err(e),
            (None, None) => Err(CrsError::Unsupported(self.source.id.to_string())),
        }
    }
}

fn bbox_samples(bbox: &BoundingBox) -> Vec<Coord> {
    let n = BBOX_EDGE_SEGMENTS;
    let mut samples = Vec::with_capacity(4 * n + 1);
    for i in 0..n {
        let t = i as f64 / n as f64;
        let x = bbox.min_x + t * bbox.width();
        let y = bbox.min_y + t * bbox.height();
        samples.push(Coord::new(x, bbox.min_y));
        samples.push(Coord::new(bbox.max_x, y));
        samples.push(Coord::new(bbox.max_x - t * bbox.width(), bbox.max_y));
        samples.push(Coord::new(bbox.min_x, bbox.max_y - t * bbox.height()));
    }
    samples.push(bbox.center());
    samples
}

/// Result of reprojecting a batch of features. Features that failed are
/// reported individually rather than failing the batch.
#[derive(Debug, Default)]
pub struct BatchTransform {
    pub features: Vec<Feature>,
    pub failures: Vec<(FeatureId, CrsError)>,
}

impl BatchTransform {
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Reprojects coordinates, geometries and features between registered CRSs.
///
/// The engine is shared read-mostly across render workers; compiled
/// pipelines are cached in a concurrent map keyed by `(source, target)`.
#[derive(Debug, Default)]
pub struct CrsEngine {
    pipelines: DashMap<(CrsId, CrsId), Arc<Pipeline>>,
}

impl CrsEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or compile the pipeline for a CRS pair.
    pub fn pipeline(&self, source: &CrsId, target: &CrsId) -> Result<Arc<Pipeline>, CrsError> {
        let key = (source.clone(), target.clone());
        if let Some(pipeline) = self.pipelines.get(&key) {
            return Ok(Arc::clone(pipeline.value()));
        }

        let pipeline = Arc::new(Pipeline::new(
            registry::lookup(source)?,
            registry::lookup(target)?,
        ));
        debug!(
            source = %source,
            target = %target,
            datum_shift = pipeline.has_datum_shift(),
            "Compiled CRS pipeline"
        );
        Ok(Arc::clone(self.pipelines.entry(key).or_insert(pipeline).value()))
    }

    pub fn cached_pipelines(&self) -> usize {
        self.pipelines.len()
    }

    pub fn transform_coord(
        &self,
        coord: Coord,
        source: &CrsId,
        target: &CrsId,
    ) -> Result<Coord, CrsError> {
        self.pipeline(source, target)?.transform_coord(coord)
    }

    /// Reproject every coordinate of `geometry` into `target`.
    pub fn transform(&self, geometry: &Geometry, target: &CrsId) -> Result<Geometry, CrsError> {
        let pipeline = self.pipeline(geometry.crs(), target)?;
        let shape = pipeline.transform_shape(geometry.shape())?;
        Ok(Geometry::new(shape, target.clone()))
    }

    pub fn transform_bbox(
        &self,
        bbox: &BoundingBox,
        source: &CrsId,
        target: &CrsId,
    ) -> Result<BoundingBox, CrsError> {
        self.pipeline(source, target)?.transform_bbox(bbox)
    }

    /// Reproject a batch of features, collecting per-feature failures.
    pub fn transform_features(&self, features: &[Feature], target: &CrsId) -> BatchTransform {
        let mut batch = BatchTransform {
            features: Vec::with_capacity(features.len()),
            failures: Vec::new(),
        };
        for feature in features {
            match self.transform(&feature.geometry, target) {
                Ok(geometry) => batch.features.push(Feature {
                    id: feature.id,
                    geometry,
                    attributes: feature.attributes.clone(),
                }),
                Err(e) => {
                    trace!(feature = feature.id, error = %e, "Feature failed to reproject");
                    batch.failures.push((feature.id, e));
                }
            }
        }
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(code: u32) -> CrsId {
        CrsId::epsg(code)
    }

    #[test]
    fn test_unknown_crs_is_unsupported() {
        let engine = CrsEngine::new();
        let geom = Geometry::point(127.0, 37.5, CrsId::new("EPSG:1"));
        assert!(matches!(
            engine.transform(&geom, &id(4326)),
            Err(CrsError::Unsupported(_))
        ));
        let geom = Geometry::point(127.0, 37.5, id(4326));
        assert!(matches!(
            engine.transform(&geom, &CrsId::new("FOO:1")),
            Err(CrsError::Unsupported(_))
        ));
    }

    #[test]
    fn test_pipelines_are_cached() {
        let engine = CrsEngine::new();
        let a = engine.pipeline(&id(4326), &id(5186)).unwrap();
        let b = engine.pipeline(&id(4326), &id(5186)).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        engine.pipeline(&id(5186), &id(4326)).unwrap();
        assert_eq!(engine.cached_pipelines(), 2);
    }

    #[test]
    fn test_identity_short_circuits() {
        let engine = CrsEngine::new();
        let p = engine.pipeline(&id(5186), &id(5186)).unwrap();
        assert!(p.is_identity());
        // Identity does not validate the domain.
        let c = p.transform_coord(Coord::new(-1e12, 5.0)).unwrap();
        assert_eq!(c, Coord::new(-1e12, 5.0));
    }

    #[test]
    fn test_web_mercator_out_of_domain() {
        let engine = CrsEngine::new();
        let geom = Geometry::point(10.0, 89.0, id(4326));
        let err = engine.transform(&geom, &id(3857)).unwrap_err();
        assert!(err.is_out_of_domain());
    }

    #[test]
    fn test_korea_central_belt_origin() {
        let engine = CrsEngine::new();
        let c = engine
            .transform_coord(Coord::new(127.0, 38.0), &id(4737), &id(5186))
            .unwrap();
        assert!((c.x - 200_000.0).abs() < 1e-6);
        assert!((c.y - 600_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_utm_k_origin() {
        let engine = CrsEngine::new();
        let c = engine
            .transform_coord(Coord::new(127.5, 38.0), &id(4326), &id(5179))
            .unwrap();
        assert!((c.x - 1_000_000.0).abs() < 1e-3);
        assert!((c.y - 2_000_000.0).abs() < 1e-3);
    }

    #[test]
    fn test_datum_shift_round_trip() {
        let engine = CrsEngine::new();
        let original = Coord::new(198_000.0, 552_000.0);
        let wgs = engine.transform_coord(original, &id(5174), &id(4326)).unwrap();
        let back = engine.transform_coord(wgs, &id(4326), &id(5174)).unwrap();
        assert!((back.x - original.x).abs() < 1e-3);
        assert!((back.y - original.y).abs() < 1e-3);
        assert!(engine.pipeline(&id(5174), &id(4326)).unwrap().has_datum_shift());
    }

    #[test]
    fn test_z_is_carried_through() {
        let engine = CrsEngine::new();
        let c = engine
            .transform_coord(Coord::with_z(127.0, 37.0, 42.0), &id(4326), &id(5186))
            .unwrap();
        assert_eq!(c.z, Some(42.0));
    }

    #[test]
    fn test_transform_bbox_encloses_corners() {
        let engine = CrsEngine::new();
        let bbox = BoundingBox::new(126.0, 37.0, 128.0, 38.0);
        let out = engine.transform_bbox(&bbox, &id(4326), &id(5186)).unwrap();
        for (lon, lat) in [(126.0, 37.0), (128.0, 38.0), (126.0, 38.0), (127.0, 38.0)] {
            let c = engine
                .transform_coord(Coord::new(lon, lat), &id(4326), &id(5186))
                .unwrap();
            assert!(out.contains(c.x, c.y), "({}, {}) not in {}", lon, lat, out);
        }
    }

    #[test]
    fn test_transform_bbox_skips_out_of_domain_samples() {
        let engine = CrsEngine::new();
        let bbox = BoundingBox::new(-10.0, 80.0, 10.0, 89.0);
        let out = engine.transform_bbox(&bbox, &id(4326), &id(3857)).unwrap();
        assert!(out.max_y > 0.0);

        let polar = BoundingBox::new(-10.0, 86.0, 10.0, 89.0);
        assert!(engine.transform_bbox(&polar, &id(4326), &id(3857)).is_err());
    }

    #[test]
    fn test_transform_features_reports_per_feature_failures() {
        let engine = CrsEngine::new();
        let features = vec![
            Feature::new(1, Geometry::point(127.0, 37.5, id(4326))),
            Feature::new(2, Geometry::point(0.0, 88.0, id(4326))),
            Feature::new(3, Geometry::point(126.9, 37.6, id(4326))),
        ];
        let batch = engine.transform_features(&features, &id(3857));
        assert_eq!(batch.features.len(), 2);
        assert_eq!(batch.failures.len(), 1);
        assert_eq!(batch.failures[0].0, 2);
        assert!(batch.is_partial());
        assert!(batch.features.iter().all(|f| f.geometry.crs() == &id(3857)));
    }
}
