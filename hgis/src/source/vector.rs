//! Local vector file adapter.
//!
//! The adapter keeps the per-layer R-tree and the shapefile's record layout
//! in memory. Geometry and attributes stay on disk and are read for the
//! records a fetch hits; the fetch cache is the only place decoded features
//! are kept.

use futures::future::BoxFuture;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::shapefile::{FieldInfo, ShapefileTable};
use super::{DataSource, FetchRequest, Payload, SourceError, SourceKind};
use crate::crs::{CrsEngine, CrsId};
use crate::geometry::{AttributeValue, BoundingBox, Feature, FeatureId, GeometryType};
use crate::index::SpatialIndex;
use crate::layer::LayerId;

/// Min/max summary of a numeric attribute.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldStatistics {
    pub min: f64,
    pub max: f64,
    /// Non-null values seen.
    pub count: usize,
}

impl FieldStatistics {
    fn add(acc: Option<Self>, v: f64) -> Option<Self> {
        Some(match acc {
            None => Self {
                min: v,
                max: v,
                count: 1,
            },
            Some(s) => Self {
                min: s.min.min(v),
                max: s.max.max(v),
                count: s.count + 1,
            },
        })
    }
}

/// Index and record table of one opened file, shared with blocking tasks.
struct VectorStore {
    layer: LayerId,
    table: ShapefileTable,
    index: SpatialIndex,
}

impl VectorStore {
    fn rebuild_index(&self, cause: &dyn std::fmt::Display) -> Result<(), SourceError> {
        warn!(layer = %self.layer, path = %self.table.path().display(), error = %cause, "Rebuilding spatial index");
        self.index.rebuild(self.table.envelopes()?);
        Ok(())
    }

    fn query(&self, extent: &BoundingBox) -> Result<Vec<Feature>, SourceError> {
        if let Err(e) = self.index.check_len(self.table.len()) {
            self.rebuild_index(&e)?;
        }
        let mut ids: Vec<FeatureId> = self.index.query(extent).iter().map(|h| h.feature).collect();
        if let Some(dangling) = ids.iter().find(|id| !self.table.contains(**id)) {
            self.rebuild_index(&format!("dangling feature {}", dangling))?;
            ids = self.index.query(extent).iter().map(|h| h.feature).collect();
        }
        self.table.read_features(&ids)
    }
}

/// Serves features from an ESRI shapefile.
///
/// Features are returned in the file's native CRS, ordered by id.
pub struct VectorFileAdapter {
    store: Arc<VectorStore>,
    engine: Arc<CrsEngine>,
}

impl VectorFileAdapter {
    /// Open a shapefile on the blocking pool.
    ///
    /// `fallback_crs` applies when the file has no recognisable `.prj`.
    pub async fn open(
        layer: LayerId,
        path: impl Into<PathBuf>,
        fallback_crs: CrsId,
        engine: Arc<CrsEngine>,
    ) -> Result<Self, SourceError> {
        let path = path.into();
        tokio::task::spawn_blocking(move || Self::open_blocking(layer, &path, &fallback_crs, engine))
            .await
            .map_err(|e| SourceError::SourceUnavailable(format!("decode task failed: {}", e)))?
    }

    pub fn open_blocking(
        layer: LayerId,
        path: &Path,
        fallback_crs: &CrsId,
        engine: Arc<CrsEngine>,
    ) -> Result<Self, SourceError> {
        let (table, envelopes) = ShapefileTable::open(path, fallback_crs)?;
        let index = SpatialIndex::bulk_load(layer, envelopes);
        Ok(Self {
            store: Arc::new(VectorStore {
                layer,
                table,
                index,
            }),
            engine,
        })
    }

    pub fn path(&self) -> &Path {
        self.store.table.path()
    }

    pub fn feature_count(&self) -> usize {
        self.store.table.len()
    }

    pub fn fields(&self) -> &[FieldInfo] {
        self.store.table.fields()
    }

    pub fn geometry_type(&self) -> Option<GeometryType> {
        self.store.table.geometry_type()
    }

    /// Read one feature from disk.
    pub fn feature(&self, id: FeatureId) -> Result<Option<Feature>, SourceError> {
        Ok(self.store.table.read_features(&[id])?.pop())
    }

    /// Read one attribute of one feature from disk.
    pub fn attribute(&self, id: FeatureId, field: &str) -> Result<Option<AttributeValue>, SourceError> {
        Ok(self
            .store
            .table
            .read_attributes(id)?
            .and_then(|mut row| row.remove(field)))
    }

    pub fn index(&self) -> &SpatialIndex {
        &self.store.index
    }

    /// Min/max of a numeric field over all features, streamed from the
    /// attribute table. `None` when the field has no numeric values.
    pub fn field_statistics(&self, field: &str) -> Result<Option<FieldStatistics>, SourceError> {
        let stats = self.store.table.fold_field(field, None, |acc, value| {
            match value.as_f64() {
                Some(v) => FieldStatistics::add(acc, v),
                None => acc,
            }
        })?;
        Ok(stats.flatten())
    }

    /// Full check of the index against the envelopes on disk; rebuilds it
    /// on mismatch. Returns whether a rebuild happened.
    pub fn verify_index(&self) -> Result<bool, SourceError> {
        let envelopes = self.store.table.envelopes()?;
        match self.store.index.verify(envelopes.iter().copied()) {
            Ok(()) => Ok(false),
            Err(e) => {
                warn!(layer = %self.store.layer, error = %e, "Rebuilding spatial index");
                self.store.index.rebuild(envelopes);
                Ok(true)
            }
        }
    }

    /// Features intersecting `extent` (native CRS), ordered by id. Reads
    /// from disk; call from blocking context.
    pub fn query(&self, extent: &BoundingBox) -> Result<Vec<Feature>, SourceError> {
        self.store.query(extent)
    }
}

impl DataSource for VectorFileAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::VectorFile
    }

    fn describe(&self) -> String {
        self.path().display().to_string()
    }

    fn native_crs(&self) -> &CrsId {
        self.store.table.crs()
    }

    fn full_extent(&self) -> Option<BoundingBox> {
        self.store.table.extent()
    }

    fn fetch<'a>(
        &'a self,
        request: &'a FetchRequest,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Payload, SourceError>> {
        Box::pin(async move {
            if cancel.is_cancelled() {
                return Err(SourceError::Cancelled);
            }
            let extent = self
                .engine
                .transform_bbox(&request.extent, &request.crs, self.native_crs())?;
            let store = Arc::clone(&self.store);
            let features = tokio::task::spawn_blocking(move || store.query(&extent))
                .await
                .map_err(|e| SourceError::SourceUnavailable(format!("read task failed: {}", e)))??;
            debug!(layer = %self.store.layer, features = features.len(), "Vector fetch complete");
            Ok(Payload::Features(features))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{write_point_shapefile, PointRecord};
    use tempfile::TempDir;

    fn seoul_records() -> Vec<PointRecord> {
        vec![
            PointRecord::new(127.0, 37.5, "Jongno", 100),
            PointRecord::new(126.9, 37.6, "Eunpyeong", 250),
            PointRecord::new(127.1, 37.4, "Gangnam", 175),
        ]
    }

    fn open_records(records: &[PointRecord]) -> (TempDir, VectorFileAdapter) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seoul.shp");
        write_point_shapefile(&path, records, None).unwrap();
        let adapter = VectorFileAdapter::open_blocking(
            LayerId(1),
            &path,
            &CrsId::epsg(4326),
            Arc::new(CrsEngine::new()),
        )
        .unwrap();
        (dir, adapter)
    }

    fn ids(payload: &Payload) -> Vec<FeatureId> {
        payload.features().unwrap().iter().map(|f| f.id).collect()
    }

    #[tokio::test]
    async fn test_fetch_in_native_crs() {
        let (_dir, adapter) = open_records(&seoul_records());
        let request = FetchRequest::new(
            BoundingBox::new(126.85, 37.45, 127.05, 37.65),
            CrsId::epsg(4326),
            50_000.0,
            256,
            256,
        );
        let payload = adapter
            .fetch(&request, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(ids(&payload), vec![1, 2]);
        let first = &payload.features().unwrap()[0];
        assert_eq!(first.attribute("NAME"), Some(&AttributeValue::Text("Jongno".into())));
    }

    #[tokio::test]
    async fn test_fetch_transforms_request_extent() {
        let (_dir, adapter) = open_records(&seoul_records());
        let engine = CrsEngine::new();
        let web = engine
            .transform_bbox(
                &BoundingBox::new(127.05, 37.35, 127.15, 37.45),
                &CrsId::epsg(4326),
                &CrsId::epsg(3857),
            )
            .unwrap();
        let request = FetchRequest::new(web, CrsId::epsg(3857), 25_000.0, 256, 256);
        let payload = adapter
            .fetch(&request, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(ids(&payload), vec![3]);
    }

    #[tokio::test]
    async fn test_cancelled_fetch() {
        let (_dir, adapter) = open_records(&seoul_records());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let request = FetchRequest::new(
            BoundingBox::new(0.0, 0.0, 1.0, 1.0),
            CrsId::epsg(4326),
            1.0,
            1,
            1,
        );
        assert_eq!(
            adapter.fetch(&request, &cancel).await,
            Err(SourceError::Cancelled)
        );
    }

    #[test]
    fn test_corrupt_index_is_rebuilt_on_query() {
        let (_dir, adapter) = open_records(&seoul_records());
        adapter.index().corrupt_for_test(2);
        let hits = adapter
            .query(&BoundingBox::new(126.85, 37.45, 127.05, 37.65))
            .unwrap();
        assert_eq!(hits.iter().map(|f| f.id).collect::<Vec<_>>(), vec![1, 2]);
        assert!(!adapter.verify_index().unwrap());
    }

    #[test]
    fn test_empty_geometry_does_not_trigger_rebuild() {
        let mut records = seoul_records();
        records.insert(1, PointRecord::new(0.0, 0.0, "Nowhere", 0).empty());
        let (dir, adapter) = open_records(&records);

        assert_eq!(adapter.feature_count(), 3);
        assert!(adapter.index().check_len(adapter.feature_count()).is_ok());
        assert!(!adapter.verify_index().unwrap());

        // A rebuild rescans the file, which fails once it is gone.
        drop(dir);
        assert!(adapter.query(&BoundingBox::new(0.0, 0.0, 1.0, 1.0)).unwrap().is_empty());
    }

    #[test]
    fn test_field_statistics() {
        let mut records = seoul_records();
        records.push(PointRecord::new(127.2, 37.3, "Songpa", 900).deleted());
        let (_dir, adapter) = open_records(&records);

        let stats = adapter.field_statistics("YEAR").unwrap().unwrap();
        assert_eq!(stats.min, 100.0);
        assert_eq!(stats.max, 250.0);
        assert_eq!(stats.count, 3);
        assert!(adapter.field_statistics("MISSING").unwrap().is_none());
        assert!(adapter.field_statistics("NAME").unwrap().is_none());
        assert_eq!(
            adapter.attribute(1, "YEAR").unwrap(),
            Some(AttributeValue::Integer(100))
        );
        assert_eq!(adapter.feature(4).unwrap(), None);
    }

    #[tokio::test]
    async fn test_open_shapefile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pois.shp");
        write_point_shapefile(
            &path,
            &[
                PointRecord::new(127.0, 37.5, "a", 1),
                PointRecord::new(126.9, 37.6, "b", 2),
            ],
            None,
        )
        .unwrap();

        let adapter = VectorFileAdapter::open(
            LayerId(4),
            &path,
            CrsId::epsg(4326),
            Arc::new(CrsEngine::new()),
        )
        .await
        .unwrap();
        assert_eq!(adapter.feature_count(), 2);
        assert_eq!(adapter.fields().len(), 2);
        assert_eq!(adapter.geometry_type(), Some(GeometryType::Point));
        assert_eq!(adapter.kind(), SourceKind::VectorFile);
        assert!(adapter.describe().ends_with("pois.shp"));
        assert_eq!(
            adapter.full_extent(),
            Some(BoundingBox::new(126.9, 37.5, 127.0, 37.6))
        );
        let feature = adapter.feature(2).unwrap().unwrap();
        assert_eq!(feature.attribute("NAME"), Some(&AttributeValue::Text("b".into())));
    }

    #[tokio::test]
    async fn test_open_missing_file() {
        let result = VectorFileAdapter::open(
            LayerId(1),
            "/no/such/file.shp",
            CrsId::epsg(4326),
            Arc::new(CrsEngine::new()),
        )
        .await;
        assert!(matches!(result, Err(SourceError::SourceUnavailable(_))));
    }
}
