//! R-tree backed spatial index.

use parking_lot::RwLock;
use rstar::{RTree, RTreeObject, AABB};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, trace};

use crate::geometry::{BoundingBox, FeatureHandle, FeatureId};
use crate::layer::LayerId;

/// Spatial index errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IndexError {
    /// The index disagrees with the authoritative feature table.
    #[error("Spatial index for layer {layer} is corrupt: {reason}")]
    IndexCorrupt { layer: LayerId, reason: String },
}

#[derive(Debug, Clone, PartialEq)]
struct Entry {
    id: FeatureId,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for Entry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

fn to_aabb(bbox: &BoundingBox) -> AABB<[f64; 2]> {
    AABB::from_corners([bbox.min_x, bbox.min_y], [bbox.max_x, bbox.max_y])
}

fn to_bbox(aabb: &AABB<[f64; 2]>) -> BoundingBox {
    let [min_x, min_y] = aabb.lower();
    let [max_x, max_y] = aabb.upper();
    BoundingBox::new(min_x, min_y, max_x, max_y)
}

#[derive(Debug, Default)]
struct Inner {
    tree: RTree<Entry>,
    envelopes: HashMap<FeatureId, AABB<[f64; 2]>>,
}

/// Spatial index over the features of one layer.
#[derive(Debug)]
pub struct SpatialIndex {
    layer: LayerId,
    inner: RwLock<Inner>,
}

impl SpatialIndex {
    /// Create an empty index.
    pub fn new(layer: LayerId) -> Self {
        Self {
            layer,
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Build an index in one pass (sort-tile-recursive packing).
    ///
    /// Duplicate ids keep the last envelope given.
    pub fn bulk_load(
        layer: LayerId,
        items: impl IntoIterator<Item = (FeatureId, BoundingBox)>,
    ) -> Self {
        let index = Self::new(layer);
        index.rebuild(items);
        index
    }

    /// Replace the whole contents of the index.
    pub fn rebuild(&self, items: impl IntoIterator<Item = (FeatureId, BoundingBox)>) {
        let envelopes: HashMap<FeatureId, AABB<[f64; 2]>> = items
            .into_iter()
            .map(|(id, bbox)| (id, to_aabb(&bbox)))
            .collect();
        let entries = envelopes
            .iter()
            .map(|(&id, &envelope)| Entry { id, envelope })
            .collect();
        let tree = RTree::bulk_load(entries);

        debug!(layer = %self.layer, features = envelopes.len(), "Built spatial index");
        *self.inner.write() = Inner { tree, envelopes };
    }

    pub fn layer(&self) -> LayerId {
        self.layer
    }

    pub fn len(&self) -> usize {
        self.inner.read().envelopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert a feature, replacing any previous envelope for the same id.
    pub fn insert(&self, id: FeatureId, bbox: BoundingBox) {
        let mut inner = self.inner.write();
        let envelope = to_aabb(&bbox);
        if let Some(old) = inner.envelopes.insert(id, envelope) {
            inner.tree.remove(&Entry { id, envelope: old });
        }
        inner.tree.insert(Entry { id, envelope });
        trace!(layer = %self.layer, feature = id, "Indexed feature");
    }

    /// Remove a feature. Returns false if it was not indexed.
    pub fn remove(&self, id: FeatureId) -> bool {
        let mut inner = self.inner.write();
        match inner.envelopes.remove(&id) {
            Some(envelope) => {
                inner.tree.remove(&Entry { id, envelope });
                true
            }
            None => false,
        }
    }

    /// Move a feature to a new envelope (an edit of its geometry).
    pub fn update(&self, id: FeatureId, bbox: BoundingBox) {
        self.insert(id, bbox);
    }

    /// All features whose envelope intersects `bbox`, boundaries included.
    pub fn query(&self, bbox: &BoundingBox) -> Vec<FeatureHandle> {
        let inner = self.inner.read();
        let mut handles: Vec<FeatureHandle> = inner
            .tree
            .locate_in_envelope_intersecting(&to_aabb(bbox))
            .map(|entry| FeatureHandle::new(self.layer, entry.id))
            .collect();
        handles.sort_unstable();
        handles
    }

    /// Envelope of everything indexed, or `None` when empty.
    pub fn extent(&self) -> Option<BoundingBox> {
        let inner = self.inner.read();
        inner
            .envelopes
            .values()
            .map(to_bbox)
            .reduce(|a, b| a.union(&b))
    }

    /// Constant-time sanity check run before queries: the tree, the id table
    /// and the caller's feature count must all agree.
    pub fn check_len(&self, expected: usize) -> Result<(), IndexError> {
        let inner = self.inner.read();
        let (tree, ids) = (inner.tree.size(), inner.envelopes.len());
        if tree == ids && ids == expected {
            return Ok(());
        }
        Err(IndexError::IndexCorrupt {
            layer: self.layer,
            reason: format!(
                "tree holds {} entries, {} ids registered, {} features expected",
                tree, ids, expected
            ),
        })
    }

    /// Compare the index with the authoritative feature envelopes.
    pub fn verify(
        &self,
        expected: impl IntoIterator<Item = (FeatureId, BoundingBox)>,
    ) -> Result<(), IndexError> {
        let inner = self.inner.read();
        let corrupt = |reason: String| IndexError::IndexCorrupt {
            layer: self.layer,
            reason,
        };

        if inner.tree.size() != inner.envelopes.len() {
            return Err(corrupt(format!(
                "tree holds {} entries but {} features are registered",
                inner.tree.size(),
                inner.envelopes.len()
            )));
        }

        let mut seen = 0usize;
        for (id, bbox) in expected {
            seen += 1;
            match inner.envelopes.get(&id) {
                Some(envelope) if *envelope == to_aabb(&bbox) => {}
                Some(_) => return Err(corrupt(format!("feature {} has a stale envelope", id))),
                None => return Err(corrupt(format!("feature {} is missing", id))),
            }
        }
        if seen != inner.envelopes.len() {
            return Err(corrupt(format!(
                "index holds {} features, table holds {}",
                inner.envelopes.len(),
                seen
            )));
        }
        Ok(())
    }

    /// Drop an entry from the tree while keeping it registered, leaving the
    /// index inconsistent. Test hook for the rebuild path.
    #[cfg(test)]
    pub(crate) fn corrupt_for_test(&self, id: FeatureId) {
        let mut inner = self.inner.write();
        if let Some(envelope) = inner.envelopes.get(&id).copied() {
            inner.tree.remove(&Entry { id, envelope });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(x: f64, y: f64) -> BoundingBox {
        BoundingBox::new(x, y, x, y)
    }

    fn seoul_points() -> Vec<(FeatureId, BoundingBox)> {
        vec![
            (1, point(127.0, 37.5)),
            (2, point(126.9, 37.6)),
            (3, point(127.1, 37.4)),
        ]
    }

    #[test]
    fn test_query_returns_intersecting_features() {
        let index = SpatialIndex::bulk_load(LayerId(7), seoul_points());
        let hits = index.query(&BoundingBox::new(126.85, 37.45, 127.05, 37.65));
        assert_eq!(
            hits,
            vec![FeatureHandle::new(LayerId(7), 1), FeatureHandle::new(LayerId(7), 2)]
        );
    }

    #[test]
    fn test_full_extent_returns_each_feature_once() {
        let index = SpatialIndex::bulk_load(LayerId(1), seoul_points());
        let extent = index.extent().unwrap();
        let hits = index.query(&extent);
        assert_eq!(hits.len(), 3);
        let mut ids: Vec<_> = hits.iter().map(|h| h.feature).collect();
        ids.dedup();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_disjoint_query_is_empty() {
        let index = SpatialIndex::bulk_load(LayerId(1), seoul_points());
        assert!(index.query(&BoundingBox::new(0.0, 0.0, 1.0, 1.0)).is_empty());
    }

    #[test]
    fn test_empty_index() {
        let index = SpatialIndex::new(LayerId(1));
        assert!(index.is_empty());
        assert!(index.extent().is_none());
        assert!(index.query(&BoundingBox::new(-180.0, -90.0, 180.0, 90.0)).is_empty());
    }

    #[test]
    fn test_insert_update_remove() {
        let index = SpatialIndex::new(LayerId(2));
        index.insert(10, BoundingBox::new(0.0, 0.0, 1.0, 1.0));
        index.update(10, BoundingBox::new(5.0, 5.0, 6.0, 6.0));
        assert_eq!(index.len(), 1);
        assert!(index.query(&BoundingBox::new(0.0, 0.0, 1.0, 1.0)).is_empty());
        assert_eq!(index.query(&BoundingBox::new(5.5, 5.5, 7.0, 7.0)).len(), 1);

        assert!(index.remove(10));
        assert!(!index.remove(10));
        assert!(index.is_empty());
    }

    #[test]
    fn test_verify_detects_corruption() {
        let items = seoul_points();
        let index = SpatialIndex::bulk_load(LayerId(3), items.clone());
        assert!(index.verify(items.clone()).is_ok());

        index.corrupt_for_test(2);
        let err = index.verify(items.clone()).unwrap_err();
        assert!(matches!(err, IndexError::IndexCorrupt { layer: LayerId(3), .. }));

        index.rebuild(items.clone());
        assert!(index.verify(items).is_ok());
    }

    #[test]
    fn test_verify_detects_missing_and_stale() {
        let index = SpatialIndex::bulk_load(LayerId(4), seoul_points());
        let mut moved = seoul_points();
        moved[0].1 = point(0.0, 0.0);
        assert!(index.verify(moved).is_err());

        let mut extra = seoul_points();
        extra.push((4, point(1.0, 1.0)));
        assert!(index.verify(extra).is_err());

        assert!(index.verify(seoul_points().into_iter().take(2)).is_err());
    }

    #[test]
    fn test_large_index_query() {
        let items = (0..10_000u64).map(|i| {
            let x = (i % 100) as f64;
            let y = (i / 100) as f64;
            (i, BoundingBox::new(x, y, x + 0.5, y + 0.5))
        });
        let index = SpatialIndex::bulk_load(LayerId(5), items);
        let hits = index.query(&BoundingBox::new(10.2, 10.2, 11.7, 11.7));
        // Cells (10..=11, 10..=11).
        assert_eq!(hits.len(), 4);
    }
}
