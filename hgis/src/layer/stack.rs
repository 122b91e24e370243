//! Copy-on-write layer stack.

use std::sync::Arc;
use tracing::{debug, warn};

use super::types::{Layer, LayerId, NewLayer, ScaleRange};
use super::LayerError;
use crate::crs::{CrsEngine, CrsId};
use crate::geometry::BoundingBox;
use crate::source::DataSource;

/// Immutable view of the stack taken at one point in time.
///
/// Cloning is cheap; the layer list is shared with the stack until the
/// stack's next edit.
#[derive(Clone, Debug)]
pub struct LayerSnapshot {
    layers: Arc<Vec<Layer>>,
    revision: u64,
}

impl LayerSnapshot {
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn get(&self, id: LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == id)
    }

    /// Layers from bottom to top, the order they are painted in.
    pub fn render_order(&self) -> impl Iterator<Item = &Layer> {
        self.layers.iter().rev()
    }
}

/// Ordered collection of layers; index 0 is the top layer.
#[derive(Clone, Debug, Default)]
pub struct LayerStack {
    layers: Arc<Vec<Layer>>,
    next_id: u64,
    revision: u64,
}

impl LayerStack {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Layers from top to bottom.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn get(&self, id: LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == id)
    }

    pub fn layer_by_name(&self, name: &str) -> Option<&Layer> {
        self.layers.iter().find(|l| l.name == name)
    }

    pub fn index_of(&self, id: LayerId) -> Option<usize> {
        self.layers.iter().position(|l| l.id == id)
    }

    /// Layers from bottom to top, the order they are painted in.
    pub fn render_order(&self) -> impl Iterator<Item = &Layer> {
        self.layers.iter().rev()
    }

    /// Visible layers whose scale range includes `scale`, top to bottom.
    pub fn visible_layers(&self, scale: f64) -> Vec<&Layer> {
        self.layers.iter().filter(|l| l.is_drawn_at(scale)).collect()
    }

    /// Monotonic edit counter.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn snapshot(&self) -> LayerSnapshot {
        LayerSnapshot {
            layers: Arc::clone(&self.layers),
            revision: self.revision,
        }
    }

    /// Union of every bound layer's extent, in `target` coordinates.
    pub fn full_extent(&self, engine: &CrsEngine, target: &CrsId) -> Option<BoundingBox> {
        self.extent_of(self.layers.iter(), engine, target)
    }

    /// Union of the visible layers' extents, in `target` coordinates.
    pub fn visible_extent(&self, engine: &CrsEngine, target: &CrsId) -> Option<BoundingBox> {
        self.extent_of(self.layers.iter().filter(|l| l.visible), engine, target)
    }

    fn extent_of<'a>(
        &self,
        layers: impl Iterator<Item = &'a Layer>,
        engine: &CrsEngine,
        target: &CrsId,
    ) -> Option<BoundingBox> {
        layers
            .filter_map(|layer| {
                let source = layer.source.as_ref()?;
                let extent = source.full_extent()?;
                match engine.transform_bbox(&extent, source.native_crs(), target) {
                    Ok(bbox) => Some(bbox),
                    Err(e) => {
                        warn!(layer = %layer.id, error = %e, "Layer extent does not reproject");
                        None
                    }
                }
            })
            .reduce(|a, b| a.union(&b))
    }

    // ========================================================================
    // Edits
    // ========================================================================

    fn allocate_id(&mut self) -> LayerId {
        self.next_id += 1;
        LayerId(self.next_id)
    }

    /// Apply an edit to the layer list, then renumber z-order.
    fn edit<R>(&mut self, f: impl FnOnce(&mut Vec<Layer>) -> R) -> R {
        let layers = Arc::make_mut(&mut self.layers);
        let result = f(layers);
        for (z, layer) in layers.iter_mut().enumerate() {
            layer.z_order = z;
        }
        self.revision += 1;
        result
    }

    fn layer_mut(&mut self, id: LayerId) -> Result<&mut Layer, LayerError> {
        let index = self.index_of(id).ok_or(LayerError::UnknownLayer(id))?;
        self.revision += 1;
        Ok(&mut Arc::make_mut(&mut self.layers)[index])
    }

    /// Add a layer on top of the stack.
    pub fn add_layer(&mut self, spec: NewLayer) -> LayerId {
        let id = self.allocate_id();
        let layer = Layer::from_new(id, spec);
        debug!(layer = %id, name = %layer.name, kind = %layer.kind, "Added layer");
        self.edit(|layers| layers.insert(0, layer));
        id
    }

    /// Insert a layer at `index` (0 = top, `len` = bottom).
    pub fn insert_layer(&mut self, index: usize, spec: NewLayer) -> Result<LayerId, LayerError> {
        let len = self.len();
        if index > len {
            return Err(LayerError::IndexOutOfRange { index, len });
        }
        let id = self.allocate_id();
        let layer = Layer::from_new(id, spec);
        self.edit(|layers| layers.insert(index, layer));
        Ok(id)
    }

    /// Append a layer at the bottom keeping a caller-supplied id. Used when
    /// rebuilding a stack from a saved project.
    pub fn restore_layer(&mut self, id: LayerId, spec: NewLayer) -> Result<(), LayerError> {
        if self.get(id).is_some() {
            return Err(LayerError::DuplicateId(id));
        }
        self.next_id = self.next_id.max(id.0);
        let layer = Layer::from_new(id, spec);
        self.edit(|layers| layers.push(layer));
        Ok(())
    }

    pub fn remove_layer(&mut self, id: LayerId) -> Result<Layer, LayerError> {
        let index = self.index_of(id).ok_or(LayerError::UnknownLayer(id))?;
        let removed = self.edit(|layers| layers.remove(index));
        debug!(layer = %id, "Removed layer");
        Ok(removed)
    }

    /// Move a layer to `new_index` (0 = top).
    pub fn reorder(&mut self, id: LayerId, new_index: usize) -> Result<(), LayerError> {
        let index = self.index_of(id).ok_or(LayerError::UnknownLayer(id))?;
        let len = self.len();
        if new_index >= len {
            return Err(LayerError::IndexOutOfRange {
                index: new_index,
                len,
            });
        }
        if index != new_index {
            self.edit(|layers| {
                let layer = layers.remove(index);
                layers.insert(new_index, layer);
            });
        }
        Ok(())
    }

    /// Move one step towards the top. Returns false if already on top.
    pub fn move_up(&mut self, id: LayerId) -> Result<bool, LayerError> {
        let index = self.index_of(id).ok_or(LayerError::UnknownLayer(id))?;
        if index == 0 {
            return Ok(false);
        }
        self.reorder(id, index - 1)?;
        Ok(true)
    }

    /// Move one step towards the bottom. Returns false if already at the bottom.
    pub fn move_down(&mut self, id: LayerId) -> Result<bool, LayerError> {
        let index = self.index_of(id).ok_or(LayerError::UnknownLayer(id))?;
        if index + 1 >= self.len() {
            return Ok(false);
        }
        self.reorder(id, index + 1)?;
        Ok(true)
    }

    pub fn move_to_top(&mut self, id: LayerId) -> Result<(), LayerError> {
        self.reorder(id, 0)
    }

    pub fn move_to_bottom(&mut self, id: LayerId) -> Result<(), LayerError> {
        let last = self.len().saturating_sub(1);
        self.reorder(id, last)
    }

    pub fn set_visible(&mut self, id: LayerId, visible: bool) -> Result<(), LayerError> {
        self.layer_mut(id)?.visible = visible;
        Ok(())
    }

    pub fn set_all_visible(&mut self, visible: bool) {
        self.edit(|layers| {
            for layer in layers.iter_mut() {
                layer.visible = visible;
            }
        });
    }

    /// Set opacity, clamped to `[0, 1]`. NaN is rejected.
    pub fn set_opacity(&mut self, id: LayerId, opacity: f64) -> Result<(), LayerError> {
        if opacity.is_nan() {
            return Err(LayerError::InvalidOpacity(opacity));
        }
        self.layer_mut(id)?.opacity = opacity.clamp(0.0, 1.0);
        Ok(())
    }

    pub fn set_scale_range(&mut self, id: LayerId, range: ScaleRange) -> Result<(), LayerError> {
        let range = ScaleRange::new(range.min, range.max)?;
        self.layer_mut(id)?.scale_range = range;
        Ok(())
    }

    pub fn set_style(&mut self, id: LayerId, style: Option<String>) -> Result<(), LayerError> {
        self.layer_mut(id)?.style = style;
        Ok(())
    }

    pub fn rename(&mut self, id: LayerId, name: impl Into<String>) -> Result<(), LayerError> {
        self.layer_mut(id)?.name = name.into();
        Ok(())
    }

    /// Attach (or detach) the adapter a layer reads from.
    ///
    /// Each call moves the layer to a new source revision, so fetches cached
    /// for the previous adapter no longer match.
    pub fn set_source(
        &mut self,
        id: LayerId,
        source: Option<Arc<dyn DataSource>>,
    ) -> Result<(), LayerError> {
        let layer = self.layer_mut(id)?;
        layer.source = source;
        layer.source_revision += 1;
        debug!(
            layer = %id,
            revision = layer.source_revision,
            bound = layer.source.is_some(),
            "Rebound layer source"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceBinding;
    use crate::testing::StaticSource;

    fn spec(name: &str) -> NewLayer {
        NewLayer::new(
            name,
            SourceBinding::VectorFile {
                path: format!("/data/{}.shp", name).into(),
            },
            CrsId::epsg(4326),
        )
    }

    fn names(stack: &LayerStack) -> Vec<&str> {
        stack.layers().iter().map(|l| l.name.as_str()).collect()
    }

    fn assert_contiguous(stack: &LayerStack) {
        for (i, layer) in stack.layers().iter().enumerate() {
            assert_eq!(layer.z_order(), i, "layer {} out of order", layer.name);
        }
    }

    #[test]
    fn test_add_layer_goes_on_top() {
        let mut stack = LayerStack::new();
        stack.add_layer(spec("base"));
        stack.add_layer(spec("roads"));
        assert_eq!(names(&stack), vec!["roads", "base"]);
        assert_contiguous(&stack);

        let painted: Vec<_> = stack.render_order().map(|l| l.name.as_str()).collect();
        assert_eq!(painted, vec!["base", "roads"]);
    }

    #[test]
    fn test_insert_layer_bounds() {
        let mut stack = LayerStack::new();
        stack.add_layer(spec("a"));
        stack.insert_layer(1, spec("bottom")).unwrap();
        assert_eq!(names(&stack), vec!["a", "bottom"]);
        assert_eq!(
            stack.insert_layer(5, spec("x")),
            Err(LayerError::IndexOutOfRange { index: 5, len: 2 })
        );
    }

    #[test]
    fn test_reorder_renumbers() {
        let mut stack = LayerStack::new();
        let a = stack.add_layer(spec("a"));
        stack.add_layer(spec("b"));
        stack.add_layer(spec("c"));
        // c, b, a
        stack.reorder(a, 0).unwrap();
        assert_eq!(names(&stack), vec!["a", "c", "b"]);
        assert_contiguous(&stack);

        assert!(stack.reorder(a, 3).is_err());
        assert!(stack.reorder(LayerId(99), 0).is_err());
    }

    #[test]
    fn test_remove_keeps_contiguous() {
        let mut stack = LayerStack::new();
        stack.add_layer(spec("a"));
        let b = stack.add_layer(spec("b"));
        stack.add_layer(spec("c"));
        let removed = stack.remove_layer(b).unwrap();
        assert_eq!(removed.name, "b");
        assert_eq!(names(&stack), vec!["c", "a"]);
        assert_contiguous(&stack);
        assert_eq!(stack.remove_layer(b).unwrap_err(), LayerError::UnknownLayer(b));
    }

    #[test]
    fn test_reorder_add_remove_sequence() {
        let mut stack = LayerStack::new();
        let a = stack.add_layer(spec("a"));
        let b = stack.add_layer(spec("b"));
        stack.add_layer(spec("c"));
        // c, b, a
        stack.reorder(a, 1).unwrap();
        let d = stack.add_layer(spec("d"));
        stack.remove_layer(b).unwrap();
        assert_eq!(names(&stack), vec!["d", "c", "a"]);
        assert_contiguous(&stack);

        let z: Vec<usize> = stack.layers().iter().map(Layer::z_order).collect();
        assert_eq!(z, vec![0, 1, 2]);
        let painted: Vec<LayerId> = stack.render_order().map(|l| l.id).collect();
        let mut top_first: Vec<LayerId> = stack.layers().iter().map(|l| l.id).collect();
        top_first.reverse();
        assert_eq!(painted, top_first);
        assert_eq!(painted.first(), Some(&a));
        assert_eq!(painted.last(), Some(&d));

        let snapshot = stack.snapshot();
        let snap_painted: Vec<usize> = snapshot.render_order().map(Layer::z_order).collect();
        assert_eq!(snap_painted, vec![2, 1, 0]);
    }

    #[test]
    fn test_set_source_bumps_revision() {
        let mut stack = LayerStack::new();
        let a = stack.add_layer(spec("a"));
        assert_eq!(stack.get(a).unwrap().source_revision(), 0);

        let source = Arc::new(StaticSource::new(CrsId::epsg(4326), Vec::new()));
        stack.set_source(a, Some(source.clone())).unwrap();
        stack.set_source(a, Some(source)).unwrap();
        assert_eq!(stack.get(a).unwrap().source_revision(), 2);
        stack.set_source(a, None).unwrap();
        let layer = stack.get(a).unwrap();
        assert_eq!(layer.source_revision(), 3);
        assert!(!layer.is_bound());
        assert_eq!(
            stack.set_source(LayerId(99), None),
            Err(LayerError::UnknownLayer(LayerId(99)))
        );
    }

    #[test]
    fn test_move_helpers() {
        let mut stack = LayerStack::new();
        let a = stack.add_layer(spec("a"));
        let b = stack.add_layer(spec("b"));
        let c = stack.add_layer(spec("c"));
        // c, b, a
        assert!(!stack.move_up(c).unwrap());
        assert!(stack.move_up(b).unwrap());
        assert_eq!(names(&stack), vec!["b", "c", "a"]);
        assert!(!stack.move_down(a).unwrap());
        stack.move_to_bottom(b).unwrap();
        assert_eq!(names(&stack), vec!["c", "a", "b"]);
        stack.move_to_top(a).unwrap();
        assert_eq!(names(&stack), vec!["a", "c", "b"]);
        assert_contiguous(&stack);
    }

    #[test]
    fn test_opacity_is_clamped() {
        let mut stack = LayerStack::new();
        let a = stack.add_layer(spec("a"));
        stack.set_opacity(a, 1.7).unwrap();
        assert_eq!(stack.get(a).unwrap().opacity, 1.0);
        stack.set_opacity(a, -0.2).unwrap();
        assert_eq!(stack.get(a).unwrap().opacity, 0.0);
        assert!(matches!(
            stack.set_opacity(a, f64::NAN),
            Err(LayerError::InvalidOpacity(_))
        ));
    }

    #[test]
    fn test_scale_range_and_visibility() {
        let mut stack = LayerStack::new();
        let a = stack.add_layer(spec("a"));
        let b = stack.add_layer(spec("b"));
        stack
            .set_scale_range(a, ScaleRange::new(None, Some(10_000.0)).unwrap())
            .unwrap();
        stack.set_visible(b, false).unwrap();

        assert!(stack.visible_layers(5_000.0).iter().any(|l| l.id == a));
        assert!(stack.visible_layers(50_000.0).is_empty());

        stack.set_all_visible(true);
        assert_eq!(stack.visible_layers(50_000.0).len(), 1);

        let bad = ScaleRange {
            min: Some(5.0),
            max: Some(1.0),
        };
        assert!(stack.set_scale_range(a, bad).is_err());
    }

    #[test]
    fn test_snapshot_is_isolated_from_edits() {
        let mut stack = LayerStack::new();
        let a = stack.add_layer(spec("a"));
        let snapshot = stack.snapshot();
        stack.add_layer(spec("b"));
        stack.set_visible(a, false).unwrap();

        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.get(a).unwrap().visible);
        assert!(snapshot.revision() < stack.revision());
    }

    #[test]
    fn test_layer_by_name_and_restore() {
        let mut stack = LayerStack::new();
        stack.restore_layer(LayerId(7), spec("parcels")).unwrap();
        stack.restore_layer(LayerId(3), spec("roads")).unwrap();
        assert_eq!(
            stack.restore_layer(LayerId(3), spec("dup")),
            Err(LayerError::DuplicateId(LayerId(3)))
        );
        assert_eq!(stack.layer_by_name("roads").unwrap().id, LayerId(3));
        assert_eq!(names(&stack), vec!["parcels", "roads"]);

        // Fresh ids never collide with restored ones.
        let fresh = stack.add_layer(spec("new"));
        assert_eq!(fresh, LayerId(8));
    }
}
