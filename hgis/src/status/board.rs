//! Per-layer load state shared between the renderer and the UI.

use dashmap::DashMap;

use super::{format_coordinate, format_scale};
use crate::crs::registry;
use crate::layer::{LayerId, LayerKind, LayerSnapshot, LayerStatus};
use crate::viewport::{ScreenPoint, Viewport};

/// Latest known status of every layer.
///
/// Written by the redraw coordinator and project loader, read by the UI.
#[derive(Debug, Default)]
pub struct StatusBoard {
    statuses: DashMap<LayerId, LayerStatus>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, layer: LayerId, status: LayerStatus) {
        self.statuses.insert(layer, status);
    }

    /// Status of `layer`; layers never reported are pending.
    pub fn get(&self, layer: LayerId) -> LayerStatus {
        self.statuses
            .get(&layer)
            .map(|s| s.value().clone())
            .unwrap_or(LayerStatus::Pending)
    }

    pub fn remove(&self, layer: LayerId) {
        self.statuses.remove(&layer);
    }

    /// Forget layers that are no longer in `snapshot`.
    pub fn retain_layers(&self, snapshot: &LayerSnapshot) {
        self.statuses
            .retain(|id, _| snapshot.layers().iter().any(|l| l.id == *id));
    }

    pub fn failed_count(&self) -> usize {
        self.statuses.iter().filter(|s| s.value().is_failed()).count()
    }
}

/// One row of the layer list.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerStatusLine {
    pub id: LayerId,
    pub name: String,
    pub kind: LayerKind,
    pub visible: bool,
    pub status: LayerStatus,
}

/// Everything the status bar and layer list display.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    pub cursor: Option<String>,
    pub scale: String,
    pub crs: String,
    /// Top layer first.
    pub layers: Vec<LayerStatusLine>,
}

impl StatusSnapshot {
    pub fn capture(
        viewport: &Viewport,
        layers: &LayerSnapshot,
        board: &StatusBoard,
        cursor: Option<ScreenPoint>,
    ) -> Self {
        let units = registry::lookup(viewport.crs()).map(|crs| crs.units).ok();
        let cursor = cursor.and_then(|p| {
            let world = viewport.screen_to_world(p);
            units.map(|u| format_coordinate(world, u))
        });
        Self {
            cursor,
            scale: format_scale(viewport.scale()),
            crs: viewport.crs().to_string(),
            layers: layers
                .layers()
                .iter()
                .map(|layer| LayerStatusLine {
                    id: layer.id,
                    name: layer.name.clone(),
                    kind: layer.kind,
                    visible: layer.visible,
                    status: match (&layer.source, board.get(layer.id)) {
                        (None, LayerStatus::Pending) => {
                            LayerStatus::Unbound("source not bound".into())
                        }
                        (_, status) => status,
                    },
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::CrsId;
    use crate::geometry::BoundingBox;
    use crate::layer::{LayerStack, NewLayer};
    use crate::source::SourceBinding;

    fn stack() -> LayerStack {
        let mut stack = LayerStack::default();
        for name in ["roads", "parcels"] {
            stack.add_layer(NewLayer::new(
                name,
                SourceBinding::VectorFile {
                    path: format!("{}.shp", name).into(),
                },
                CrsId::epsg(5186),
            ));
        }
        stack
    }

    #[test]
    fn test_board_defaults_to_pending() {
        let board = StatusBoard::new();
        assert_eq!(board.get(LayerId(4)), LayerStatus::Pending);
        board.set(LayerId(4), LayerStatus::Broken("timeout".into()));
        assert_eq!(board.failed_count(), 1);
        board.remove(LayerId(4));
        assert_eq!(board.failed_count(), 0);
    }

    #[test]
    fn test_capture_formats_status_bar() {
        let viewport = Viewport::new(
            CrsId::epsg(5186),
            BoundingBox::new(196_000.0, 548_000.0, 204_000.0, 554_000.0),
            800,
            600,
        )
        .unwrap();
        let stack = stack();
        let board = StatusBoard::new();
        let parcels = stack.layers()[0].id;
        board.set(parcels, LayerStatus::Ready);

        let status = StatusSnapshot::capture(
            &viewport,
            &stack.snapshot(),
            &board,
            Some(ScreenPoint::new(400.0, 300.0)),
        );
        assert_eq!(status.cursor.as_deref(), Some("200000.00, 551000.00"));
        assert_eq!(status.scale, "1:35,714");
        assert_eq!(status.crs, "EPSG:5186");
        assert_eq!(status.layers.len(), 2);
        assert_eq!(status.layers[0].name, "parcels");
        assert_eq!(status.layers[0].status, LayerStatus::Ready);
        // Never bound, never reported.
        assert!(matches!(status.layers[1].status, LayerStatus::Unbound(_)));
    }

    #[test]
    fn test_retain_layers_drops_removed() {
        let mut stack = stack();
        let board = StatusBoard::new();
        for layer in stack.layers() {
            board.set(layer.id, LayerStatus::Ready);
        }
        let gone = stack.layers()[1].id;
        stack.remove_layer(gone).unwrap();
        board.retain_layers(&stack.snapshot());
        assert_eq!(board.statuses.len(), 1);
    }
}
