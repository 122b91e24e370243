//! One render pass: fetch, reproject and paint each drawn layer.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tiny_skia::Pixmap;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::frame::{LayerFrameStatus, LayerImage};
use super::{Frame, RenderError, Surface, Symbol};
use crate::cache::{FetchCache, FetchKey};
use crate::crs::{CrsEngine, CrsId};
use crate::geometry::BoundingBox;
use crate::layer::{Layer, LayerId, LayerSnapshot, LayerStatus};
use crate::source::{FetchRequest, Payload, SourceError};
use crate::viewport::Viewport;

/// Knobs of the render engine.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderSettings {
    /// Requests arriving within this window are coalesced into the last.
    pub debounce: Duration,
    /// Fetches allowed in flight at once, across all layers.
    pub max_concurrent_fetches: usize,
    /// Straight-alpha RGBA.
    pub background: [u8; 4],
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(150),
            max_concurrent_fetches: 4,
            background: [255, 255, 255, 255],
        }
    }
}

/// Result of rendering one layer.
#[derive(Debug, Clone)]
pub struct LayerOutcome {
    pub layer: LayerId,
    pub status: LayerStatus,
    /// `None` when the layer failed or had nothing to draw.
    pub image: Option<LayerImage>,
}

impl LayerOutcome {
    fn failed(layer: LayerId, status: LayerStatus) -> Self {
        Self {
            layer,
            status,
            image: None,
        }
    }
}

/// Shared render machinery: CRS engine, fetch cache and the fetch permits
/// that bound the worker pool.
#[derive(Clone)]
pub struct Renderer {
    engine: Arc<CrsEngine>,
    cache: Arc<FetchCache>,
    permits: Arc<Semaphore>,
    background: [u8; 4],
}

impl Renderer {
    pub fn new(engine: Arc<CrsEngine>, cache: Arc<FetchCache>, settings: &RenderSettings) -> Self {
        Self {
            engine,
            cache,
            permits: Arc::new(Semaphore::new(settings.max_concurrent_fetches.max(1))),
            background: settings.background,
        }
    }

    pub fn engine(&self) -> &Arc<CrsEngine> {
        &self.engine
    }

    pub fn cache(&self) -> &Arc<FetchCache> {
        &self.cache
    }

    /// The fetch request matching what `viewport` shows.
    pub fn request_for(viewport: &Viewport) -> FetchRequest {
        FetchRequest::new(
            viewport.extent(),
            viewport.crs().clone(),
            viewport.scale(),
            viewport.width(),
            viewport.height(),
        )
    }

    async fn fetch(
        &self,
        layer: &Layer,
        request: &FetchRequest,
        cancel: &CancellationToken,
    ) -> Result<Arc<Payload>, SourceError> {
        let Some(source) = layer.source.as_ref() else {
            return Err(SourceError::SourceUnavailable("source not bound".into()));
        };
        let key = FetchKey::new(layer.id, layer.source_revision(), request);
        if let Some(payload) = self.cache.get(&key) {
            return Ok(payload);
        }

        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SourceError::Cancelled),
            permit = Arc::clone(&self.permits).acquire_owned() => {
                permit.map_err(|_| SourceError::Cancelled)?
            }
        };
        let payload = source.fetch(request, cancel).await?;
        Ok(self.cache.insert(key, payload))
    }

    /// Fetch, reproject and paint one layer for `viewport`.
    ///
    /// Only cancellation is returned as an error; every other failure is
    /// folded into the outcome's status so it stays scoped to the layer.
    pub async fn render_layer(
        &self,
        layer: &Layer,
        viewport: &Viewport,
        generation: u64,
        cancel: &CancellationToken,
    ) -> Result<LayerOutcome, SourceError> {
        if layer.source.is_none() {
            return Ok(LayerOutcome::failed(
                layer.id,
                LayerStatus::Unbound("source not bound".into()),
            ));
        }
        let request = Self::request_for(viewport);
        let payload = match self.fetch(layer, &request, cancel).await {
            Ok(payload) => payload,
            Err(SourceError::Cancelled) => return Err(SourceError::Cancelled),
            Err(e) => {
                warn!(layer = %layer.id, name = %layer.name, generation, error = %e, "Layer fetch failed");
                return Ok(LayerOutcome::failed(layer.id, LayerStatus::Broken(e.to_string())));
            }
        };

        let engine = Arc::clone(&self.engine);
        let crs = viewport.crs().clone();
        let extent = viewport.extent();
        let (width, height) = (viewport.width(), viewport.height());
        let symbol = Symbol::for_style(layer.style.as_deref(), &layer.name);
        let painted = tokio::task::spawn_blocking(move || {
            paint_payload(&engine, &payload, &crs, extent, width, height, &symbol)
        })
        .await;

        let (pixmap, failed) = match painted {
            Ok(Ok(painted)) => painted,
            Ok(Err(reason)) => {
                warn!(layer = %layer.id, generation, reason = %reason, "Layer could not be painted");
                return Ok(LayerOutcome::failed(layer.id, LayerStatus::Broken(reason)));
            }
            Err(e) => {
                return Ok(LayerOutcome::failed(
                    layer.id,
                    LayerStatus::Broken(format!("paint task failed: {}", e)),
                ))
            }
        };
        let status = if failed == 0 {
            LayerStatus::Ready
        } else {
            debug!(layer = %layer.id, failed, "Some features could not be reprojected");
            LayerStatus::Partial { failed }
        };
        Ok(LayerOutcome {
            layer: layer.id,
            status,
            image: Some(LayerImage {
                layer: layer.id,
                generation,
                extent,
                crs: viewport.crs().clone(),
                pixmap: Arc::new(pixmap),
            }),
        })
    }

    /// Composite layer images for `viewport`, bottom layer first.
    ///
    /// `layers` lists the drawn layers top first with their opacity. Images
    /// painted for another extent are scaled into place; images in another
    /// CRS are skipped.
    pub fn composite(
        &self,
        viewport: &Viewport,
        layers: &[(LayerId, f64)],
        images: &HashMap<LayerId, LayerImage>,
    ) -> Result<Arc<Pixmap>, RenderError> {
        let mut surface = Surface::new(viewport.width(), viewport.height(), viewport.extent())?;
        surface.fill(self.background);
        for (id, opacity) in layers.iter().rev() {
            let Some(image) = images.get(id) else {
                continue;
            };
            if &image.crs != viewport.crs() {
                continue;
            }
            surface.draw_pixmap(&image.pixmap, &image.extent, *opacity as f32);
        }
        Ok(Arc::new(surface.into_pixmap()))
    }

    /// Render a complete frame of `snapshot` in one go, without debouncing
    /// or a coordinator.
    pub async fn render_once(
        &self,
        snapshot: &LayerSnapshot,
        viewport: &Viewport,
    ) -> Result<Frame, RenderError> {
        let scale = viewport.scale();
        let drawn: Vec<&Layer> = snapshot
            .layers()
            .iter()
            .filter(|l| l.is_drawn_at(scale))
            .collect();
        let cancel = CancellationToken::new();
        let outcomes = futures::future::join_all(
            drawn
                .iter()
                .map(|layer| self.render_layer(layer, viewport, 0, &cancel)),
        )
        .await;

        let mut images = HashMap::new();
        let mut statuses = Vec::with_capacity(drawn.len());
        for (layer, outcome) in drawn.iter().zip(outcomes) {
            let outcome = outcome.unwrap_or_else(|e| {
                LayerOutcome::failed(layer.id, LayerStatus::Broken(e.to_string()))
            });
            let content_generation = outcome.image.as_ref().map(|i| i.generation);
            if let Some(image) = outcome.image {
                images.insert(layer.id, image);
            }
            statuses.push(LayerFrameStatus {
                layer: layer.id,
                status: outcome.status,
                content_generation,
            });
        }

        let order: Vec<(LayerId, f64)> = drawn.iter().map(|l| (l.id, l.opacity)).collect();
        let image = self.composite(viewport, &order, &images)?;
        Ok(Frame {
            generation: 0,
            crs: viewport.crs().clone(),
            view: viewport.state(),
            image,
            layers: statuses,
            complete: true,
        })
    }
}

/// Reproject a payload into `crs` and paint it onto a fresh transparent
/// pixmap. Returns the pixmap and the number of features that failed to
/// reproject.
fn paint_payload(
    engine: &CrsEngine,
    payload: &Payload,
    crs: &CrsId,
    extent: BoundingBox,
    width: u32,
    height: u32,
    symbol: &Symbol,
) -> Result<(Pixmap, usize), String> {
    let mut surface = Surface::new(width, height, extent).map_err(|e| e.to_string())?;
    let failed = match payload {
        Payload::Features(features) => {
            let batch = engine.transform_features(features, crs);
            surface.paint_features(&batch.features, symbol);
            batch.failures.len()
        }
        Payload::Image(tile) => {
            let placed = if &tile.crs == crs {
                tile.extent
            } else {
                engine
                    .transform_bbox(&tile.extent, &tile.crs, crs)
                    .map_err(|e| e.to_string())?
            };
            surface.paint_image(&tile.image, &placed);
            0
        }
    };
    Ok((surface.into_pixmap(), failed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Feature, Geometry};
    use crate::layer::{LayerStack, NewLayer};
    use crate::source::{DataSource, SourceBinding};
    use crate::testing::StaticSource;

    fn renderer() -> Renderer {
        Renderer::new(
            Arc::new(CrsEngine::new()),
            Arc::new(FetchCache::new(64 << 20)),
            &RenderSettings::default(),
        )
    }

    fn viewport() -> Viewport {
        Viewport::new(
            CrsId::epsg(4326),
            BoundingBox::new(126.8, 37.4, 127.2, 37.7),
            400,
            300,
        )
        .unwrap()
    }

    fn add(stack: &mut LayerStack, name: &str, style: &str, source: Option<Arc<dyn DataSource>>) -> LayerId {
        let id = stack.add_layer(
            NewLayer::new(
                name,
                SourceBinding::VectorFile {
                    path: format!("{}.shp", name).into(),
                },
                CrsId::epsg(4326),
            )
            .with_style(style),
        );
        stack.set_source(id, source).unwrap();
        id
    }

    fn points() -> Arc<StaticSource> {
        Arc::new(StaticSource::new(
            CrsId::epsg(4326),
            vec![Feature::new(1, Geometry::point(127.0, 37.55, CrsId::epsg(4326)))],
        ))
    }

    #[tokio::test]
    async fn test_render_once_paints_visible_layers() {
        let mut stack = LayerStack::default();
        let id = add(&mut stack, "poi", "#ff0000", Some(points()));
        let vp = viewport();

        let frame = renderer().render_once(&stack.snapshot(), &vp).await.unwrap();
        assert_eq!((frame.width(), frame.height()), (400, 300));
        assert_eq!(frame.layer(id).unwrap().status, LayerStatus::Ready);

        let p = vp.world_to_screen(crate::geometry::Coord::new(127.0, 37.55));
        let pixel = frame.pixel(p.x as u32, p.y as u32).unwrap();
        assert_eq!(pixel, [255, 0, 0, 255]);
        // Background elsewhere.
        assert_eq!(frame.pixel(5, 5).unwrap(), [255, 255, 255, 255]);
    }

    #[tokio::test]
    async fn test_failing_layer_does_not_block_others() {
        let mut stack = LayerStack::default();
        let broken = Arc::new(StaticSource::new(CrsId::epsg(4326), Vec::new()));
        broken.set_failure(Some(SourceError::SourceUnavailable("503".into())));
        let good = add(&mut stack, "poi", "#00ff00", Some(points()));
        let bad = add(&mut stack, "wms", "#0000ff", Some(broken));
        let unbound = add(&mut stack, "lost", "#000000", None);

        let frame = renderer()
            .render_once(&stack.snapshot(), &viewport())
            .await
            .unwrap();
        assert_eq!(frame.layer(good).unwrap().status, LayerStatus::Ready);
        assert!(matches!(frame.layer(bad).unwrap().status, LayerStatus::Broken(_)));
        assert!(matches!(frame.layer(unbound).unwrap().status, LayerStatus::Unbound(_)));
        assert!(frame.layer(bad).unwrap().content_generation.is_none());
    }

    #[tokio::test]
    async fn test_hidden_layer_is_not_fetched() {
        let mut stack = LayerStack::default();
        let source = points();
        let id = add(&mut stack, "poi", "#ff0000", Some(source.clone()));
        stack.set_visible(id, false).unwrap();

        let frame = renderer()
            .render_once(&stack.snapshot(), &viewport())
            .await
            .unwrap();
        assert!(frame.layers.is_empty());
        assert_eq!(source.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_second_render_hits_cache() {
        let mut stack = LayerStack::default();
        let source = points();
        add(&mut stack, "poi", "#ff0000", Some(source.clone()));
        let renderer = renderer();

        renderer.render_once(&stack.snapshot(), &viewport()).await.unwrap();
        renderer.render_once(&stack.snapshot(), &viewport()).await.unwrap();
        assert_eq!(source.fetch_count(), 1);
        assert_eq!(renderer.cache().stats().hits, 1);
    }

    #[tokio::test]
    async fn test_rebound_source_is_fetched_after_cached_render() {
        let mut stack = LayerStack::default();
        let first = points();
        let id = add(&mut stack, "poi", "#ff0000", Some(first.clone()));
        let renderer = renderer();
        renderer.render_once(&stack.snapshot(), &viewport()).await.unwrap();

        let second = Arc::new(StaticSource::new(
            CrsId::epsg(4326),
            vec![Feature::new(2, Geometry::point(127.1, 37.6, CrsId::epsg(4326)))],
        ));
        stack.set_source(id, Some(second.clone())).unwrap();
        let frame = renderer.render_once(&stack.snapshot(), &viewport()).await.unwrap();

        assert_eq!(first.fetch_count(), 1);
        assert_eq!(second.fetch_count(), 1);
        assert_eq!(renderer.cache().stats().hits, 0);
        assert_eq!(frame.layer(id).unwrap().status, LayerStatus::Ready);

        let vp = viewport();
        let p = vp.world_to_screen(crate::geometry::Coord::new(127.1, 37.6));
        assert_eq!(frame.pixel(p.x as u32, p.y as u32).unwrap(), [255, 0, 0, 255]);
        let old = vp.world_to_screen(crate::geometry::Coord::new(127.0, 37.55));
        assert_eq!(frame.pixel(old.x as u32, old.y as u32).unwrap(), [255, 255, 255, 255]);
    }

    #[tokio::test]
    async fn test_out_of_domain_features_make_layer_partial() {
        let mut stack = LayerStack::default();
        let source = Arc::new(StaticSource::new(
            CrsId::epsg(4326),
            vec![
                Feature::new(1, Geometry::point(127.0, 37.5, CrsId::epsg(4326))),
                Feature::new(2, Geometry::point(127.0, 89.0, CrsId::epsg(4326))),
            ],
        ));
        let id = add(&mut stack, "poi", "#ff0000", Some(source));
        let vp = Viewport::new(
            CrsId::epsg(3857),
            BoundingBox::new(14_100_000.0, 4_490_000.0, 14_170_000.0, 4_530_000.0),
            200,
            200,
        )
        .unwrap();

        let frame = renderer().render_once(&stack.snapshot(), &vp).await.unwrap();
        assert_eq!(
            frame.layer(id).unwrap().status,
            LayerStatus::Partial { failed: 1 }
        );
    }

    #[test]
    fn test_composite_respects_order_and_opacity() {
        let vp = viewport();
        let renderer = renderer();
        let solid = |rgba: [u8; 4], id: u64| {
            let mut s = Surface::new(vp.width(), vp.height(), vp.extent()).unwrap();
            s.fill(rgba);
            LayerImage {
                layer: LayerId(id),
                generation: 1,
                extent: vp.extent(),
                crs: vp.crs().clone(),
                pixmap: Arc::new(s.into_pixmap()),
            }
        };
        let mut images = HashMap::new();
        images.insert(LayerId(1), solid([255, 0, 0, 255], 1));
        images.insert(LayerId(2), solid([0, 0, 255, 255], 2));

        // Layer 1 on top, opaque.
        let top_red = renderer
            .composite(&vp, &[(LayerId(1), 1.0), (LayerId(2), 1.0)], &images)
            .unwrap();
        assert_eq!(super::super::surface::pixel_rgba(&top_red, 10, 10).unwrap(), [255, 0, 0, 255]);

        // Hidden top layer: blue shows through.
        let top_clear = renderer
            .composite(&vp, &[(LayerId(1), 0.0), (LayerId(2), 1.0)], &images)
            .unwrap();
        assert_eq!(super::super::surface::pixel_rgba(&top_clear, 10, 10).unwrap(), [0, 0, 255, 255]);
    }
}
