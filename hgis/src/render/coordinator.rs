//! Redraw coordinator.
//!
//! Owns the render loop. Redraw requests are debounced, each accepted
//! request starts a new generation, and every drawn layer is rendered on its
//! own task. Results are tagged with the generation that asked for them;
//! anything older than the current generation is dropped on arrival.
//!
//! ```text
//!  request() ──► [debounce] ──► pass N ──┬─► layer A task ──┐
//!                                 │      ├─► layer B task ──┼─► results (gen-tagged)
//!                    cancel N-1 ◄─┘      └─► layer C task ──┘          │
//!                                                                      ▼
//!                        watch<Frame> ◄── composite ◄── drop if gen != N
//! ```
//!
//! Between passes each layer keeps its last good image, so panning shows the
//! old content shifted into place until the new content arrives.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::frame::{LayerFrameStatus, LayerImage};
use super::pass::{LayerOutcome, Renderer};
use super::{Frame, RenderError};
use crate::layer::{Layer, LayerId, LayerSnapshot, LayerStatus};
use crate::source::SourceError;
use crate::status::StatusBoard;
use crate::viewport::Viewport;

/// Queue depth for pending redraw requests.
const REQUEST_QUEUE: usize = 64;

/// A burst of requests is never held back longer than this many debounce
/// windows.
const MAX_DEBOUNCE_WINDOWS: u32 = 4;

/// Why a redraw was asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedrawReason {
    ViewportChanged,
    LayersChanged,
    /// New data is available for a layer; its cached fetches are dropped.
    DataArrived(LayerId),
}

/// Everything a pass needs: what to draw and where.
#[derive(Debug, Clone)]
pub struct RedrawRequest {
    pub snapshot: LayerSnapshot,
    pub viewport: Viewport,
    pub reason: RedrawReason,
}

impl RedrawRequest {
    pub fn new(snapshot: LayerSnapshot, viewport: Viewport, reason: RedrawReason) -> Self {
        Self {
            snapshot,
            viewport,
            reason,
        }
    }
}

/// Handle to the background render loop.
pub struct RedrawCoordinator {
    requests: mpsc::Sender<RedrawRequest>,
    frames: watch::Receiver<Option<Arc<Frame>>>,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl RedrawCoordinator {
    /// Start the render loop on the current runtime.
    pub fn spawn(renderer: Renderer, debounce: Duration, status: Arc<StatusBoard>) -> Self {
        let (requests, request_rx) = mpsc::channel(REQUEST_QUEUE);
        let (frames_tx, frames) = watch::channel(None);
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        let worker = RenderLoop {
            renderer,
            debounce,
            status,
            frames: frames_tx,
            generation: 0,
            current: None,
            images: HashMap::new(),
            results_tx,
            results_rx,
        };
        let task = tokio::spawn(worker.run(request_rx, shutdown.clone()));
        info!(debounce_ms = debounce.as_millis() as u64, "Redraw coordinator started");

        Self {
            requests,
            frames,
            shutdown,
            task,
        }
    }

    /// Queue a redraw, waiting for queue space.
    pub async fn request(&self, request: RedrawRequest) -> Result<(), RenderError> {
        self.requests
            .send(request)
            .await
            .map_err(|_| RenderError::CoordinatorClosed)
    }

    /// Queue a redraw without waiting.
    pub fn try_request(&self, request: RedrawRequest) -> Result<(), RenderError> {
        self.requests
            .try_send(request)
            .map_err(|_| RenderError::CoordinatorClosed)
    }

    /// Receiver notified on every published frame.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Frame>>> {
        self.frames.clone()
    }

    pub fn latest(&self) -> Option<Arc<Frame>> {
        self.frames.borrow().clone()
    }

    /// Cancel in-flight work and wait for the loop to exit.
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        if let Err(e) = (&mut self.task).await {
            warn!(error = %e, "Redraw coordinator task ended abnormally");
        }
    }
}

impl Drop for RedrawCoordinator {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

// ============================================================================
// Render loop
// ============================================================================

struct LayerResult {
    generation: u64,
    layer: LayerId,
    outcome: Result<LayerOutcome, SourceError>,
}

/// State of the pass currently being drawn.
struct Pass {
    generation: u64,
    viewport: Viewport,
    /// Drawn layers, top first, with their opacity.
    order: Vec<(LayerId, f64)>,
    pending: HashSet<LayerId>,
    statuses: HashMap<LayerId, LayerStatus>,
    cancel: CancellationToken,
}

struct RenderLoop {
    renderer: Renderer,
    debounce: Duration,
    status: Arc<StatusBoard>,
    frames: watch::Sender<Option<Arc<Frame>>>,
    generation: u64,
    current: Option<Pass>,
    images: HashMap<LayerId, LayerImage>,
    results_tx: mpsc::UnboundedSender<LayerResult>,
    results_rx: mpsc::UnboundedReceiver<LayerResult>,
}

impl RenderLoop {
    async fn run(mut self, mut requests: mpsc::Receiver<RedrawRequest>, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                next = requests.recv() => {
                    let Some(first) = next else { break };
                    // The running pass is superseded as soon as a new
                    // request shows up.
                    if let Some(pass) = &self.current {
                        pass.cancel.cancel();
                    }
                    match self.coalesce(first, &mut requests, &shutdown).await {
                        Some(latest) => self.start_pass(latest, &shutdown),
                        None => break,
                    }
                }
                Some(result) = self.results_rx.recv() => self.on_result(result),
            }
        }
        if let Some(pass) = &self.current {
            pass.cancel.cancel();
        }
        debug!(generation = self.generation, "Redraw coordinator stopped");
    }

    /// Trailing debounce: keep taking requests until the queue has been
    /// quiet for one window, then return the newest.
    async fn coalesce(
        &mut self,
        first: RedrawRequest,
        requests: &mut mpsc::Receiver<RedrawRequest>,
        shutdown: &CancellationToken,
    ) -> Option<RedrawRequest> {
        let mut latest = first;
        let mut coalesced = 0usize;
        let deadline = Instant::now() + self.debounce * MAX_DEBOUNCE_WINDOWS;
        loop {
            let wake = (Instant::now() + self.debounce).min(deadline);
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return None,
                next = requests.recv() => match next {
                    Some(request) => {
                        if let RedrawReason::DataArrived(id) = latest.reason {
                            self.renderer.cache().invalidate_layer(id);
                        }
                        latest = request;
                        coalesced += 1;
                    }
                    None => break,
                },
                _ = tokio::time::sleep_until(wake) => break,
            }
        }
        if coalesced > 0 {
            debug!(coalesced, "Coalesced redraw requests");
        }
        Some(latest)
    }

    fn start_pass(&mut self, request: RedrawRequest, shutdown: &CancellationToken) {
        self.generation += 1;
        let generation = self.generation;
        if let Some(previous) = self.current.take() {
            previous.cancel.cancel();
            if !previous.pending.is_empty() {
                debug!(
                    superseded = previous.generation,
                    outstanding = previous.pending.len(),
                    "Superseded render pass"
                );
            }
        }
        if let RedrawReason::DataArrived(id) = request.reason {
            self.renderer.cache().invalidate_layer(id);
        }

        let RedrawRequest {
            snapshot, viewport, reason,
        } = request;
        let scale = viewport.scale();
        let drawn: Vec<&Layer> = snapshot
            .layers()
            .iter()
            .filter(|l| l.is_drawn_at(scale))
            .collect();

        self.status.retain_layers(&snapshot);
        self.images
            .retain(|id, image| &image.crs == viewport.crs() && drawn.iter().any(|l| l.id == *id));

        let cancel = shutdown.child_token();
        for layer in &drawn {
            let renderer = self.renderer.clone();
            let results = self.results_tx.clone();
            let cancel = cancel.clone();
            let viewport = viewport.clone();
            let layer = (*layer).clone();
            tokio::spawn(async move {
                let outcome = renderer
                    .render_layer(&layer, &viewport, generation, &cancel)
                    .await;
                let _ = results.send(LayerResult {
                    generation,
                    layer: layer.id,
                    outcome,
                });
            });
        }

        debug!(
            generation,
            ?reason,
            layers = drawn.len(),
            scale = scale,
            "Render pass started"
        );
        self.current = Some(Pass {
            generation,
            order: drawn.iter().map(|l| (l.id, l.opacity)).collect(),
            pending: drawn.iter().map(|l| l.id).collect(),
            statuses: HashMap::new(),
            viewport,
            cancel,
        });
        self.publish();
    }

    fn on_result(&mut self, result: LayerResult) {
        let Some(pass) = self.current.as_mut() else {
            return;
        };
        if result.generation != pass.generation {
            debug!(
                layer = %result.layer,
                stale = result.generation,
                current = pass.generation,
                "Dropped stale layer result"
            );
            return;
        }
        let status = match result.outcome {
            Ok(outcome) => {
                match outcome.image {
                    Some(image) => {
                        self.images.insert(outcome.layer, image);
                    }
                    None => {
                        self.images.remove(&outcome.layer);
                    }
                }
                outcome.status
            }
            // Only the shutdown token can cancel the current pass.
            Err(SourceError::Cancelled) => return,
            Err(e) => LayerStatus::Broken(e.to_string()),
        };
        self.status.set(result.layer, status.clone());
        pass.statuses.insert(result.layer, status);
        pass.pending.remove(&result.layer);
        self.publish();
    }

    /// Composite the current pass with whatever images are on hand.
    fn publish(&self) {
        let Some(pass) = &self.current else {
            return;
        };
        let image = match self
            .renderer
            .composite(&pass.viewport, &pass.order, &self.images)
        {
            Ok(image) => image,
            Err(e) => {
                warn!(generation = pass.generation, error = %e, "Compositing failed");
                return;
            }
        };
        let layers = pass
            .order
            .iter()
            .map(|(id, _)| LayerFrameStatus {
                layer: *id,
                status: pass
                    .statuses
                    .get(id)
                    .cloned()
                    .unwrap_or_else(|| self.status.get(*id)),
                content_generation: self.images.get(id).map(|i| i.generation),
            })
            .collect();
        let complete = pass.pending.is_empty();
        if complete {
            debug!(generation = pass.generation, "Render pass complete");
        }
        self.frames.send_replace(Some(Arc::new(Frame {
            generation: pass.generation,
            crs: pass.viewport.crs().clone(),
            view: pass.viewport.state(),
            image,
            layers,
            complete,
        })));
    }
}
