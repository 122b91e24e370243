//! The in-memory project and its serialization.

use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{debug, warn};

use super::document::{LayerRecord, ProjectDocument, VersionHeader, FORMAT_VERSION};
use super::{ProjectError, ProjectLoadWarning};
use crate::crs::{registry, CrsEngine, CrsId};
use crate::geometry::BoundingBox;
use crate::layer::{LayerId, LayerKind, LayerStack, NewLayer, ScaleRange};
use crate::render::{RedrawReason, RedrawRequest};
use crate::status::{StatusBoard, StatusSnapshot};
use crate::viewport::{ScreenPoint, Viewport};

/// A layer stack, the view onto it and the CRS everything is drawn in.
#[derive(Debug, Clone)]
pub struct Project {
    pub crs: CrsId,
    pub stack: LayerStack,
    pub viewport: Viewport,
    /// Where the project was last opened from or saved to.
    pub path: Option<PathBuf>,
}

impl Project {
    /// An empty project showing `extent` in `crs`.
    pub fn new(
        crs: CrsId,
        extent: BoundingBox,
        width: u32,
        height: u32,
    ) -> Result<Self, ProjectError> {
        if !registry::contains(&crs) {
            return Err(ProjectError::UnknownCrs(crs));
        }
        let viewport = Viewport::new(crs.clone(), extent, width, height)?;
        Ok(Self {
            crs,
            stack: LayerStack::new(),
            viewport,
            path: None,
        })
    }

    /// File stem of the project path, or "Untitled".
    pub fn name(&self) -> String {
        self.path
            .as_deref()
            .and_then(|p| p.file_stem())
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Untitled".to_string())
    }

    /// Switch the project CRS, carrying the view over.
    pub fn set_crs(&mut self, crs: CrsId, engine: &CrsEngine) -> Result<(), ProjectError> {
        if !registry::contains(&crs) {
            return Err(ProjectError::UnknownCrs(crs));
        }
        self.viewport.set_crs(crs.clone(), engine)?;
        self.crs = crs;
        Ok(())
    }

    /// Redraw request for the current state.
    pub fn redraw_request(&self, reason: RedrawReason) -> RedrawRequest {
        RedrawRequest::new(self.stack.snapshot(), self.viewport.clone(), reason)
    }

    pub fn status(&self, board: &StatusBoard, cursor: Option<ScreenPoint>) -> StatusSnapshot {
        StatusSnapshot::capture(&self.viewport, &self.stack.snapshot(), board, cursor)
    }
}

/// Serialize a project as pretty-printed JSON.
pub fn save(project: &Project) -> Result<Vec<u8>, ProjectError> {
    let document = ProjectDocument {
        version: FORMAT_VERSION,
        crs: project.crs.clone(),
        viewport: project.viewport.state(),
        layers: project.stack.layers().iter().map(LayerRecord::from).collect(),
    };
    let mut bytes = serde_json::to_vec_pretty(&document)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Rebuild a project from [`save`] output.
///
/// Layers come back unbound. Layer-level problems (unknown source CRS, out
/// of range settings, clashing ids) are repaired and reported as warnings;
/// only an unreadable document, an unknown format version or an unknown
/// project CRS fail the load.
pub fn load(bytes: &[u8]) -> Result<(Project, Vec<ProjectLoadWarning>), ProjectError> {
    let header: VersionHeader = serde_json::from_slice(bytes)?;
    if header.version == 0 || header.version > FORMAT_VERSION {
        return Err(ProjectError::UnsupportedVersion {
            found: header.version,
            supported: FORMAT_VERSION,
        });
    }
    let document: ProjectDocument = serde_json::from_slice(bytes)?;
    if !registry::contains(&document.crs) {
        return Err(ProjectError::UnknownCrs(document.crs));
    }
    let viewport = Viewport::from_state(document.crs.clone(), &document.viewport)?;

    let mut records = document.layers;
    records.sort_by_key(|r| r.z_order);

    let mut warnings = Vec::new();
    let mut seen = HashSet::new();
    let mut next_free = records.iter().map(|r| r.id.0).max().unwrap_or(0);
    let mut stack = LayerStack::new();

    for record in records {
        let mut id = record.id;
        if !seen.insert(id) {
            next_free += 1;
            let fresh = LayerId(next_free);
            warnings.push(ProjectLoadWarning::new(
                id,
                &record.name,
                format!("duplicate layer id, renumbered to {}", fresh),
            ));
            id = fresh;
            seen.insert(id);
        }
        if record.kind != LayerKind::from(record.source.kind()) {
            debug!(layer = %id, stored = %record.kind, "Layer kind taken from its source binding");
        }

        let mut opacity = record.opacity;
        if !(0.0..=1.0).contains(&opacity) {
            warnings.push(ProjectLoadWarning::new(
                id,
                &record.name,
                format!("opacity {} out of range, clamped", opacity),
            ));
            opacity = if opacity.is_nan() { 1.0 } else { opacity.clamp(0.0, 1.0) };
        }
        let scale_range = match ScaleRange::new(record.scale_range.min, record.scale_range.max) {
            Ok(range) => range,
            Err(e) => {
                warnings.push(ProjectLoadWarning::new(id, &record.name, format!("{}, ignored", e)));
                ScaleRange::UNBOUNDED
            }
        };
        if !registry::contains(&record.source_crs) {
            warnings.push(ProjectLoadWarning::new(
                id,
                &record.name,
                format!("unknown source CRS {}", record.source_crs),
            ));
        }

        let mut spec = NewLayer::new(record.name, record.source, record.source_crs)
            .with_metadata(record.metadata)
            .with_visibility(record.visible)
            .with_opacity(opacity)
            .with_scale_range(scale_range);
        spec.style = record.style;
        stack.restore_layer(id, spec)?;
    }

    for warning in &warnings {
        warn!(layer = %warning.layer, reason = %warning.reason, "Project layer repaired");
    }
    Ok((
        Project {
            crs: document.crs,
            stack,
            viewport,
            path: None,
        },
        warnings,
    ))
}
