//! Layer value types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::crs::CrsId;
use crate::source::{DataSource, SourceBinding, SourceKind};

use super::LayerError;

/// Stable identifier of a layer within a project.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct LayerId(pub u64);

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// The kind of data a layer draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    Vector,
    Raster,
    Service,
    Database,
}

impl From<SourceKind> for LayerKind {
    fn from(kind: SourceKind) -> Self {
        match kind {
            SourceKind::VectorFile => LayerKind::Vector,
            SourceKind::RasterTile => LayerKind::Raster,
            SourceKind::Service => LayerKind::Service,
            SourceKind::Database => LayerKind::Database,
        }
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LayerKind::Vector => "vector",
            LayerKind::Raster => "raster",
            LayerKind::Service => "service",
            LayerKind::Database => "database",
        };
        f.write_str(name)
    }
}

/// Range of scale denominators in which a layer is drawn.
///
/// `min` is the most zoomed-in scale (smallest denominator) and `max` the
/// most zoomed-out one; `None` leaves that side unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScaleRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl ScaleRange {
    pub const UNBOUNDED: ScaleRange = ScaleRange {
        min: None,
        max: None,
    };

    pub fn new(min: Option<f64>, max: Option<f64>) -> Result<Self, LayerError> {
        for value in [min, max].into_iter().flatten() {
            if !value.is_finite() || value <= 0.0 {
                return Err(LayerError::InvalidScaleRange(format!(
                    "scale denominator {} must be positive",
                    value
                )));
            }
        }
        if let (Some(lo), Some(hi)) = (min, max) {
            if lo > hi {
                return Err(LayerError::InvalidScaleRange(format!(
                    "minimum 1:{} is larger than maximum 1:{}",
                    lo, hi
                )));
            }
        }
        Ok(Self { min, max })
    }

    pub fn contains(&self, scale: f64) -> bool {
        self.min.is_none_or(|lo| scale >= lo) && self.max.is_none_or(|hi| scale <= hi)
    }
}

/// Descriptive metadata shown in layer properties.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LayerMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, rename = "abstract", skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribution: Option<String>,
}

/// Load state of a layer, as shown in the layer list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerStatus {
    /// Bound but not drawn yet.
    Pending,
    Ready,
    /// Drawn, but some features failed to reproject.
    Partial { failed: usize },
    /// The last fetch failed; the layer renders empty.
    Broken(String),
    /// The source could not be bound when the project was opened.
    Unbound(String),
}

impl LayerStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, LayerStatus::Broken(_) | LayerStatus::Unbound(_))
    }
}

impl fmt::Display for LayerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerStatus::Pending => f.write_str("loading"),
            LayerStatus::Ready => f.write_str("ready"),
            LayerStatus::Partial { failed } => write!(f, "partial ({} features skipped)", failed),
            LayerStatus::Broken(reason) => write!(f, "broken: {}", reason),
            LayerStatus::Unbound(reason) => write!(f, "unavailable: {}", reason),
        }
    }
}

/// Description of a layer to add to a stack.
#[derive(Debug, Clone)]
pub struct NewLayer {
    pub name: String,
    pub binding: SourceBinding,
    pub source_crs: CrsId,
    pub style: Option<String>,
    pub metadata: LayerMetadata,
    pub visible: bool,
    pub opacity: f64,
    pub scale_range: ScaleRange,
}

impl NewLayer {
    pub fn new(name: impl Into<String>, binding: SourceBinding, source_crs: CrsId) -> Self {
        Self {
            name: name.into(),
            binding,
            source_crs,
            style: None,
            metadata: LayerMetadata::default(),
            visible: true,
            opacity: 1.0,
            scale_range: ScaleRange::UNBOUNDED,
        }
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = Some(style.into());
        self
    }

    pub fn with_metadata(mut self, metadata: LayerMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_visibility(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    pub fn with_opacity(mut self, opacity: f64) -> Self {
        self.opacity = opacity;
        self
    }

    pub fn with_scale_range(mut self, range: ScaleRange) -> Self {
        self.scale_range = range;
        self
    }
}

/// A layer in the stack.
///
/// The adapter handle is optional: a layer whose source failed to bind is
/// kept (so it survives a save) but renders nothing.
#[derive(Clone)]
pub struct Layer {
    pub id: LayerId,
    pub name: String,
    pub kind: LayerKind,
    pub binding: SourceBinding,
    pub source: Option<Arc<dyn DataSource>>,
    pub source_crs: CrsId,
    pub style: Option<String>,
    pub metadata: LayerMetadata,
    pub visible: bool,
    pub opacity: f64,
    pub scale_range: ScaleRange,
    pub(crate) z_order: usize,
    pub(crate) source_revision: u64,
}

impl Layer {
    pub(crate) fn from_new(id: LayerId, spec: NewLayer) -> Self {
        Self {
            id,
            name: spec.name,
            kind: LayerKind::from(spec.binding.kind()),
            binding: spec.binding,
            source: None,
            source_crs: spec.source_crs,
            style: spec.style,
            metadata: spec.metadata,
            visible: spec.visible,
            opacity: spec.opacity.clamp(0.0, 1.0),
            scale_range: spec.scale_range,
            z_order: 0,
            source_revision: 0,
        }
    }

    /// Position in the stack; 0 is the top (front-most) layer.
    pub fn z_order(&self) -> usize {
        self.z_order
    }

    /// Bumped every time the layer is rebound to an adapter.
    pub fn source_revision(&self) -> u64 {
        self.source_revision
    }

    pub fn is_bound(&self) -> bool {
        self.source.is_some()
    }

    /// Whether the layer should be drawn at `scale`.
    pub fn is_drawn_at(&self, scale: f64) -> bool {
        self.visible && self.scale_range.contains(scale)
    }
}

impl fmt::Debug for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Layer")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("bound", &self.source.is_some())
            .field("visible", &self.visible)
            .field("opacity", &self.opacity)
            .field("z_order", &self.z_order)
            .field("source_revision", &self.source_revision)
            .finish()
    }
}
