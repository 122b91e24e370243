//! Features: geometry plus attributes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::{BoundingBox, Geometry};
use crate::layer::LayerId;

/// Identifier of a feature, unique within its layer.
pub type FeatureId = u64;

/// Attribute table row: field name to scalar value.
pub type Attributes = BTreeMap<String, AttributeValue>;

/// Scalar attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl AttributeValue {
    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Integer(v) => Some(*v as f64),
            AttributeValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Null => f.write_str("NULL"),
            AttributeValue::Bool(v) => write!(f, "{}", v),
            AttributeValue::Integer(v) => write!(f, "{}", v),
            AttributeValue::Float(v) => write!(f, "{}", v),
            AttributeValue::Text(v) => f.write_str(v),
        }
    }
}

/// A geometry with attributes, owned by exactly one layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub id: FeatureId,
    pub geometry: Geometry,
    pub attributes: Attributes,
}

impl Feature {
    pub fn new(id: FeatureId, geometry: Geometry) -> Self {
        Self {
            id,
            geometry,
            attributes: Attributes::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: AttributeValue) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    pub fn bbox(&self) -> Option<BoundingBox> {
        self.geometry.bbox()
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    /// Rough heap footprint, used for cache accounting.
    pub fn estimated_size(&self) -> usize {
        let coords = self.geometry.shape().coord_count() * std::mem::size_of::<super::Coord>();
        let attrs: usize = self
            .attributes
            .iter()
            .map(|(k, v)| {
                k.len()
                    + std::mem::size_of::<AttributeValue>()
                    + v.as_str().map_or(0, str::len)
            })
            .sum();
        std::mem::size_of::<Feature>() + coords + attrs
    }
}

/// Reference to a feature in a specific layer, as returned by index queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeatureHandle {
    pub layer: LayerId,
    pub feature: FeatureId,
}

impl FeatureHandle {
    pub fn new(layer: LayerId, feature: FeatureId) -> Self {
        Self { layer, feature }
    }
}

impl fmt::Display for FeatureHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.layer, self.feature)
    }
}
