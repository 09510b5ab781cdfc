//! Field schema inference across emitted features.

use std::sync::{Mutex, PoisonError};

use log::debug;
use serde_json::{Map, Value};

use crate::Feature;

/// Type tag recorded for a property, mirroring JSON value kinds.
///
/// Nulls, arrays and objects are all reported as `object`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyType {
    /// Any JSON number.
    Number,
    /// A JSON string.
    String,
    /// A JSON boolean.
    Boolean,
    /// Null, array or object.
    Object,
}

impl PropertyType {
    /// Classify a JSON value.
    #[must_use]
    pub const fn of(value: &Value) -> Self {
        match value {
            Value::Number(_) => Self::Number,
            Value::String(_) => Self::String,
            Value::Bool(_) => Self::Boolean,
            Value::Null | Value::Array(_) | Value::Object(_) => Self::Object,
        }
    }

    /// Name written into the schema document.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Number => "number",
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::Object => "object",
        }
    }

    /// Parse a name produced by [`PropertyType::as_str`].
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "number" => Some(Self::Number),
            "string" => Some(Self::String),
            "boolean" => Some(Self::Boolean),
            "object" => Some(Self::Object),
            _ => None,
        }
    }
}

/// Property name to type mapping, in first-seen order.
///
/// Stored as an insertion-ordered JSON object of type names; the metadata
/// document is the map itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSchema {
    fields: Map<String, Value>,
}

impl FieldSchema {
    /// Look up the recorded type of `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<PropertyType> {
        self.fields.get(name).and_then(kind_of)
    }

    /// Number of recorded fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether no fields were recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate fields in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, PropertyType)> {
        self.fields
            .iter()
            .filter_map(|(name, kind)| Some((name.as_str(), kind_of(kind)?)))
    }

    /// JSON object mapping each field to its type name.
    #[must_use]
    pub fn to_json(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    fn record(&mut self, name: &str, kind: PropertyType) {
        match self.get(name) {
            None => {
                self.fields
                    .insert(name.to_owned(), Value::from(kind.as_str()));
            }
            Some(existing) if existing != kind => {
                debug!(
                    "property {name:?} seen as {} after {}; keeping {}",
                    kind.as_str(),
                    existing.as_str(),
                    existing.as_str()
                );
            }
            Some(_) => {}
        }
    }
}

fn kind_of(name: &Value) -> Option<PropertyType> {
    name.as_str().and_then(PropertyType::from_name)
}

/// Accumulates the [`FieldSchema`] of a generation run.
///
/// `observe` may be called from several threads; the first type seen for a
/// name wins.
#[derive(Debug, Default)]
pub struct FieldSchemaCollector {
    schema: Mutex<FieldSchema>,
}

impl FieldSchemaCollector {
    /// Start an empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record every property of `feature` not seen before.
    pub fn observe(&self, feature: &Feature) {
        let mut schema = self.schema.lock().unwrap_or_else(PoisonError::into_inner);
        for (name, value) in &feature.properties {
            schema.record(name, PropertyType::of(value));
        }
    }

    /// Record all features of a tile.
    pub fn observe_all<'f>(&self, features: impl IntoIterator<Item = &'f Feature>) {
        for feature in features {
            self.observe(feature);
        }
    }

    /// Consume the collector and return the accumulated schema.
    #[must_use]
    pub fn finalize(self) -> FieldSchema {
        self.schema
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
