//! MBTiles metadata assembly.

use serde_json::json;

use crate::{FieldSchema, TilesetConfig, encode::LAYER_NAME};

/// Description of the single vector layer.
pub const LAYER_DESCRIPTION: &str = "Point layer imported from GeoJSON.";

/// Ordered `name`/`value` pairs destined for the `metadata` table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataRecord {
    entries: Vec<(String, String)>,
}

impl MetadataRecord {
    /// Append an entry.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Value stored under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the record has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Builds the [`MetadataRecord`] for a finished run.
#[derive(Debug, Clone, Copy)]
pub struct MetadataAssembler<'a> {
    config: &'a TilesetConfig,
}

impl<'a> MetadataAssembler<'a> {
    /// Assembler for the given run configuration.
    #[must_use]
    pub const fn new(config: &'a TilesetConfig) -> Self {
        Self { config }
    }

    /// Produce the metadata rows for `schema`.
    ///
    /// Keys are emitted in a fixed order; optional `attribution` and
    /// `description` only appear when configured.
    ///
    /// ```
    /// use supertiles_core::{FieldSchema, MetadataAssembler, TilesetConfig};
    ///
    /// let config = TilesetConfig::new("places").with_max_zoom(2);
    /// let record = MetadataAssembler::new(&config).assemble(&FieldSchema::default());
    /// assert_eq!(record.get("maxZoom"), Some("2"));
    /// assert_eq!(record.get("format"), Some("pbf"));
    /// ```
    #[must_use]
    pub fn assemble(&self, schema: &FieldSchema) -> MetadataRecord {
        let config = self.config;
        let mut record = MetadataRecord::default();
        record.push("name", config.name.as_str());
        record.push("format", "pbf");
        record.push("minZoom", config.min_zoom.to_string());
        record.push("maxZoom", config.effective_max_zoom().to_string());
        record.push("bounds", config.bounds.as_str());
        record.push("center", config.center.as_str());
        record.push("type", "overlay");
        record.push("version", config.tile_spec_version.to_string());
        if let Some(attribution) = &config.attribution {
            record.push("attribution", attribution.as_str());
        }
        if let Some(description) = &config.description {
            record.push("description", description.as_str());
        }
        record.push("json", layer_document(schema));
        record
    }
}

fn layer_document(schema: &FieldSchema) -> String {
    json!({
        "vector_layers": [{
            "id": LAYER_NAME,
            "description": LAYER_DESCRIPTION,
            "fields": schema.to_json(),
        }]
    })
    .to_string()
}
