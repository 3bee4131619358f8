//! # Catalog Snapshot
//!
//! Read-only view of the music library: every item id with its bag of typed
//! attributes ("tags"). The playback core never owns descriptive data; it asks
//! the snapshot whether an item is playable, where its source lives, how long
//! it is and what to show as "now playing".
//!
//! ## Attribute keys
//!
//! - `local_mp3`, `local_ogg`, `local_m4a`: streamable sources (text)
//! - `duration`: length in seconds (integer)
//! - `title`, `artist`, `thumbnail`: display metadata (text)
//! - `embedding`: content vector used for similarity (vector)
//!
//! ## JSON layout
//!
//! ```json
//! {
//!   "musics": [1, 2],
//!   "tags": [
//!     {"music_id": 1, "key": "local_mp3", "text": "a.mp3"},
//!     {"music_id": 1, "key": "duration", "integer": 215},
//!     {"music_id": 1, "key": "embedding", "vector": [0.1, 0.7]}
//!   ]
//! }
//! ```

use crate::embedding::{EmbeddingStore, EmbeddingVector};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;

/// Attribute keys that point at a file the device can stream, in priority order.
pub const STREAMABLE_KEYS: [&str; 3] = ["local_mp3", "local_ogg", "local_m4a"];

pub const DURATION_KEY: &str = "duration";
pub const TITLE_KEY: &str = "title";
pub const ARTIST_KEY: &str = "artist";
pub const THUMBNAIL_KEY: &str = "thumbnail";
pub const EMBEDDING_KEY: &str = "embedding";

/// Opaque item identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub u32);

impl ItemId {
    /// Validate a raw id coming from outside (snapshots, CLI, databases).
    ///
    /// Negative or out-of-range values are rejected.
    #[must_use]
    pub fn from_raw(raw: i64) -> Option<Self> {
        u32::try_from(raw).ok().map(Self)
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A single typed attribute value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integer: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<EmbeddingVector>,
}

impl Attribute {
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self {
            text: Some(value.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn integer(value: i64) -> Self {
        Self {
            integer: Some(value),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn vector(value: impl Into<EmbeddingVector>) -> Self {
        Self {
            vector: Some(value.into()),
            ..Self::default()
        }
    }
}

pub type Attributes = HashMap<String, Attribute>;

/// One row of the serialized tag table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagRecord {
    pub music_id: i64,
    pub key: String,
    #[serde(flatten)]
    pub value: Attribute,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CatalogFile {
    musics: Vec<i64>,
    #[serde(default)]
    tags: Vec<TagRecord>,
}

/// Display metadata handed to the now-playing sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackInfo {
    pub id: ItemId,
    pub title: String,
    pub artist: String,
    pub thumbnail: Option<String>,
}

/// Read-only catalog snapshot.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    order: Vec<ItemId>,
    items: HashMap<ItemId, Attributes>,
    storage_root: String,
}

impl Catalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefix prepended to source attributes when building locators.
    #[must_use]
    pub fn with_storage_root(mut self, root: impl Into<String>) -> Self {
        self.storage_root = root.into();
        self
    }

    /// Register an item. Registering an id twice keeps its first position.
    pub fn insert_item(&mut self, id: ItemId) {
        if !self.items.contains_key(&id) {
            self.order.push(id);
            self.items.insert(id, Attributes::new());
        }
    }

    /// Set an attribute, registering the item if needed.
    pub fn set_attribute(&mut self, id: ItemId, key: impl Into<String>, value: Attribute) {
        self.insert_item(id);
        if let Some(attrs) = self.items.get_mut(&id) {
            attrs.insert(key.into(), value);
        }
    }

    /// Build a snapshot from item ids and tag rows.
    ///
    /// Invalid ids and tags for unknown items are skipped.
    #[must_use]
    pub fn from_records(musics: &[i64], tags: Vec<TagRecord>) -> Self {
        let mut catalog = Self::new();
        for id in musics.iter().filter_map(|&raw| ItemId::from_raw(raw)) {
            catalog.insert_item(id);
        }

        let mut skipped = 0usize;
        for tag in tags {
            match ItemId::from_raw(tag.music_id).filter(|id| catalog.contains(*id)) {
                Some(id) => catalog.set_attribute(id, tag.key, tag.value),
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            log::debug!("Skipped {skipped} tags referencing unknown items");
        }

        catalog
    }

    /// Parse the JSON catalog layout.
    pub fn from_json(json: &str) -> Result<Self> {
        let file: CatalogFile =
            serde_json::from_str(json).context("Catalog JSON does not match the musics/tags layout")?;
        Ok(Self::from_records(&file.musics, file.tags))
    }

    /// Read a JSON catalog from disk.
    pub fn load_json(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog file {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("Invalid catalog file {}", path.display()))
    }

    /// Serialize back to the JSON layout.
    pub fn to_json(&self) -> Result<String> {
        let file = CatalogFile {
            musics: self.order.iter().map(|id| i64::from(id.0)).collect(),
            tags: self
                .order
                .iter()
                .flat_map(|&id| {
                    self.attributes(id).map(move |(key, value)| TagRecord {
                        music_id: i64::from(id.0),
                        key: key.to_string(),
                        value: value.clone(),
                    })
                })
                .collect(),
        };
        serde_json::to_string_pretty(&file).context("Failed to serialize catalog")
    }

    /// All items in catalog order.
    #[must_use]
    pub fn items(&self) -> &[ItemId] {
        &self.order
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: ItemId) -> bool {
        self.items.contains_key(&id)
    }

    #[must_use]
    pub fn attribute(&self, id: ItemId, key: &str) -> Option<&Attribute> {
        self.items.get(&id)?.get(key)
    }

    /// All attributes of an item, sorted by key.
    pub fn attributes(&self, id: ItemId) -> impl Iterator<Item = (&str, &Attribute)> + '_ {
        let mut attrs: Vec<(&str, &Attribute)> = self
            .items
            .get(&id)
            .map(|attrs| attrs.iter().map(|(k, v)| (k.as_str(), v)).collect())
            .unwrap_or_default();
        attrs.sort_by(|a, b| a.0.cmp(b.0));
        attrs.into_iter()
    }

    fn text(&self, id: ItemId, key: &str) -> Option<&str> {
        self.attribute(id, key)?.text.as_deref()
    }

    /// Whether the item has a source the device can stream.
    #[must_use]
    pub fn is_playable(&self, id: ItemId) -> bool {
        self.source_locator(id).is_some()
    }

    /// Locator of the first streamable source, prefixed with the storage root.
    #[must_use]
    pub fn source_locator(&self, id: ItemId) -> Option<String> {
        STREAMABLE_KEYS
            .iter()
            .find_map(|key| self.text(id, key).filter(|s| !s.is_empty()))
            .map(|source| format!("{}{source}", self.storage_root))
    }

    /// Duration estimate in seconds, if the catalog knows it.
    #[must_use]
    pub fn duration(&self, id: ItemId) -> Option<f64> {
        self.attribute(id, DURATION_KEY)?
            .integer
            .filter(|&secs| secs > 0)
            .map(|secs| secs as f64)
    }

    #[must_use]
    pub fn track_info(&self, id: ItemId) -> TrackInfo {
        TrackInfo {
            id,
            title: self.text(id, TITLE_KEY).unwrap_or("No Title").to_string(),
            artist: self.text(id, ARTIST_KEY).unwrap_or("No Artist").to_string(),
            thumbnail: self.text(id, THUMBNAIL_KEY).map(str::to_string),
        }
    }
}

impl EmbeddingStore for Catalog {
    fn lookup(&self, item: ItemId) -> Option<&EmbeddingVector> {
        self.attribute(item, EMBEDDING_KEY)?.vector.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_catalog() -> Catalog {
        let mut catalog = Catalog::new().with_storage_root("storage/");
        catalog.set_attribute(ItemId(1), "local_mp3", Attribute::text("one.mp3"));
        catalog.set_attribute(ItemId(1), DURATION_KEY, Attribute::integer(200));
        catalog.set_attribute(ItemId(1), TITLE_KEY, Attribute::text("One"));
        catalog.set_attribute(ItemId(2), "youtube_url", Attribute::text("https://example.invalid"));
        catalog.set_attribute(ItemId(3), "local_ogg", Attribute::text("three.ogg"));
        catalog.set_attribute(ItemId(3), EMBEDDING_KEY, Attribute::vector(vec![1.0, 0.0]));
        catalog
    }

    #[test]
    fn raw_ids_are_validated() {
        assert_eq!(ItemId::from_raw(7), Some(ItemId(7)));
        assert_eq!(ItemId::from_raw(-1), None);
        assert_eq!(ItemId::from_raw(i64::from(u32::MAX) + 1), None);
    }

    #[test]
    fn items_keep_insertion_order() {
        let catalog = sample_catalog();
        assert_eq!(catalog.items(), &[ItemId(1), ItemId(2), ItemId(3)]);
    }

    #[test]
    fn playability_requires_streamable_source() {
        let catalog = sample_catalog();
        assert!(catalog.is_playable(ItemId(1)));
        assert!(!catalog.is_playable(ItemId(2)));
        assert!(catalog.is_playable(ItemId(3)));
        assert!(!catalog.is_playable(ItemId(99)));
    }

    #[test]
    fn locator_uses_storage_root() {
        let catalog = sample_catalog();
        assert_eq!(catalog.source_locator(ItemId(1)).as_deref(), Some("storage/one.mp3"));
        assert_eq!(catalog.source_locator(ItemId(3)).as_deref(), Some("storage/three.ogg"));
    }

    #[test]
    fn duration_and_track_info() {
        let catalog = sample_catalog();
        assert_eq!(catalog.duration(ItemId(1)), Some(200.0));
        assert_eq!(catalog.duration(ItemId(3)), None);

        let info = catalog.track_info(ItemId(3));
        assert_eq!(info.title, "No Title");
        assert_eq!(info.artist, "No Artist");
        assert_eq!(catalog.track_info(ItemId(1)).title, "One");
    }

    #[test]
    fn catalog_serves_embeddings() {
        let catalog = sample_catalog();
        assert_eq!(catalog.lookup(ItemId(3)).map(EmbeddingVector::magnitude), Some(1.0));
        assert!(catalog.lookup(ItemId(1)).is_none());
    }

    #[test]
    fn json_layout_parses() {
        let json = r#"{
            "musics": [4, -2, 5],
            "tags": [
                {"music_id": 4, "key": "local_m4a", "text": "four.m4a"},
                {"music_id": 4, "key": "embedding", "vector": [0.0, 2.0]},
                {"music_id": 9, "key": "title", "text": "orphan"},
                {"music_id": 5, "key": "duration", "integer": 90}
            ]
        }"#;

        let catalog = Catalog::from_json(json).expect("valid catalog");
        assert_eq!(catalog.items(), &[ItemId(4), ItemId(5)]);
        assert!(catalog.is_playable(ItemId(4)));
        assert!(!catalog.contains(ItemId(9)));
        assert_eq!(catalog.duration(ItemId(5)), Some(90.0));
        assert_eq!(catalog.lookup(ItemId(4)).map(EmbeddingVector::magnitude), Some(2.0));
    }

    #[test]
    fn json_export_reloads() {
        let catalog = sample_catalog();
        let json = catalog.to_json().expect("serializable");
        let reloaded = Catalog::from_json(&json).expect("reloadable");

        assert_eq!(reloaded.items(), catalog.items());
        assert_eq!(reloaded.attribute(ItemId(1), TITLE_KEY), catalog.attribute(ItemId(1), TITLE_KEY));
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(Catalog::from_json("{\"tags\": []}").is_err());
    }
}
