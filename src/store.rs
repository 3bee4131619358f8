//! # Snapshot Persistence
//!
//! A [`Snapshot`] is the part of a session worth keeping between runs: the
//! listening history, the current item and its position. Stores only see an
//! opaque string under a key; the snapshot itself is serialized as JSON.
//!
//! Ids are kept raw in the snapshot and validated on restore, since the
//! stored data may predate the catalog it is restored against.

use crate::catalog::ItemId;
use crate::device::Device;
use crate::player::{Dispatch, Library, Player};
use anyhow::{Context, Result};
use log::debug;
use rand::Rng;
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Key the session snapshot is stored under.
pub const SNAPSHOT_KEY: &str = "playback";

/// Persisted playback state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    /// Oldest first
    pub history: Vec<i64>,
    pub current: Option<i64>,
    pub position: f64,
}

impl Snapshot {
    /// Capture what a player would need to resume.
    #[must_use]
    pub fn capture<R: Rng>(player: &Player<R>) -> Self {
        Self {
            history: player.history().iter().map(|id| i64::from(id.0)).collect(),
            current: player.state().current().map(|id| i64::from(id.0)),
            position: player.state().position(),
        }
    }

    /// Restore into `player`. Invalid and unknown ids are dropped, the
    /// history keeps its newest entries, and the current item is reopened
    /// paused at the saved position.
    pub fn apply<R, D>(&self, player: &mut Player<R>, library: &Library<'_>, device: &mut D) -> Dispatch
    where
        R: Rng,
        D: Device + ?Sized,
    {
        let history: Vec<ItemId> = self.history.iter().filter_map(|&raw| ItemId::from_raw(raw)).collect();
        let dropped = self.history.len() - history.len();
        if dropped > 0 {
            debug!("Dropped {dropped} invalid history ids");
        }

        let current = self
            .current
            .and_then(ItemId::from_raw)
            .map(|id| (id, self.position));
        player.restore(history, current, library, device)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to serialize playback snapshot")
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Stored playback snapshot is not valid JSON")
    }

    /// Read the snapshot from `store`, if one was saved.
    pub fn load(store: &dyn SnapshotStore) -> Result<Option<Self>> {
        store.get(SNAPSHOT_KEY)?.as_deref().map(Self::from_json).transpose()
    }

    pub fn save(&self, store: &mut dyn SnapshotStore) -> Result<()> {
        store.set(SNAPSHOT_KEY, &self.to_json()?)
    }
}

/// Opaque key/value persistence.
pub trait SnapshotStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
    fn remove(&mut self, key: &str) -> Result<()>;
}

/// In-memory store, for tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: HashMap<String, String>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.values.remove(key);
        Ok(())
    }
}

/// Store backed by a single key/value table in a SQLite file.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open state database at {}", path.display()))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory state database")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            (),
        )
        .context("Failed to create kv table")?;
        Ok(Self { conn })
    }
}

impl SnapshotStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.conn
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| row.get(0))
            .optional()
            .with_context(|| format!("Failed to read '{key}' from state database"))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO kv (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                (key, value),
            )
            .with_context(|| format!("Failed to write '{key}' to state database"))?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM kv WHERE key = ?1", [key])
            .with_context(|| format!("Failed to delete '{key}' from state database"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Attribute, Catalog};
    use crate::config::PlayerConfig;
    use crate::device::RecordingDevice;
    use crate::player::Action;
    use tempfile::TempDir;

    fn catalog() -> Catalog {
        let mut catalog = Catalog::new();
        for i in 1..=4 {
            catalog.set_attribute(ItemId(i), "local_ogg", Attribute::text(format!("{i}.ogg")));
        }
        catalog
    }

    #[test]
    fn memory_store_get_set_remove() {
        let mut store = MemoryStore::new();
        assert_eq!(store.get("a").expect("get"), None);

        store.set("a", "1").expect("set");
        store.set("a", "2").expect("set");
        assert_eq!(store.get("a").expect("get").as_deref(), Some("2"));

        store.remove("a").expect("remove");
        assert_eq!(store.get("a").expect("get"), None);
    }

    #[test]
    fn sqlite_store_persists_across_connections() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("state.db");

        {
            let mut store = SqliteStore::open(&path).expect("open");
            store.set(SNAPSHOT_KEY, "{}").expect("set");
            store.set(SNAPSHOT_KEY, r#"{"position": 3.0}"#).expect("overwrite");
        }

        let store = SqliteStore::open(&path).expect("reopen");
        let snapshot = Snapshot::load(&store).expect("load").expect("present");
        assert_eq!(snapshot.position, 3.0);
        assert!(snapshot.history.is_empty());
    }

    #[test]
    fn missing_snapshot_loads_as_none() {
        let store = SqliteStore::open_in_memory().expect("open");
        assert!(Snapshot::load(&store).expect("load").is_none());
    }

    #[test]
    fn corrupt_snapshot_is_an_error() {
        let mut store = MemoryStore::new();
        store.set(SNAPSHOT_KEY, "[not a snapshot").expect("set");
        assert!(Snapshot::load(&store).is_err());
    }

    #[test]
    fn capture_and_apply() {
        let catalog = catalog();
        let lib = Library::new(&catalog);
        let mut device = RecordingDevice::new();
        let mut player = Player::new(&PlayerConfig::default());

        player.dispatch(Action::play(ItemId(1)), &lib, &mut device);
        player.dispatch(Action::play(ItemId(2)), &lib, &mut device);
        player.dispatch(Action::Seek(12.0), &lib, &mut device);

        let mut store = MemoryStore::new();
        Snapshot::capture(&player).save(&mut store).expect("save");

        let mut restored = Player::new(&PlayerConfig::default());
        let snapshot = Snapshot::load(&store).expect("load").expect("present");
        snapshot.apply(&mut restored, &lib, &mut RecordingDevice::new());

        assert_eq!(restored.history().iter().collect::<Vec<_>>(), vec![ItemId(1)]);
        assert_eq!(restored.state().current(), Some(ItemId(2)));
        assert_eq!(restored.state().position(), 12.0);
        assert!(restored.state().is_paused());
    }

    #[test]
    fn apply_drops_invalid_ids_and_bounds_history() {
        let catalog = catalog();
        let lib = Library::new(&catalog);
        let config = PlayerConfig {
            history_size: 2,
            ..PlayerConfig::default()
        };
        let mut player = Player::new(&config);

        let snapshot = Snapshot {
            history: vec![1, -4, 2, 99, 3],
            current: Some(-1),
            position: 8.0,
        };
        snapshot.apply(&mut player, &lib, &mut RecordingDevice::new());

        assert_eq!(player.history().iter().collect::<Vec<_>>(), vec![ItemId(2), ItemId(3)]);
        assert_eq!(player.state().current(), None);
    }
}
