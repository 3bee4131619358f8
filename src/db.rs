//! # Catalog Database
//!
//! Reads a catalog snapshot out of a SQLite library database.
//!
//! ## Schema
//!
//! ```sql
//! CREATE TABLE musics (id INTEGER PRIMARY KEY);
//! CREATE TABLE tags (
//!     music_id INTEGER NOT NULL,
//!     key      TEXT    NOT NULL,
//!     text     TEXT,
//!     integer  INTEGER,
//!     date     TEXT,
//!     vector   BLOB,
//!     PRIMARY KEY (music_id, key)
//! );
//! ```
//!
//! `vector` holds packed little-endian `f32` values. The `date` column is
//! part of the library schema but unused by playback.

use crate::catalog::{Attribute, Catalog, TagRecord};
use crate::embedding::EmbeddingVector;
use anyhow::{Context, Result};
use log::{debug, info};
use rusqlite::Connection;
use std::path::Path;

/// File extensions treated as SQLite catalogs; anything else is read as JSON.
pub const SQLITE_EXTENSIONS: [&str; 3] = ["db", "sqlite", "sqlite3"];

/// Create the catalog tables if missing.
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS musics (id INTEGER PRIMARY KEY);
         CREATE TABLE IF NOT EXISTS tags (
             music_id INTEGER NOT NULL,
             key      TEXT    NOT NULL,
             text     TEXT,
             integer  INTEGER,
             date     TEXT,
             vector   BLOB,
             PRIMARY KEY (music_id, key)
         );",
    )
    .context("Failed to create catalog tables")
}

/// Read every item and tag from an open connection.
pub fn read_catalog(conn: &Connection) -> Result<Catalog> {
    let mut stmt = conn
        .prepare("SELECT id FROM musics ORDER BY id")
        .context("Invalid SQL statement when SELECTing musics")?;
    let musics = stmt
        .query_map([], |row| row.get::<_, i64>(0))
        .context("Cannot query musics")?
        .collect::<rusqlite::Result<Vec<i64>>>()
        .context("Failed to read music row")?;

    let mut stmt = conn
        .prepare("SELECT music_id, key, text, integer, vector FROM tags")
        .context("Invalid SQL statement when SELECTing tags")?;
    let tags = stmt
        .query_map([], |row| {
            Ok(TagRecord {
                music_id: row.get(0)?,
                key: row.get(1)?,
                value: Attribute {
                    text: row.get(2)?,
                    integer: row.get(3)?,
                    vector: row
                        .get::<_, Option<Vec<u8>>>(4)?
                        .map(|blob| EmbeddingVector::from_le_bytes(&blob)),
                },
            })
        })
        .context("Cannot query tags")?
        .collect::<rusqlite::Result<Vec<TagRecord>>>()
        .context("Failed to read tag row")?;

    debug!("Read {} musics and {} tags", musics.len(), tags.len());
    Ok(Catalog::from_records(&musics, tags))
}

/// Write a catalog into an open connection, replacing rows with the same keys.
pub fn write_catalog(conn: &mut Connection, catalog: &Catalog) -> Result<()> {
    init_schema(conn)?;
    let tx = conn.transaction()?;

    {
        let mut music_stmt = tx.prepare("INSERT OR IGNORE INTO musics (id) VALUES (?1)")?;
        let mut tag_stmt = tx.prepare(
            "INSERT OR REPLACE INTO tags (music_id, key, text, integer, vector)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;

        for &id in catalog.items() {
            music_stmt
                .execute([i64::from(id.0)])
                .with_context(|| format!("Failed to INSERT music {id}"))?;

            for (key, value) in catalog.attributes(id) {
                let blob = value.vector.as_ref().map(EmbeddingVector::to_le_bytes);
                tag_stmt
                    .execute((i64::from(id.0), key, &value.text, value.integer, blob))
                    .with_context(|| format!("Failed to INSERT tag '{key}' for {id}"))?;
            }
        }
    }

    tx.commit().context("Committing catalog transaction failed")?;
    Ok(())
}

/// Open a SQLite catalog file.
pub fn load_catalog(path: &Path) -> Result<Catalog> {
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open catalog database at {}", path.display()))?;
    read_catalog(&conn).with_context(|| format!("Invalid catalog database {}", path.display()))
}

/// Load a catalog from disk, choosing SQLite or JSON by file extension.
pub fn open_catalog(path: &Path, storage_root: &str) -> Result<Catalog> {
    let is_sqlite = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SQLITE_EXTENSIONS.contains(&ext));

    let catalog = if is_sqlite {
        load_catalog(path)?
    } else {
        Catalog::load_json(path)?
    };
    info!("Loaded {} items from {}", catalog.len(), path.display());

    Ok(catalog.with_storage_root(storage_root))
}
