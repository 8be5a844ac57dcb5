use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::path::Path;
use tracing::warn;

use super::schema;
use crate::embed::Embedding;

const DB_FILE: &str = "cache.db";
const WAL_FILE: &str = "cache.db-wal";

pub struct Store {
    conn: Connection,
}

#[derive(Debug, Default, Serialize)]
pub struct CacheStats {
    pub entries: i64,
    pub db_size_bytes: u64,
    pub models: Vec<(String, i64)>,
}

impl CacheStats {
    pub fn empty() -> Self {
        Self::default()
    }
}

impl Store {
    pub fn open(storage_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(storage_dir)
            .with_context(|| format!("creating storage dir {}", storage_dir.display()))?;
        let db_path = storage_dir.join(DB_FILE);
        let conn = Connection::open(&db_path)
            .with_context(|| format!("opening database at {}", db_path.display()))?;
        schema::run_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// Open only if a cache database already exists; never creates one.
    pub fn open_if_exists(storage_dir: &Path) -> Result<Option<Self>> {
        if storage_dir.join(DB_FILE).exists() {
            Self::open(storage_dir).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Cached vector for this content and model. A row whose blob does not
    /// match its recorded width is treated as a miss.
    pub fn get_embedding(&self, content_hash: &str, model: &str) -> Result<Option<Embedding>> {
        let row: Option<(i64, Vec<u8>)> = self
            .conn
            .query_row(
                "SELECT dims, vector FROM embeddings WHERE content_hash = ?1 AND model = ?2",
                params![content_hash, model],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((dims, blob)) = row else {
            return Ok(None);
        };
        match decode_vector(&blob, dims) {
            Some(v) => Ok(Some(v)),
            None => {
                warn!(content_hash, model, dims, bytes = blob.len(), "ignoring malformed cache row");
                Ok(None)
            }
        }
    }

    pub fn put_embedding(&self, content_hash: &str, model: &str, vector: &[f32]) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO embeddings (content_hash, model, dims, vector, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(content_hash, model) DO UPDATE SET
                dims = excluded.dims,
                vector = excluded.vector,
                created_at = excluded.created_at",
            params![content_hash, model, vector.len() as i64, encode_vector(vector), now],
        )?;
        Ok(())
    }

    /// Drop cached vectors, for one model or all of them. Returns rows removed.
    pub fn clear(&self, model: Option<&str>) -> Result<usize> {
        let removed = match model {
            Some(m) => self
                .conn
                .execute("DELETE FROM embeddings WHERE model = ?1", params![m])?,
            None => self.conn.execute("DELETE FROM embeddings", [])?,
        };
        Ok(removed)
    }

    pub fn stats(&self, storage_dir: &Path) -> Result<CacheStats> {
        let entries: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM embeddings", [], |r| r.get(0))?;

        // Recent writes may still sit in the write-ahead log.
        let db_size_bytes = [DB_FILE, WAL_FILE]
            .iter()
            .filter_map(|f| std::fs::metadata(storage_dir.join(f)).ok())
            .map(|m| m.len())
            .sum();

        let mut stmt = self.conn.prepare(
            "SELECT model, COUNT(*) FROM embeddings GROUP BY model ORDER BY COUNT(*) DESC, model",
        )?;
        let models: Vec<(String, i64)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .filter_map(|r| r.ok())
            .collect();

        Ok(CacheStats {
            entries,
            db_size_bytes,
            models,
        })
    }
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_vector(blob: &[u8], dims: i64) -> Option<Embedding> {
    if dims < 0 || blob.len() != dims as usize * 4 {
        return None;
    }
    Some(
        blob.chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_then_hit() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::open(tmp.path()).unwrap();
        assert!(store.get_embedding("abc", "resnet50").unwrap().is_none());

        store.put_embedding("abc", "resnet50", &[0.5, -1.25, 3.0]).unwrap();
        assert_eq!(
            store.get_embedding("abc", "resnet50").unwrap(),
            Some(vec![0.5, -1.25, 3.0])
        );
        // Same content under another model is a separate entry.
        assert!(store.get_embedding("abc", "clip-vit-base-patch32").unwrap().is_none());
    }

    #[test]
    fn put_overwrites() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::open(tmp.path()).unwrap();
        store.put_embedding("h", "m", &[1.0]).unwrap();
        store.put_embedding("h", "m", &[2.0, 3.0]).unwrap();
        assert_eq!(store.get_embedding("h", "m").unwrap(), Some(vec![2.0, 3.0]));
        assert_eq!(store.stats(tmp.path()).unwrap().entries, 1);
    }

    #[test]
    fn malformed_blob_is_a_miss() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::open(tmp.path()).unwrap();
        store
            .conn
            .execute(
                "INSERT INTO embeddings (content_hash, model, dims, vector, created_at)
                 VALUES ('h', 'm', 4, x'0000', 'now')",
                [],
            )
            .unwrap();
        assert!(store.get_embedding("h", "m").unwrap().is_none());
    }

    #[test]
    fn stats_and_clear() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::open(tmp.path()).unwrap();
        store.put_embedding("a", "resnet50", &[1.0]).unwrap();
        store.put_embedding("b", "resnet50", &[1.0]).unwrap();
        store.put_embedding("a", "clip", &[1.0]).unwrap();

        let stats = store.stats(tmp.path()).unwrap();
        assert_eq!(stats.entries, 3);
        assert!(stats.db_size_bytes > 0);
        assert_eq!(
            stats.models,
            vec![("resnet50".to_string(), 2), ("clip".to_string(), 1)]
        );

        assert_eq!(store.clear(Some("resnet50")).unwrap(), 2);
        assert_eq!(store.clear(None).unwrap(), 1);
        assert_eq!(store.stats(tmp.path()).unwrap().entries, 0);
    }

    #[test]
    fn open_if_exists_does_not_create() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("cache");
        assert!(Store::open_if_exists(&dir).unwrap().is_none());
        assert!(!dir.exists());

        Store::open(&dir).unwrap();
        assert!(Store::open_if_exists(&dir).unwrap().is_some());
    }
}
