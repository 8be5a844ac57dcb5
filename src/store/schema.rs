use anyhow::Result;
use rusqlite::Connection;

pub const SCHEMA_VERSION: &str = "1";

pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch("
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;

        CREATE TABLE IF NOT EXISTS meta (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        -- One row per (file content, model). Keyed by content hash so renames
        -- and copies of the same image share an entry.
        CREATE TABLE IF NOT EXISTS embeddings (
            content_hash TEXT NOT NULL,
            model        TEXT NOT NULL,
            dims         INTEGER NOT NULL,
            vector       BLOB NOT NULL,   -- little-endian f32 x dims
            created_at   TEXT NOT NULL,
            PRIMARY KEY (content_hash, model)
        );
        CREATE INDEX IF NOT EXISTS idx_embeddings_model ON embeddings(model);
    ")?;

    conn.execute(
        "INSERT OR IGNORE INTO meta (key, value) VALUES ('schema_version', ?1)",
        [SCHEMA_VERSION],
    )?;

    Ok(())
}
