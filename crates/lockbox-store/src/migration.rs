//! Versioned schema for the registry database.
//!
//! `MIGRATIONS[n]` takes the schema from version `n` to `n + 1`. Applied
//! versions are recorded in `schema_migrations`.

use rusqlite::{params, Connection};

use crate::error::{Result, StoreError};

/// Schema steps, oldest first.
const MIGRATIONS: &[&str] = &[
    // v1: users, files and per-file reader lists (owner at position 0).
    r#"
    CREATE TABLE users (
        identity TEXT PRIMARY KEY
    );

    CREATE TABLE files (
        filename TEXT PRIMARY KEY,
        owner TEXT NOT NULL REFERENCES users(identity)
    );

    CREATE TABLE file_access (
        filename TEXT NOT NULL REFERENCES files(filename) ON DELETE CASCADE,
        identity TEXT NOT NULL,
        position INTEGER NOT NULL,
        PRIMARY KEY (filename, identity)
    );

    CREATE INDEX idx_file_access_identity ON file_access(identity);
    "#,
];

/// Schema version this build reads and writes.
pub const CURRENT_VERSION: u32 = MIGRATIONS.len() as u32;

/// Bring the schema up to [`CURRENT_VERSION`]. A no-op on an up-to-date
/// database; refuses databases written by a newer build.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
    )?;

    let found = schema_version(conn)?;
    if found > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "registry schema v{found} is newer than this build (v{CURRENT_VERSION})"
        )));
    }
    if found == CURRENT_VERSION {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for (index, sql) in MIGRATIONS.iter().enumerate().skip(found as usize) {
        let version = index as u32 + 1;
        tx.execute_batch(sql)
            .map_err(|e| StoreError::Migration(format!("applying v{version}: {e}")))?;
        tx.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            params![version, unix_millis()],
        )?;
    }
    tx.commit()?;

    tracing::debug!(from = found, to = CURRENT_VERSION, "migrated registry schema");
    Ok(())
}

/// Highest applied version, 0 for a fresh database.
pub fn schema_version(conn: &Connection) -> Result<u32> {
    let version: Option<u32> =
        conn.query_row("SELECT MAX(version) FROM schema_migrations", [], |row| row.get(0))?;
    Ok(version.unwrap_or(0))
}

fn unix_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as i64)
}
