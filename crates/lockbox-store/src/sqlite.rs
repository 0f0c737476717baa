//! SQLite implementation of [`RegistryStore`].
//!
//! Uses rusqlite with bundled SQLite, wrapped in async via
//! `tokio::task::spawn_blocking`.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection};

use lockbox_core::{FileRecord, Filename, Identity, RegistrySnapshot};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::RegistryStore;

/// SQLite-backed registry persistence.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
#[derive(Clone)]
pub struct SqliteRegistryStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRegistryStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::Task(format!("connection mutex poisoned: {}", e)))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Task(format!("spawn_blocking failed: {}", e)))?
    }
}

fn parse_identity(value: String) -> Result<Identity> {
    Identity::new(value).map_err(|e| StoreError::InvalidData(e.to_string()))
}

fn load(conn: &Connection) -> Result<RegistrySnapshot> {
    let users = conn
        .prepare("SELECT identity FROM users ORDER BY identity")?
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?
        .into_iter()
        .map(parse_identity)
        .collect::<Result<Vec<_>>>()?;

    let mut files: BTreeMap<String, FileRecord> = BTreeMap::new();
    let owners = conn
        .prepare("SELECT filename, owner FROM files ORDER BY filename")?
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    for (filename, owner) in owners {
        let record = FileRecord {
            filename: Filename::new(filename.clone()),
            owner: parse_identity(owner)?,
            access: Vec::new(),
        };
        files.insert(filename, record);
    }

    let access = conn
        .prepare("SELECT filename, identity FROM file_access ORDER BY filename, position")?
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    for (filename, identity) in access {
        let record = files.get_mut(&filename).ok_or_else(|| {
            StoreError::InvalidData(format!("access entry for unknown file {filename}"))
        })?;
        record.access.push(parse_identity(identity)?);
    }

    Ok(RegistrySnapshot {
        users,
        files: files.into_values().collect(),
    })
}

fn save(conn: &mut Connection, snapshot: &RegistrySnapshot) -> Result<()> {
    let tx = conn.transaction()?;

    tx.execute_batch("DELETE FROM file_access; DELETE FROM files; DELETE FROM users;")?;

    {
        let mut insert_user = tx.prepare("INSERT INTO users (identity) VALUES (?1)")?;
        for user in &snapshot.users {
            insert_user.execute(params![user.as_str()])?;
        }

        let mut insert_file = tx.prepare("INSERT INTO files (filename, owner) VALUES (?1, ?2)")?;
        let mut insert_access = tx.prepare(
            "INSERT INTO file_access (filename, identity, position) VALUES (?1, ?2, ?3)",
        )?;
        for record in &snapshot.files {
            insert_file.execute(params![record.filename.as_str(), record.owner.as_str()])?;
            for (position, reader) in record.access.iter().enumerate() {
                insert_access.execute(params![
                    record.filename.as_str(),
                    reader.as_str(),
                    position as i64
                ])?;
            }
        }
    }

    tx.commit()?;
    Ok(())
}

#[async_trait]
impl RegistryStore for SqliteRegistryStore {
    async fn load_registry(&self) -> Result<RegistrySnapshot> {
        self.blocking(|conn| load(conn)).await
    }

    async fn save_registry(&self, snapshot: &RegistrySnapshot) -> Result<()> {
        let snapshot = snapshot.clone();
        self.blocking(move |conn| save(conn, &snapshot)).await?;
        tracing::debug!("saved registry to sqlite");
        Ok(())
    }
}
