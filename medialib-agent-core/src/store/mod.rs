//! The embedded transactional store backing the Reuse Cache, Outbox, and Cursor
//! Store. All three live in one SQLite file (`~/.medialib/agent_cache.db`) because
//! the agent owns a single piece of persisted state and they share a writer lock.

mod cache;
mod cursor;
mod outbox;
mod schema;

pub use cache::CacheEntry;
pub use cursor::CursorRow;
pub use outbox::OutboxItem;

use std::path::{Path, PathBuf};

use rusqlite::Connection;
use tokio::sync::Mutex;

use crate::error::CacheStoreError;

/// Single writer, serialized through an internal async mutex, as required by the
/// "one writer, all writers serialize through a single internal queue" rule.
pub struct Store {
    path: PathBuf,
    conn: Mutex<Connection>,
}

impl Store {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, CacheStoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| CacheStoreError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let conn = Connection::open(&path)?;
        schema::migrate(&conn)?;
        Ok(Self {
            path,
            conn: Mutex::new(conn),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Deletes the underlying store file. Caller must drop or reopen the `Store`
    /// afterwards; the in-memory connection is closed first to release the lock.
    pub async fn clear(&self) -> Result<(), CacheStoreError> {
        let mut guard = self.conn.lock().await;
        *guard = Connection::open_in_memory()?;
        if self.path.exists() {
            std::fs::remove_file(&self.path).map_err(|source| CacheStoreError::RemoveFile {
                path: self.path.clone(),
                source,
            })?;
        }
        let fresh = Connection::open(&self.path)?;
        schema::migrate(&fresh)?;
        *guard = fresh;
        Ok(())
    }

    pub async fn compact(&self) -> Result<(), CacheStoreError> {
        let guard = self.conn.lock().await;
        guard.execute_batch("VACUUM;")?;
        Ok(())
    }

    pub async fn size_bytes(&self) -> u64 {
        std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
    }
}
