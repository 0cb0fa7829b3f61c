use rusqlite::{params, OptionalExtension};

use crate::error::CacheStoreError;
use crate::timeutil::now_secs;

use super::Store;

#[derive(Debug, Clone, PartialEq)]
pub struct CursorRow {
    pub root: String,
    pub phase: String,
    pub last_path: Option<String>,
    pub updated_at: f64,
}

impl Store {
    pub async fn cursor_get(
        &self,
        root: &str,
        phase: &str,
    ) -> Result<Option<String>, CacheStoreError> {
        let guard = self.conn.lock().await;
        let last_path: Option<Option<String>> = guard
            .query_row(
                "SELECT last_path FROM scan_progress WHERE root = ?1 AND phase = ?2",
                params![root, phase],
                |row| row.get(0),
            )
            .optional()?;
        Ok(last_path.flatten())
    }

    pub async fn cursor_set(
        &self,
        root: &str,
        phase: &str,
        last_path: &str,
    ) -> Result<(), CacheStoreError> {
        let guard = self.conn.lock().await;
        guard.execute(
            "INSERT INTO scan_progress (root, phase, last_path, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(root, phase) DO UPDATE SET
                last_path = excluded.last_path,
                updated_at = excluded.updated_at",
            params![root, phase, last_path, now_secs()],
        )?;
        Ok(())
    }

    pub async fn cursor_clear(&self, root: &str, phase: &str) -> Result<(), CacheStoreError> {
        let guard = self.conn.lock().await;
        guard.execute(
            "INSERT INTO scan_progress (root, phase, last_path, updated_at)
             VALUES (?1, ?2, NULL, ?3)
             ON CONFLICT(root, phase) DO UPDATE SET
                last_path = NULL,
                updated_at = excluded.updated_at",
            params![root, phase, now_secs()],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::store::Store;

    async fn fresh_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("cache.db")).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn get_on_unknown_root_phase_returns_none() {
        let (_dir, store) = fresh_store().await;
        assert!(store.cursor_get("/r", "hash").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn set_then_get_roundtrips_and_overwrites() {
        let (_dir, store) = fresh_store().await;
        store.cursor_set("/r", "hash", "/r/a.mkv").await.unwrap();
        assert_eq!(
            store.cursor_get("/r", "hash").await.unwrap(),
            Some("/r/a.mkv".to_string())
        );

        store.cursor_set("/r", "hash", "/r/b.txt").await.unwrap();
        assert_eq!(
            store.cursor_get("/r", "hash").await.unwrap(),
            Some("/r/b.txt".to_string())
        );
    }

    #[tokio::test]
    async fn hash_and_probe_phases_are_independent() {
        let (_dir, store) = fresh_store().await;
        store.cursor_set("/r", "hash", "/r/a.mkv").await.unwrap();
        assert!(store.cursor_get("/r", "probe").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn clear_resets_cursor_to_none() {
        let (_dir, store) = fresh_store().await;
        store.cursor_set("/r", "hash", "/r/a.mkv").await.unwrap();
        store.cursor_clear("/r", "hash").await.unwrap();
        assert!(store.cursor_get("/r", "hash").await.unwrap().is_none());
    }
}
