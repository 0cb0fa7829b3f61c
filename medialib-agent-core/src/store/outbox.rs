use rusqlite::{params, OptionalExtension};

use crate::error::CacheStoreError;
use crate::timeutil::now_secs;

use super::Store;

#[derive(Debug, Clone, PartialEq)]
pub struct OutboxItem {
    pub id: i64,
    pub batch_id: String,
    pub payload_json: Vec<u8>,
    pub created_at: f64,
}

impl Store {
    pub async fn outbox_enqueue(
        &self,
        batch_id: &str,
        payload_json: &[u8],
    ) -> Result<i64, CacheStoreError> {
        let guard = self.conn.lock().await;
        guard.execute(
            "INSERT INTO outbox (batch_id, payload_json, created_at) VALUES (?1, ?2, ?3)",
            params![batch_id, payload_json, now_secs()],
        )?;
        Ok(guard.last_insert_rowid())
    }

    /// Oldest item by `id`, preserving strict FIFO drain order.
    pub async fn outbox_peek_oldest(&self) -> Result<Option<OutboxItem>, CacheStoreError> {
        let guard = self.conn.lock().await;
        let item = guard
            .query_row(
                "SELECT id, batch_id, payload_json, created_at FROM outbox ORDER BY id ASC LIMIT 1",
                [],
                |row| {
                    Ok(OutboxItem {
                        id: row.get(0)?,
                        batch_id: row.get(1)?,
                        payload_json: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(item)
    }

    pub async fn outbox_delete(&self, id: i64) -> Result<(), CacheStoreError> {
        let guard = self.conn.lock().await;
        guard.execute("DELETE FROM outbox WHERE id = ?1", params![id])?;
        Ok(())
    }

    pub async fn outbox_size(&self) -> Result<u64, CacheStoreError> {
        let guard = self.conn.lock().await;
        let count: i64 = guard.query_row("SELECT COUNT(*) FROM outbox", [], |r| r.get(0))?;
        Ok(count as u64)
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
    async fn enqueue_then_peek_returns_oldest_first() {
        let (_dir, store) = fresh_store().await;
        store.outbox_enqueue("batch-1", b"{}").await.unwrap();
        store.outbox_enqueue("batch-2", b"{}").await.unwrap();

        let oldest = store.outbox_peek_oldest().await.unwrap().unwrap();
        assert_eq!(oldest.batch_id, "batch-1");
        assert_eq!(store.outbox_size().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn delete_removes_item_and_advances_fifo() {
        let (_dir, store) = fresh_store().await;
        let id1 = store.outbox_enqueue("batch-1", b"{}").await.unwrap();
        store.outbox_enqueue("batch-2", b"{}").await.unwrap();

        store.outbox_delete(id1).await.unwrap();
        let next = store.outbox_peek_oldest().await.unwrap().unwrap();
        assert_eq!(next.batch_id, "batch-2");
        assert_eq!(store.outbox_size().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn peek_on_empty_outbox_returns_none() {
        let (_dir, store) = fresh_store().await;
        assert!(store.outbox_peek_oldest().await.unwrap().is_none());
    }
}
