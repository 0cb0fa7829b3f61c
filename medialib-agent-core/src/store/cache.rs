use rusqlite::{params, OptionalExtension};

use crate::error::CacheStoreError;
use crate::model::HashAlgo;
use crate::stat::FileStat;
use crate::timeutil::now_secs;

use super::Store;

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub inode_key: String,
    pub size: u64,
    pub mtime: f64,
    pub ctime: f64,
    pub probed: bool,
    pub hashed: bool,
    pub hash_algo: Option<HashAlgo>,
    pub hash_sample_size: Option<u64>,
    pub sample_hash: Option<String>,
    pub full_hash: Option<String>,
    pub last_seen: f64,
    pub last_hashed_at: Option<f64>,
}

fn algo_to_str(algo: HashAlgo) -> &'static str {
    match algo {
        HashAlgo::Blake3 => "blake3",
        HashAlgo::Xxhash64 => "xxhash64",
        HashAlgo::Sha256 => "sha256",
    }
}

fn algo_from_str(s: &str) -> Option<HashAlgo> {
    match s {
        "blake3" => Some(HashAlgo::Blake3),
        "xxhash64" => Some(HashAlgo::Xxhash64),
        "sha256" => Some(HashAlgo::Sha256),
        _ => None,
    }
}

impl Store {
    pub async fn cache_lookup(&self, path: &str) -> Result<Option<CacheEntry>, CacheStoreError> {
        let guard = self.conn.lock().await;
        let entry = guard
            .query_row(
                "SELECT inode_key, size, mtime, ctime, probed, hashed, hash_algo,
                        hash_sample_size, sample_hash, full_hash, last_seen, last_hashed_at
                 FROM agent_index WHERE path = ?1",
                params![path],
                |row| {
                    Ok(CacheEntry {
                        inode_key: row.get(0)?,
                        size: row.get::<_, i64>(1)? as u64,
                        mtime: row.get(2)?,
                        ctime: row.get(3)?,
                        probed: row.get::<_, i64>(4)? != 0,
                        hashed: row.get::<_, i64>(5)? != 0,
                        hash_algo: row
                            .get::<_, Option<String>>(6)?
                            .and_then(|s| algo_from_str(&s)),
                        hash_sample_size: row.get::<_, Option<i64>>(7)?.map(|v| v as u64),
                        sample_hash: row.get(8)?,
                        full_hash: row.get(9)?,
                        last_seen: row.get(10)?,
                        last_hashed_at: row.get(11)?,
                    })
                },
            )
            .optional()?;
        Ok(entry)
    }

    /// Records a successful hash for `path`, creating the row if absent.
    pub async fn mark_hashed(
        &self,
        path: &str,
        stat: &FileStat,
        algo: HashAlgo,
        sample_size: u64,
        sample_hash: &str,
        full_hash: Option<&str>,
    ) -> Result<(), CacheStoreError> {
        let guard = self.conn.lock().await;
        let now = now_secs();
        guard.execute(
            "INSERT INTO agent_index
                (path, inode_key, size, mtime, ctime, probed, hashed,
                 hash_algo, hash_sample_size, sample_hash, full_hash, last_seen, last_hashed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, 1, ?6, ?7, ?8, ?9, ?10, ?10)
             ON CONFLICT(path) DO UPDATE SET
                inode_key = excluded.inode_key,
                size = excluded.size,
                mtime = excluded.mtime,
                ctime = excluded.ctime,
                hashed = 1,
                probed = CASE WHEN agent_index.inode_key = excluded.inode_key
                              THEN agent_index.probed ELSE 0 END,
                hash_algo = excluded.hash_algo,
                hash_sample_size = excluded.hash_sample_size,
                sample_hash = excluded.sample_hash,
                full_hash = excluded.full_hash,
                last_seen = excluded.last_seen,
                last_hashed_at = excluded.last_hashed_at",
            params![
                path,
                stat.inode_key,
                stat.size as i64,
                stat.mtime,
                stat.ctime,
                algo_to_str(algo),
                sample_size as i64,
                sample_hash,
                full_hash,
                now,
            ],
        )?;
        Ok(())
    }

    /// Records a successful probe for `path`, creating the row if absent.
    pub async fn mark_probed(&self, path: &str, stat: &FileStat) -> Result<(), CacheStoreError> {
        let guard = self.conn.lock().await;
        let now = now_secs();
        guard.execute(
            "INSERT INTO agent_index (path, inode_key, size, mtime, ctime, probed, hashed, last_seen)
             VALUES (?1, ?2, ?3, ?4, ?5, 1, 0, ?6)
             ON CONFLICT(path) DO UPDATE SET
                inode_key = excluded.inode_key,
                size = excluded.size,
                mtime = excluded.mtime,
                ctime = excluded.ctime,
                probed = 1,
                hashed = CASE WHEN agent_index.inode_key = excluded.inode_key
                              THEN agent_index.hashed ELSE 0 END,
                last_seen = excluded.last_seen",
            params![path, stat.inode_key, stat.size as i64, stat.mtime, stat.ctime, now],
        )?;
        Ok(())
    }

    /// Updates `last_seen` without touching probe/hash state.
    pub async fn touch(&self, path: &str, stat: &FileStat) -> Result<(), CacheStoreError> {
        let guard = self.conn.lock().await;
        let now = now_secs();
        guard.execute(
            "INSERT INTO agent_index (path, inode_key, size, mtime, ctime, probed, hashed, last_seen)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, 0, ?6)
             ON CONFLICT(path) DO UPDATE SET
                inode_key = excluded.inode_key,
                size = excluded.size,
                mtime = excluded.mtime,
                ctime = excluded.ctime,
                last_seen = excluded.last_seen",
            params![path, stat.inode_key, stat.size as i64, stat.mtime, stat.ctime, now],
        )?;
        Ok(())
    }

    pub async fn cache_row_count(&self) -> Result<u64, CacheStoreError> {
        let guard = self.conn.lock().await;
        let count: i64 = guard.query_row("SELECT COUNT(*) FROM agent_index", [], |r| r.get(0))?;
        Ok(count as u64)
    }
}

impl CacheEntry {
    /// Skip-hash policy: `hashed` AND inode match AND `(algo, sample_size)` match
    /// the currently configured parameters.
    pub fn skip_hash(&self, current: &FileStat, algo: HashAlgo, sample_size: u64) -> bool {
        self.hashed
            && self.inode_key == current.inode_key
            && self.hash_algo == Some(algo)
            && self.hash_sample_size == Some(sample_size)
    }

    /// Skip-probe policy: `probed` AND inode match.
    pub fn skip_probe(&self, current: &FileStat) -> bool {
        self.probed && self.inode_key == current.inode_key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    async fn fresh_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("cache.db")).await.unwrap();
        (dir, store)
    }

    fn stat(inode: &str) -> FileStat {
        FileStat {
            size: 10,
            mtime: 1.0,
            ctime: 1.0,
            inode_key: inode.to_string(),
        }
    }

    #[tokio::test]
    async fn lookup_on_unknown_path_returns_none() {
        let (_dir, store) = fresh_store().await;
        assert!(store.cache_lookup("/r/a.mkv").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn mark_hashed_then_lookup_reflects_state() {
        let (_dir, store) = fresh_store().await;
        let s = stat("1:100");
        store
            .mark_hashed("/r/a.mkv", &s, HashAlgo::Blake3, 65536, "deadbeef", None)
            .await
            .unwrap();
        let entry = store.cache_lookup("/r/a.mkv").await.unwrap().unwrap();
        assert!(entry.hashed);
        assert!(!entry.probed);
        assert_eq!(entry.hash_algo, Some(HashAlgo::Blake3));
        assert!(entry.skip_hash(&s, HashAlgo::Blake3, 65536));
    }

    #[tokio::test]
    async fn inode_mismatch_invalidates_skip_hash() {
        let (_dir, store) = fresh_store().await;
        let original = stat("1:100");
        store
            .mark_hashed("/r/a.mkv", &original, HashAlgo::Blake3, 65536, "deadbeef", None)
            .await
            .unwrap();
        let entry = store.cache_lookup("/r/a.mkv").await.unwrap().unwrap();

        let replaced = stat("1:200");
        assert!(!entry.skip_hash(&replaced, HashAlgo::Blake3, 65536));
    }

    #[tokio::test]
    async fn algo_change_invalidates_skip_hash() {
        let (_dir, store) = fresh_store().await;
        let s = stat("1:100");
        store
            .mark_hashed("/r/a.mkv", &s, HashAlgo::Blake3, 65536, "deadbeef", None)
            .await
            .unwrap();
        let entry = store.cache_lookup("/r/a.mkv").await.unwrap().unwrap();
        assert!(!entry.skip_hash(&s, HashAlgo::Sha256, 65536));
    }

    #[tokio::test]
    async fn mark_probed_then_mark_hashed_preserves_both_flags() {
        let (_dir, store) = fresh_store().await;
        let s = stat("1:100");
        store.mark_probed("/r/a.mkv", &s).await.unwrap();
        store
            .mark_hashed("/r/a.mkv", &s, HashAlgo::Blake3, 65536, "abc", None)
            .await
            .unwrap();
        let entry = store.cache_lookup("/r/a.mkv").await.unwrap().unwrap();
        assert!(entry.probed);
        assert!(entry.hashed);
    }

    #[tokio::test]
    async fn mark_hashed_with_changed_inode_clears_stale_probed_flag() {
        let (_dir, store) = fresh_store().await;
        let original = stat("1:100");
        store.mark_probed("/r/a.mkv", &original).await.unwrap();

        let replaced = stat("1:200");
        store
            .mark_hashed("/r/a.mkv", &replaced, HashAlgo::Blake3, 65536, "abc", None)
            .await
            .unwrap();

        let entry = store.cache_lookup("/r/a.mkv").await.unwrap().unwrap();
        assert!(entry.hashed);
        assert!(
            !entry.probed,
            "a replaced file's stale probed flag must not survive under the new inode"
        );
        assert!(!entry.skip_probe(&replaced));
    }

    #[tokio::test]
    async fn mark_probed_with_changed_inode_clears_stale_hashed_flag() {
        let (_dir, store) = fresh_store().await;
        let original = stat("1:100");
        store
            .mark_hashed("/r/a.mkv", &original, HashAlgo::Blake3, 65536, "abc", None)
            .await
            .unwrap();

        let replaced = stat("1:200");
        store.mark_probed("/r/a.mkv", &replaced).await.unwrap();

        let entry = store.cache_lookup("/r/a.mkv").await.unwrap().unwrap();
        assert!(entry.probed);
        assert!(
            !entry.hashed,
            "a replaced file's stale hashed flag must not survive under the new inode"
        );
        assert!(!entry.skip_hash(&replaced, HashAlgo::Blake3, 65536));
    }
}
