use rusqlite::Connection;

use crate::error::CacheStoreError;

pub(super) fn migrate(conn: &Connection) -> Result<(), CacheStoreError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS agent_index (
            path             TEXT PRIMARY KEY,
            inode_key        TEXT NOT NULL,
            size             INTEGER NOT NULL,
            mtime            REAL NOT NULL,
            ctime            REAL NOT NULL,
            probed           INTEGER NOT NULL DEFAULT 0,
            hashed           INTEGER NOT NULL DEFAULT 0,
            hash_algo        TEXT,
            hash_sample_size INTEGER,
            sample_hash      TEXT,
            full_hash        TEXT,
            last_seen        REAL NOT NULL,
            last_hashed_at   REAL
        );

        CREATE TABLE IF NOT EXISTS outbox (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            batch_id     TEXT NOT NULL,
            payload_json BLOB NOT NULL,
            created_at   REAL NOT NULL
        );

        CREATE TABLE IF NOT EXISTS scan_progress (
            root       TEXT NOT NULL,
            phase      TEXT NOT NULL,
            last_path  TEXT,
            updated_at REAL NOT NULL,
            PRIMARY KEY (root, phase)
        );
        ",
    )?;
    Ok(())
}
