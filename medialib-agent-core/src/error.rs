use std::path::PathBuf;

/// Per-file hashing failure. Recovered by the caller: the file still emits a base
/// record without the failed enrichment.
#[derive(thiserror::Error, Debug)]
pub enum HashError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Per-file probe failure: timeout, non-zero exit, or unparsable output.
#[derive(thiserror::Error, Debug)]
pub enum ProbeError {
    #[error("failed to spawn probe subprocess: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("probe subprocess timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("probe subprocess exited with status {0}")]
    NonZeroExit(std::process::ExitStatus),
    #[error("probe output was not valid UTF-8: {0}")]
    InvalidUtf8(#[source] std::string::FromUtf8Error),
    #[error("probe output was not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),
}

/// Errors from the embedded reuse-cache/outbox/cursor store. Retried once by the
/// caller; if persistent, the agent degrades to no-cache mode.
#[derive(thiserror::Error, Debug)]
pub enum CacheStoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to create state directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to remove cache file {path}: {source}")]
    RemoveFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Filesystem traversal failures for a single entry; the scanner logs and skips,
/// traversal continues.
#[derive(thiserror::Error, Debug)]
pub enum FilesystemError {
    #[error("failed to read directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to stat {path}: {source}")]
    Stat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure to fetch `/ingest/config` from the host. Non-fatal: the agent proceeds
/// with the last-known config, or built-in defaults.
#[derive(thiserror::Error, Debug)]
pub enum ConfigFetchError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("response from {url} was not valid JSON: {source}")]
    InvalidJson {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}
