//! Runs Pass 1 (hash) then Pass 2 (probe) per scan cycle, interleaves outbox
//! drains, and respects the off-peak window for full-file hashing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::time::MissedTickBehavior;

use crate::classifier::{self, ClassifyResult};
use crate::config::AgentConfig;
use crate::hasher::{self, HashParams};
use crate::model::{FileRecord, Hashes, Kind};
use crate::permits::{self, OffPeakWindow, PermitPool};
use crate::prober::{self, ProbeOptions};
use crate::scanner;
use crate::stat;
use crate::stats::{AgentState, Phase};
use crate::store::Store;
use crate::uploader::{BatchUploader, FlushOutcome};

pub struct Orchestrator {
    store: Arc<Store>,
    state: Arc<AgentState>,
    permits: Arc<PermitPool>,
    uploader: Arc<BatchUploader>,
    config: Arc<Mutex<AgentConfig>>,
    probe_options: ProbeOptions,
    scanning: AtomicBool,
    shutdown: watch::Sender<bool>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<Store>,
        state: Arc<AgentState>,
        permits: Arc<PermitPool>,
        uploader: Arc<BatchUploader>,
        config: Arc<Mutex<AgentConfig>>,
    ) -> Arc<Self> {
        let (shutdown, _) = watch::channel(false);
        Arc::new(Self {
            store,
            state,
            permits,
            uploader,
            config,
            probe_options: ProbeOptions::default(),
            scanning: AtomicBool::new(false),
            shutdown,
        })
    }

    /// Overrides the subprocess timeout used for Pass 2 metadata extraction.
    /// Must be called before the returned `Arc` is cloned elsewhere.
    pub fn with_probe_timeout(mut self: Arc<Self>, timeout: Duration) -> Arc<Self> {
        if let Some(inner) = Arc::get_mut(&mut self) {
            inner.probe_options.timeout = timeout;
        }
        self
    }

    pub fn request_shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    fn shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// `scan_now`: if idle, starts a cycle in the background; if already scanning,
    /// no-ops and returns the current phase.
    pub fn scan_now(self: &Arc<Self>) -> Phase {
        if self
            .scanning
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.state.set_phase(Phase::Pass1Hash);
            let this = Arc::clone(self);
            tokio::spawn(async move {
                this.run_cycle().await;
                this.scanning.store(false, Ordering::SeqCst);
            });
        }
        self.state.phase()
    }

    /// Startup sequence: drain the outbox once, then begin Pass 1 from each root's
    /// cursor. Runs the background outbox-drain loop and periodic rebalance loop
    /// for the lifetime of the process, returning when shutdown is requested.
    pub async fn run(self: Arc<Self>) {
        self.drain_outbox_once().await;
        self.scan_now();

        let mut shutdown_rx = self.shutdown.subscribe();
        let drain_task = {
            let this = Arc::clone(&self);
            tokio::spawn(async move { this.drain_loop().await })
        };
        let rebalance_task = {
            let this = Arc::clone(&self);
            tokio::spawn(async move { this.rebalance_loop().await })
        };

        let _ = shutdown_rx.changed().await;
        drain_task.abort();
        rebalance_task.abort();
    }

    async fn run_cycle(self: &Arc<Self>) {
        self.state.set_phase(Phase::Pass1Hash);
        self.run_pass1().await;
        self.uploader.flush().await;

        self.state.set_phase(Phase::Pass2Probe);
        self.run_pass2().await;
        self.uploader.flush().await;

        self.state.set_phase(Phase::Idle);
    }

    /// Runs one task per configured root concurrently. Each root keeps its own
    /// strictly sequential walk and cursor, so concurrency across roots never
    /// disturbs the per-root resume ordering; concurrency within a root's files
    /// comes from the permit pool gating `spawn_blocking` hash work, not from
    /// overlapping files in the walk itself.
    async fn run_pass1(self: &Arc<Self>) {
        let config = self.config.lock().await.clone();
        let offpeak = offpeak_window(&config);

        let mut handles = Vec::new();
        for root in config.remote_roots.clone() {
            let this = Arc::clone(self);
            let config = config.clone();
            handles.push(tokio::spawn(async move {
                this.run_pass1_root(&root, &config, offpeak).await;
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }

    async fn run_pass1_root(self: &Arc<Self>, root: &str, config: &AgentConfig, offpeak: OffPeakWindow) {
        if self.shutting_down() {
            return;
        }
        let cursor = self.store.cursor_get(root, "hash").await.unwrap_or(None);
        let entries: Vec<_> =
            scanner::walk_root(std::path::Path::new(root), cursor.as_deref(), config.follow_symlinks).collect();

        for entry in entries {
            if self.shutting_down() {
                return;
            }
            self.state.file_seen();
            let path_str = entry.path.to_string_lossy().to_string();
            let ext = classifier::normalize_ext(&entry.path);
            let classified = classifier::classify(
                &entry.path,
                &ext,
                &config.media_extensions,
                &config.junk_patterns,
                &config.junk_exclude_extensions,
            );
            self.state.record_kind(classified.kind);

            let record = self.process_pass1_entry(config, offpeak, &path_str, &ext, &entry.stat, classified).await;
            if let Some(record) = record {
                if let Some(outcome) = self.uploader.push(record).await {
                    self.note_flush(outcome);
                } else if let Some(outcome) = self.uploader.flush_if_stale().await {
                    self.note_flush(outcome);
                }
            }

            self.write_with_retry(&path_str, "cursor_set", || self.store.cursor_set(root, "hash", &path_str))
                .await;
        }
        self.write_with_retry(root, "cursor_clear", || self.store.cursor_clear(root, "hash"))
            .await;
    }

    /// Looks up a cache entry, retrying once on store error before degrading to
    /// no-cache mode (treat as a cache miss) and logging loudly.
    async fn cache_lookup_with_retry(&self, path_str: &str) -> Option<crate::store::CacheEntry> {
        match self.store.cache_lookup(path_str).await {
            Ok(entry) => entry,
            Err(first_err) => match self.store.cache_lookup(path_str).await {
                Ok(entry) => entry,
                Err(second_err) => {
                    tracing::error!(
                        path_str,
                        first_error = %first_err,
                        second_error = %second_err,
                        "cache store errored twice, degrading to no-cache mode for this file"
                    );
                    None
                }
            },
        }
    }

    /// Retries a fallible store write once before degrading to no-cache mode (the
    /// write is simply dropped) and logging loudly, same policy as
    /// [`Self::cache_lookup_with_retry`] applies to reads.
    async fn write_with_retry<F, Fut>(&self, path_str: &str, op_name: &str, op: F)
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<(), crate::error::CacheStoreError>>,
    {
        if let Err(first_err) = op().await {
            if let Err(second_err) = op().await {
                tracing::error!(
                    path_str,
                    op = op_name,
                    first_error = %first_err,
                    second_error = %second_err,
                    "cache store write errored twice, degrading to no-cache mode for this file"
                );
            }
        }
    }

    async fn process_pass1_entry(
        self: &Arc<Self>,
        config: &AgentConfig,
        offpeak: OffPeakWindow,
        path_str: &str,
        ext: &str,
        file_stat: &stat::FileStat,
        classified: ClassifyResult,
    ) -> Option<FileRecord> {
        if classified.kind == Kind::Junk {
            return Some(base_record(classified.kind, path_str, ext, file_stat, classified.reason));
        }

        let cache_entry = self.cache_lookup_with_retry(path_str).await;
        let skip = cache_entry
            .as_ref()
            .map(|e| e.skip_hash(file_stat, config.hash_algo, config.hash_sample_size))
            .unwrap_or(false);

        if skip {
            if let Err(err) = self.store.touch(path_str, file_stat).await {
                tracing::warn!(error = %err, path_str, "failed to touch cache entry");
            }
            let entry = cache_entry.expect("skip implies a cache entry exists");
            let hashes = Hashes {
                algo: config.hash_algo,
                sample_size: config.hash_sample_size,
                sample_hash: entry.sample_hash.unwrap_or_default(),
                full_hash: entry.full_hash,
            };
            let mut record = base_record(classified.kind, path_str, ext, file_stat, None);
            record.hashes = Some(hashes);
            return Some(record);
        }

        let do_full = config.do_full_hash && offpeak.contains_now();
        let params = HashParams {
            algo: config.hash_algo,
            sample_size: config.hash_sample_size,
        };

        self.state.task_started();
        let permit = self.permits.acquire().await;
        let path = std::path::PathBuf::from(path_str);
        let result = tokio::task::spawn_blocking(move || hasher::hash(&path, params, do_full))
            .await
            .expect("hashing task does not panic");
        drop(permit);
        self.state.task_finished();

        match result {
            Ok(output) => {
                self.write_with_retry(path_str, "mark_hashed", || {
                    self.store.mark_hashed(
                        path_str,
                        file_stat,
                        config.hash_algo,
                        config.hash_sample_size,
                        &output.sample_hash,
                        output.full_hash.as_deref(),
                    )
                })
                .await;
                let mut record = base_record(classified.kind, path_str, ext, file_stat, None);
                record.hashes = Some(Hashes {
                    algo: config.hash_algo,
                    sample_size: config.hash_sample_size,
                    sample_hash: output.sample_hash,
                    full_hash: output.full_hash,
                });
                Some(record)
            }
            Err(err) => {
                tracing::warn!(error = %err, path_str, "hashing failed, emitting unenriched record");
                self.state.record_error();
                Some(base_record(classified.kind, path_str, ext, file_stat, None))
            }
        }
    }

    /// One task per configured root, same rationale as [`Self::run_pass1`].
    async fn run_pass2(self: &Arc<Self>) {
        let config = self.config.lock().await.clone();

        let mut handles = Vec::new();
        for root in config.remote_roots.clone() {
            let this = Arc::clone(self);
            let config = config.clone();
            handles.push(tokio::spawn(async move {
                this.run_pass2_root(&root, &config).await;
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }

    async fn run_pass2_root(self: &Arc<Self>, root: &str, config: &AgentConfig) {
        if self.shutting_down() {
            return;
        }
        let cursor = self.store.cursor_get(root, "probe").await.unwrap_or(None);
        let entries: Vec<_> =
            scanner::walk_root(std::path::Path::new(root), cursor.as_deref(), config.follow_symlinks).collect();

        for entry in entries {
            if self.shutting_down() {
                return;
            }
            let path_str = entry.path.to_string_lossy().to_string();
            let ext = classifier::normalize_ext(&entry.path);
            let classified = classifier::classify(
                &entry.path,
                &ext,
                &config.media_extensions,
                &config.junk_patterns,
                &config.junk_exclude_extensions,
            );

            if classified.kind == Kind::Video {
                if let Some(record) = self.process_pass2_entry(&path_str, &ext, &entry.stat).await {
                    if let Some(outcome) = self.uploader.push(record).await {
                        self.note_flush(outcome);
                    } else if let Some(outcome) = self.uploader.flush_if_stale().await {
                        self.note_flush(outcome);
                    }
                }
            }

            self.write_with_retry(&path_str, "cursor_set", || self.store.cursor_set(root, "probe", &path_str))
                .await;
        }
        self.write_with_retry(root, "cursor_clear", || self.store.cursor_clear(root, "probe"))
            .await;
    }

    async fn process_pass2_entry(
        self: &Arc<Self>,
        path_str: &str,
        ext: &str,
        file_stat: &stat::FileStat,
    ) -> Option<FileRecord> {
        let cache_entry = self.cache_lookup_with_retry(path_str).await;
        let skip = cache_entry
            .map(|e| e.skip_probe(file_stat))
            .unwrap_or(false);
        if skip {
            return None;
        }

        self.state.task_started();
        let permit = self.permits.acquire().await;
        let result = prober::probe(std::path::Path::new(path_str), &self.probe_options).await;
        drop(permit);
        self.state.task_finished();

        match result {
            Ok(video_meta) => {
                self.write_with_retry(path_str, "mark_probed", || self.store.mark_probed(path_str, file_stat))
                    .await;
                let mut record = base_record(Kind::Video, path_str, ext, file_stat, None);
                record.video_meta = Some(video_meta);
                Some(record)
            }
            Err(err) => {
                tracing::warn!(error = %err, path_str, "probing failed, no record emitted");
                self.state.record_error();
                None
            }
        }
    }

    fn note_flush(&self, outcome: FlushOutcome) {
        match outcome {
            FlushOutcome::Uploaded { record_count, .. } => {
                self.state.record_batch_uploaded(record_count as u64);
            }
            FlushOutcome::Outboxed { .. } => {
                self.state.record_error();
                self.state.record_batch_outboxed();
            }
            FlushOutcome::Empty => {}
        }
        let this_store = Arc::clone(&self.store);
        let uploader = Arc::clone(&self.uploader);
        tokio::spawn(async move {
            let _ = drain_outbox_once(&this_store, &uploader).await;
        });
    }

    async fn drain_outbox_once(&self) {
        let _ = drain_outbox_once(&self.store, &self.uploader).await;
    }

    async fn drain_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(30));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.drain_outbox_once().await;
        }
    }

    async fn rebalance_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(permits::REBALANCE_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let config = self.config.lock().await.clone();
            if !config.agent_adaptive {
                continue;
            }
            let outbox_size = self.store.outbox_size().await.unwrap_or(0);
            let error_rate = self.state.error_rate();
            let latency_is_healthy = error_rate < 0.05;
            self.permits.rebalance(outbox_size, 50, error_rate, latency_is_healthy);
        }
    }
}

/// Drains the outbox oldest-first, stopping on the first failure to preserve FIFO
/// order. A successful live upload elsewhere triggers this same routine.
async fn drain_outbox_once(store: &Arc<Store>, uploader: &Arc<BatchUploader>) -> Result<(), crate::error::CacheStoreError> {
    loop {
        let Some(item) = store.outbox_peek_oldest().await? else {
            return Ok(());
        };
        match uploader.resend_raw(&item.payload_json).await {
            Ok(true) => {
                store.outbox_delete(item.id).await?;
            }
            _ => return Ok(()),
        }
    }
}

fn base_record(
    kind: Kind,
    path: &str,
    ext: &str,
    file_stat: &stat::FileStat,
    reason: Option<String>,
) -> FileRecord {
    FileRecord {
        kind,
        path: path.to_string(),
        size: file_stat.size,
        mtime: file_stat.mtime,
        ctime: file_stat.ctime,
        inode_key: file_stat.inode_key.clone(),
        ext: ext.to_string(),
        reason,
        hashes: None,
        video_meta: None,
    }
}

fn offpeak_window(config: &AgentConfig) -> OffPeakWindow {
    let default = permits::parse_hhmm("00:00").unwrap();
    OffPeakWindow {
        start: permits::parse_hhmm(&config.agent_offpeak_start).unwrap_or(default),
        end: permits::parse_hhmm(&config.agent_offpeak_end).unwrap_or(default),
    }
}
