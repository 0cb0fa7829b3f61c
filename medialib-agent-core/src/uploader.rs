//! Buffers emitted [`FileRecord`]s and flushes them as sized/timed batches to the
//! host's `/ingest/batch` endpoint, falling back to the Outbox on any non-2xx
//! outcome.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use flate2::write::GzEncoder;
use flate2::Compression;
use reqwest::{Client, StatusCode};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::model::{BatchPayload, FileRecord};
use crate::store::Store;

#[derive(Debug, Clone)]
pub struct UploaderConfig {
    pub host: String,
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub gzip: bool,
    pub request_timeout: Duration,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            batch_size: 200,
            flush_interval: Duration::from_secs(2),
            gzip: false,
            request_timeout: Duration::from_secs(30),
        }
    }
}

pub enum FlushOutcome {
    Uploaded { batch_id: String, record_count: usize },
    Outboxed { batch_id: String, record_count: usize },
    Empty,
}

struct Buffer {
    records: Vec<FileRecord>,
    opened_at: Option<Instant>,
}

pub struct BatchUploader {
    client: Client,
    store: Arc<Store>,
    config: Mutex<UploaderConfig>,
    buffer: Mutex<Buffer>,
}

impl BatchUploader {
    pub fn new(store: Arc<Store>, config: UploaderConfig) -> Self {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .expect("reqwest client builds with a fixed timeout");
        Self {
            client,
            store,
            config: Mutex::new(config),
            buffer: Mutex::new(Buffer {
                records: Vec::new(),
                opened_at: None,
            }),
        }
    }

    pub async fn set_config(&self, config: UploaderConfig) {
        *self.config.lock().await = config;
    }

    /// Pushes a record into the buffer and flushes if the size trigger fires.
    pub async fn push(&self, record: FileRecord) -> Option<FlushOutcome> {
        let batch_size = self.config.lock().await.batch_size;
        let should_flush = {
            let mut buf = self.buffer.lock().await;
            if buf.records.is_empty() {
                buf.opened_at = Some(Instant::now());
            }
            buf.records.push(record);
            buf.records.len() >= batch_size
        };
        if should_flush {
            Some(self.flush().await)
        } else {
            None
        }
    }

    /// Flushes if the time trigger (~2s since the buffer opened) has elapsed.
    pub async fn flush_if_stale(&self) -> Option<FlushOutcome> {
        let flush_interval = self.config.lock().await.flush_interval;
        let is_stale = {
            let buf = self.buffer.lock().await;
            match buf.opened_at {
                Some(opened) => !buf.records.is_empty() && opened.elapsed() >= flush_interval,
                None => false,
            }
        };
        if is_stale {
            Some(self.flush().await)
        } else {
            None
        }
    }

    /// Explicit flush at the end of a phase, regardless of size/time triggers.
    pub async fn flush(&self) -> FlushOutcome {
        let records = {
            let mut buf = self.buffer.lock().await;
            buf.opened_at = None;
            std::mem::take(&mut buf.records)
        };
        if records.is_empty() {
            return FlushOutcome::Empty;
        }

        let batch_id = uuid::Uuid::new_v4().to_string();
        let record_count = records.len();
        let payload = BatchPayload {
            batch_id: batch_id.clone(),
            files: records,
        };
        let body = serde_json::to_vec(&payload).expect("FileRecord always serializes");

        let (gzip, host) = {
            let cfg = self.config.lock().await;
            (cfg.gzip, cfg.host.clone())
        };

        let (body, content_encoding) = if gzip {
            (gzip_encode(&body), Some("gzip"))
        } else {
            (body, None)
        };

        match self.post(&host, body, content_encoding).await {
            Ok(true) => FlushOutcome::Uploaded {
                batch_id,
                record_count,
            },
            _ => {
                let payload_json = serde_json::to_vec(&payload).expect("FileRecord always serializes");
                if let Err(err) = self.store.outbox_enqueue(&batch_id, &payload_json).await {
                    tracing::error!(error = %err, "failed to enqueue batch to outbox, upload is lost");
                }
                FlushOutcome::Outboxed {
                    batch_id,
                    record_count,
                }
            }
        }
    }

    /// Replays a raw, already-serialized batch payload pulled from the Outbox,
    /// applying the currently configured gzip setting. Used by the drain loop;
    /// never touches the Outbox itself, the caller deletes on success.
    pub async fn resend_raw(&self, payload_json: &[u8]) -> Result<bool, reqwest::Error> {
        let (gzip, host) = {
            let cfg = self.config.lock().await;
            (cfg.gzip, cfg.host.clone())
        };
        let (body, content_encoding) = if gzip {
            (gzip_encode(payload_json), Some("gzip"))
        } else {
            (payload_json.to_vec(), None)
        };
        self.post(&host, body, content_encoding).await
    }

    /// Returns `Ok(true)` on HTTP 2xx, `Ok(false)` on any other status (treated as a
    /// PermanentTransport failure), `Err` on transport-level failure
    /// (TransientTransport). Both failure kinds outbox the payload.
    async fn post(
        &self,
        host: &str,
        body: Vec<u8>,
        content_encoding: Option<&str>,
    ) -> Result<bool, reqwest::Error> {
        let url = format!("{}/ingest/batch", host.trim_end_matches('/'));
        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .body(body);
        if let Some(encoding) = content_encoding {
            request = request.header("Content-Encoding", encoding);
        }
        match request.send().await {
            Ok(response) => Ok(is_success(response.status())),
            Err(err) => {
                tracing::warn!(error = %err, url, "batch upload request failed");
                Err(err)
            }
        }
    }
}

fn is_success(status: StatusCode) -> bool {
    status.is_success()
}

fn gzip_encode(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).expect("writing to an in-memory buffer cannot fail");
    encoder.finish().expect("finishing an in-memory gzip stream cannot fail")
}
