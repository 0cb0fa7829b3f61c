//! The `/agent/*` HTTP control and diagnostics surface on port 8877. All handlers
//! are non-blocking and read-only except `scan_now`, `clear_cache`, and
//! `compact_cache`, which coordinate with the [`Orchestrator`].

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::orchestrator::Orchestrator;
use crate::stats::AgentState;
use crate::store::Store;
use crate::timeutil::now_secs;

#[derive(Clone)]
pub struct ControlState {
    pub agent_state: Arc<AgentState>,
    pub store: Arc<Store>,
    pub orchestrator: Arc<Orchestrator>,
}

pub fn router(state: ControlState) -> Router {
    Router::new()
        .route("/agent/ping", get(ping))
        .route("/agent/stats", get(stats))
        .route("/agent/ls", get(list_directory))
        .route("/agent/scan_now", post(scan_now))
        .route("/agent/clear_cache", post(clear_cache))
        .route("/agent/cache_info", get(cache_info))
        .route("/agent/compact_cache", post(compact_cache))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct PingResponse {
    ok: bool,
}

async fn ping() -> Json<PingResponse> {
    Json(PingResponse { ok: true })
}

async fn stats(State(state): State<ControlState>) -> Json<crate::stats::StatsSnapshot> {
    Json(state.agent_state.snapshot())
}

#[derive(Deserialize)]
struct LsQuery {
    path: String,
}

#[derive(Serialize)]
struct LsEntry {
    name: String,
    kind: &'static str,
    size: u64,
}

#[derive(Serialize)]
struct LsResponse {
    path: String,
    entries: Vec<LsEntry>,
}

async fn list_directory(Query(query): Query<LsQuery>) -> Json<LsResponse> {
    let dir = PathBuf::from(&query.path);
    let mut entries = Vec::new();
    if let Ok(mut read_dir) = tokio::fs::read_dir(&dir).await {
        while let Ok(Some(entry)) = read_dir.next_entry().await {
            let name = entry.file_name().to_string_lossy().to_string();
            let meta = entry.metadata().await.ok();
            let kind = match &meta {
                Some(m) if m.is_dir() => "dir",
                Some(m) if m.is_file() => "file",
                _ => "other",
            };
            let size = meta.map(|m| m.len()).unwrap_or(0);
            entries.push(LsEntry { name, kind, size });
        }
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Json(LsResponse {
        path: query.path,
        entries,
    })
}

#[derive(Serialize)]
struct ScanNowResponse {
    phase: crate::stats::Phase,
}

async fn scan_now(State(state): State<ControlState>) -> Json<ScanNowResponse> {
    let phase = state.orchestrator.scan_now();
    Json(ScanNowResponse { phase })
}

#[derive(Serialize)]
struct ClearCacheResponse {
    ok: bool,
    cleared: bool,
}

async fn clear_cache(State(state): State<ControlState>) -> Json<ClearCacheResponse> {
    match state.store.clear().await {
        Ok(()) => Json(ClearCacheResponse {
            ok: true,
            cleared: true,
        }),
        Err(err) => {
            tracing::error!(error = %err, "clear_cache failed");
            Json(ClearCacheResponse {
                ok: false,
                cleared: false,
            })
        }
    }
}

#[derive(Serialize)]
struct CacheInfoResponse {
    db_path: String,
    exists: bool,
    size_bytes: u64,
    rows: u64,
    last: Option<String>,
    ts: f64,
}

async fn cache_info(State(state): State<ControlState>) -> Json<CacheInfoResponse> {
    let db_path = state.store.path().to_string_lossy().to_string();
    let exists = state.store.path().exists();
    let size_bytes = state.store.size_bytes().await;
    let rows = state.store.cache_row_count().await.unwrap_or(0);
    Json(CacheInfoResponse {
        db_path,
        exists,
        size_bytes,
        rows,
        last: None,
        ts: now_secs(),
    })
}

#[derive(Serialize)]
struct CompactCacheResponse {
    ok: bool,
}

async fn compact_cache(State(state): State<ControlState>) -> Json<CompactCacheResponse> {
    match state.store.compact().await {
        Ok(()) => Json(CompactCacheResponse { ok: true }),
        Err(err) => {
            tracing::error!(error = %err, "compact_cache failed");
            Json(CompactCacheResponse { ok: false })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentConfig;
    use crate::permits::PermitPool;
    use crate::uploader::{BatchUploader, UploaderConfig};
    use axum_test::TestServer;
    use tokio::sync::Mutex;

    async fn test_server() -> (tempfile::TempDir, TestServer) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join("c.db")).await.unwrap());
        let agent_state = Arc::new(AgentState::new());
        let permits = PermitPool::new(1, 4);
        let uploader = Arc::new(BatchUploader::new(store.clone(), UploaderConfig::default()));
        let config = Arc::new(Mutex::new(AgentConfig::default()));
        let orchestrator = Orchestrator::new(store.clone(), agent_state.clone(), permits, uploader, config);

        let app = router(ControlState {
            agent_state,
            store,
            orchestrator,
        });
        (dir, TestServer::new(app).unwrap())
    }

    #[tokio::test]
    async fn ping_reports_ok() {
        let (_dir, server) = test_server().await;
        let response = server.get("/agent/ping").await;
        response.assert_json(&serde_json::json!({"ok": true}));
    }

    #[tokio::test]
    async fn stats_reports_zeroed_counters_on_fresh_agent() {
        let (_dir, server) = test_server().await;
        let response = server.get("/agent/stats").await;
        let body: serde_json::Value = response.json();
        assert_eq!(body["active"], 0);
        assert_eq!(body["uploaded"], 0);
        assert_eq!(body["phase"], "idle");
        assert_eq!(body["counters"]["video"], 0);
        assert_eq!(body["counters"]["junk"], 0);
    }

    #[tokio::test]
    async fn cache_info_reports_db_path() {
        let (_dir, server) = test_server().await;
        let response = server.get("/agent/cache_info").await;
        let body: serde_json::Value = response.json();
        assert!(body["db_path"].as_str().unwrap().ends_with("c.db"));
        assert!(body["exists"].as_bool().unwrap());
    }

    #[tokio::test]
    async fn clear_cache_reports_success() {
        let (_dir, server) = test_server().await;
        let response = server.post("/agent/clear_cache").await;
        let body: serde_json::Value = response.json();
        assert_eq!(body["ok"], true);
        assert_eq!(body["cleared"], true);
    }
}
