mod cli;
mod init;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use color_eyre::eyre::{self, Context};
use medialib_agent_core::config::{self, AgentConfig, CONFIG_REFRESH_INTERVAL};
use medialib_agent_core::control::{self, ControlState};
use medialib_agent_core::orchestrator::Orchestrator;
use medialib_agent_core::permits::PermitPool;
use medialib_agent_core::stats::AgentState;
use medialib_agent_core::store::Store;
use medialib_agent_core::uploader::{BatchUploader, UploaderConfig};
use tokio::sync::Mutex;

use cli::Cli;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let cli = Cli::parse();
    init::init_eyre()?;

    let state_dir = cli.state_dir();
    std::fs::create_dir_all(&state_dir)
        .wrap_err_with(|| format!("failed to create state directory {state_dir:?}"))?;
    let _log_guard = init::init_logger(Some(&state_dir.join("agent.log")))?;

    tracing::info!(
        host = %cli.host_url,
        state_dir = ?state_dir,
        probe_timeout = %cli.probe_timeout,
        "starting medialib-agent"
    );

    let store = Arc::new(
        Store::open(state_dir.join("agent_cache.db"))
            .await
            .wrap_err("failed to open agent cache store")?,
    );

    if cli.clear_cache {
        tracing::info!("--clear-cache requested, wiping reuse cache");
        store.clear().await.wrap_err("failed to clear cache")?;
    }

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .wrap_err("failed to build http client")?;

    let initial_config = match config::fetch_config(&http_client, &cli.host_url).await {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(error = %err, "failed to fetch initial config from host, using defaults");
            AgentConfig::default()
        }
    };
    let config = Arc::new(Mutex::new(initial_config));

    let agent_state = Arc::new(AgentState::new());
    let permits = {
        let cfg = config.lock().await;
        PermitPool::new(cfg.agent_min_workers, cfg.agent_max_workers)
    };

    let uploader = Arc::new(BatchUploader::new(
        store.clone(),
        uploader_config(&config, &cli.host_url).await,
    ));

    let orchestrator = Orchestrator::new(
        store.clone(),
        agent_state.clone(),
        permits,
        uploader.clone(),
        config.clone(),
    )
    .with_probe_timeout(cli.probe_timeout.into());

    let config_refresh_task = {
        let config = config.clone();
        let uploader = uploader.clone();
        let http_client = http_client.clone();
        let host_url = cli.host_url.clone();
        tokio::spawn(async move {
            config_refresh_loop(http_client, host_url, config, uploader).await;
        })
    };

    let control_state = ControlState {
        agent_state,
        store,
        orchestrator: orchestrator.clone(),
    };
    let control_router = control::router(control_state);
    let control_addr = std::env::var("MEDIALIB_AGENT_CONTROL_ADDR")
        .unwrap_or_else(|_| format!("127.0.0.1:{}", cli.control_port));
    let listener = tokio::net::TcpListener::bind(&control_addr)
        .await
        .wrap_err_with(|| format!("failed to bind control surface on {control_addr}"))?;
    tracing::info!(addr = %control_addr, "control surface listening");

    let orchestrator_task = tokio::spawn(orchestrator.clone().run());

    let server_task = tokio::spawn(async move {
        axum::serve(listener, control_router)
            .with_graceful_shutdown(shutdown_signal())
            .await
    });

    shutdown_signal().await;
    tracing::info!("shutdown signal received");

    orchestrator.request_shutdown();
    config_refresh_task.abort();

    let grace_period = Duration::from_secs(10);
    if tokio::time::timeout(grace_period, orchestrator_task).await.is_err() {
        tracing::warn!("orchestrator did not shut down within the grace period");
    }
    let _ = server_task.await;

    tracing::info!("medialib-agent exited cleanly");
    Ok(())
}

async fn uploader_config(config: &Mutex<AgentConfig>, host_url: &str) -> UploaderConfig {
    let cfg = config.lock().await;
    UploaderConfig {
        host: host_url.to_string(),
        batch_size: cfg.agent_batch_size,
        flush_interval: Duration::from_secs(2),
        gzip: cfg.agent_gzip,
        request_timeout: Duration::from_secs(30),
    }
}

async fn config_refresh_loop(
    http_client: reqwest::Client,
    host_url: String,
    config: Arc<Mutex<AgentConfig>>,
    uploader: Arc<BatchUploader>,
) {
    let mut ticker = tokio::time::interval(CONFIG_REFRESH_INTERVAL);
    loop {
        ticker.tick().await;
        refresh_once(&http_client, &host_url, &config, &uploader).await;
    }
}

async fn refresh_once(
    http_client: &reqwest::Client,
    host_url: &str,
    config: &Arc<Mutex<AgentConfig>>,
    uploader: &Arc<BatchUploader>,
) {
    match config::fetch_config(http_client, host_url).await {
        Ok(fresh) => {
            *config.lock().await = fresh.clone();
            uploader
                .set_config(UploaderConfig {
                    host: host_url.to_string(),
                    batch_size: fresh.agent_batch_size,
                    flush_interval: Duration::from_secs(2),
                    gzip: fresh.agent_gzip,
                    request_timeout: Duration::from_secs(30),
                })
                .await;
            tracing::debug!("refreshed agent config from host");
        }
        Err(err) => {
            tracing::warn!(error = %err, "failed to refresh config, keeping last-known values");
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install sigterm handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
