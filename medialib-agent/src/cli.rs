use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command()]
/// Remote ingest agent: scans, fingerprints, and uploads media file records to a host.
pub struct Cli {
    /// Base URL of the host ingest server, e.g. http://catalog.local:8000
    pub host_url: String,

    /// Delete the local reuse cache before starting
    #[arg(long)]
    pub clear_cache: bool,

    /// Directory for the agent's persisted state (cache, outbox, cursors, logs)
    #[arg(long)]
    pub state_dir: Option<PathBuf>,

    /// Port for the /agent/* control surface
    #[arg(long, default_value_t = 8877)]
    pub control_port: u16,

    /// Timeout for each metadata-extraction subprocess, e.g. "60s" or "2m"
    #[arg(long, default_value = "60s")]
    pub probe_timeout: humantime::Duration,
}

impl Cli {
    pub fn state_dir(&self) -> PathBuf {
        self.state_dir.clone().unwrap_or_else(default_state_dir)
    }
}

fn default_state_dir() -> PathBuf {
    dirs_home().join(".medialib")
}

fn dirs_home() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}
