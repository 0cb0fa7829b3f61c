//! Agent configuration: fetched from the host's `/ingest/config`, refreshed
//! periodically, and falls back to built-in defaults when the host is unreachable.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::classifier::MediaExtensions;
use crate::error::ConfigFetchError;
use crate::model::HashAlgo;

pub const CONFIG_REFRESH_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub remote_roots: Vec<String>,
    pub hash_algo: HashAlgo,
    pub hash_sample_size: u64,
    pub do_full_hash: bool,
    pub agent_batch_size: usize,
    pub agent_max_workers: usize,
    pub agent_min_workers: usize,
    pub agent_gzip: bool,
    pub agent_adaptive: bool,
    pub agent_offpeak_start: String,
    pub agent_offpeak_end: String,
    pub follow_symlinks: bool,
    pub junk_patterns: Vec<String>,
    pub junk_exclude_extensions: Vec<String>,
    pub media_extensions: MediaExtensions,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            remote_roots: Vec::new(),
            hash_algo: HashAlgo::Blake3,
            hash_sample_size: 65536,
            do_full_hash: false,
            agent_batch_size: 200,
            agent_max_workers: 8,
            agent_min_workers: 1,
            agent_gzip: false,
            agent_adaptive: true,
            agent_offpeak_start: "02:00".to_string(),
            agent_offpeak_end: "05:00".to_string(),
            follow_symlinks: false,
            junk_patterns: Vec::new(),
            junk_exclude_extensions: Vec::new(),
            media_extensions: MediaExtensions {
                video: vec![
                    "mkv".into(), "mp4".into(), "avi".into(), "mov".into(), "wmv".into(),
                    "webm".into(), "m4v".into(), "flv".into(), "mpg".into(), "mpeg".into(),
                ],
                image: vec![
                    "jpg".into(), "jpeg".into(), "png".into(), "gif".into(), "bmp".into(),
                    "webp".into(), "tiff".into(),
                ],
                subtitle: vec!["srt".into(), "sub".into(), "ass".into(), "vtt".into()],
                xml: vec!["nfo".into(), "xml".into()],
            },
        }
    }
}

/// Fetches `GET <host>/ingest/config` and parses it into an [`AgentConfig`].
pub async fn fetch_config(client: &reqwest::Client, host: &str) -> Result<AgentConfig, ConfigFetchError> {
    let url = format!("{}/ingest/config", host.trim_end_matches('/'));
    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|source| ConfigFetchError::Request {
            url: url.clone(),
            source,
        })?;
    let config = response
        .json::<AgentConfig>()
        .await
        .map_err(|source| ConfigFetchError::InvalidJson { url, source })?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_worker_bounds() {
        let config = AgentConfig::default();
        assert!(config.agent_min_workers <= config.agent_max_workers);
        assert!(config.agent_batch_size > 0);
    }

    #[test]
    fn default_config_round_trips_through_json() {
        let config = AgentConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: AgentConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, parsed);
    }
}
