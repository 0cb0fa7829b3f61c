//! Shells out to an external video-metadata extractor and normalizes its JSON output.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use serde_json::Value;
use tokio::process::Command;
use tokio::time::timeout;

use crate::error::ProbeError;
use crate::model::VideoMeta;

#[derive(Debug, Clone)]
pub struct ProbeOptions {
    pub extractor_path: String,
    pub timeout: Duration,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            extractor_path: std::env::var("MEDIALIB_FFPROBE").unwrap_or_else(|_| "ffprobe".to_string()),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Spawns `ffprobe -print_format json -show_format -show_streams <path>`, kills it on
/// timeout, and parses the resulting JSON into a [`VideoMeta`].
pub async fn probe(path: &Path, opts: &ProbeOptions) -> Result<VideoMeta, ProbeError> {
    let child = Command::new(&opts.extractor_path)
        .arg("-v")
        .arg("quiet")
        .arg("-print_format")
        .arg("json")
        .arg("-show_format")
        .arg("-show_streams")
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(ProbeError::Spawn)?;

    let output = match timeout(opts.timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(ProbeError::Spawn)?,
        Err(_) => {
            return Err(ProbeError::Timeout(opts.timeout));
        }
    };

    if !output.status.success() {
        return Err(ProbeError::NonZeroExit(output.status));
    }

    let stdout = String::from_utf8(output.stdout).map_err(ProbeError::InvalidUtf8)?;
    let parsed: Value = serde_json::from_str(&stdout).map_err(ProbeError::InvalidJson)?;

    Ok(normalize(&parsed))
}

fn normalize(parsed: &Value) -> VideoMeta {
    let format = &parsed["format"];
    let streams = parsed["streams"].as_array().cloned().unwrap_or_default();

    let duration = format["duration"]
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .or_else(|| format["duration"].as_f64())
        .unwrap_or(0.0);

    let container = format["format_name"]
        .as_str()
        .unwrap_or_default()
        .split(',')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();

    let video_stream = streams
        .iter()
        .find(|s| s["codec_type"].as_str() == Some("video"));
    let video_codec = video_stream
        .and_then(|s| s["codec_name"].as_str())
        .unwrap_or_default()
        .to_string();
    let width = video_stream
        .and_then(|s| s["width"].as_u64())
        .unwrap_or(0) as u32;
    let height = video_stream
        .and_then(|s| s["height"].as_u64())
        .unwrap_or(0) as u32;

    let audio_codecs: Vec<String> = streams
        .iter()
        .filter(|s| s["codec_type"].as_str() == Some("audio"))
        .map(|s| s["codec_name"].as_str().unwrap_or_default().to_string())
        .collect();

    let bitrate = format["bit_rate"]
        .as_str()
        .and_then(|s| s.parse::<u64>().ok())
        .or_else(|| format["bit_rate"].as_u64())
        .unwrap_or(0);

    VideoMeta {
        duration,
        container,
        video_codec,
        audio_codecs,
        width,
        height,
        bitrate,
        streams_json: Value::Array(streams),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_defaults_missing_numeric_fields_to_zero() {
        let parsed: Value = serde_json::json!({
            "format": {"format_name": "matroska,webm"},
            "streams": [],
        });
        let meta = normalize(&parsed);
        assert_eq!(meta.duration, 0.0);
        assert_eq!(meta.width, 0);
        assert_eq!(meta.height, 0);
        assert_eq!(meta.bitrate, 0);
        assert_eq!(meta.container, "matroska");
        assert_eq!(meta.video_codec, "");
        assert!(meta.audio_codecs.is_empty());
    }

    #[test]
    fn normalize_extracts_first_video_stream_and_all_audio_streams() {
        let parsed: Value = serde_json::json!({
            "format": {
                "format_name": "matroska,webm",
                "duration": "125.40",
                "bit_rate": "3200000",
            },
            "streams": [
                {"codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080},
                {"codec_type": "audio", "codec_name": "aac"},
                {"codec_type": "audio", "codec_name": "ac3"},
            ],
        });
        let meta = normalize(&parsed);
        assert_eq!(meta.duration, 125.40);
        assert_eq!(meta.container, "matroska");
        assert_eq!(meta.video_codec, "h264");
        assert_eq!(meta.width, 1920);
        assert_eq!(meta.height, 1080);
        assert_eq!(meta.bitrate, 3_200_000);
        assert_eq!(meta.audio_codecs, vec!["aac", "ac3"]);
    }

    #[tokio::test]
    async fn probe_surfaces_spawn_error_for_missing_extractor() {
        let opts = ProbeOptions {
            extractor_path: "/nonexistent/ffprobe-binary".to_string(),
            timeout: Duration::from_secs(1),
        };
        let err = probe(Path::new("/tmp/whatever.mkv"), &opts).await;
        assert!(matches!(err, Err(ProbeError::Spawn(_))));
    }
}
