//! The wire objects delivered to the host. A [`FileRecord`] is partial-by-design:
//! Pass 1 emits records without `video_meta`, Pass 2 emits records with `video_meta`
//! and without recomputed `hashes`. The host merges by `path`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Video,
    Image,
    Subtitle,
    Xml,
    Other,
    Junk,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgo {
    Blake3,
    Xxhash64,
    Sha256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hashes {
    pub algo: HashAlgo,
    pub sample_size: u64,
    pub sample_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_hash: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMeta {
    pub duration: f64,
    pub container: String,
    pub video_codec: String,
    pub audio_codecs: Vec<String>,
    pub width: u32,
    pub height: u32,
    pub bitrate: u64,
    pub streams_json: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub kind: Kind,
    pub path: String,
    pub size: u64,
    pub mtime: f64,
    pub ctime: f64,
    pub inode_key: String,
    pub ext: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hashes: Option<Hashes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_meta: Option<VideoMeta>,
}

/// `{"batch_id": ..., "files": [...]}` — the `/ingest/batch` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchPayload {
    pub batch_id: String,
    pub files: Vec<FileRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_record_omits_absent_fields() {
        let record = FileRecord {
            kind: Kind::Other,
            path: "/r/b.txt".into(),
            size: 12,
            mtime: 0.0,
            ctime: 0.0,
            inode_key: "1:2".into(),
            ext: "txt".into(),
            reason: None,
            hashes: None,
            video_meta: None,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("reason").is_none());
        assert!(json.get("hashes").is_none());
        assert!(json.get("video_meta").is_none());
    }

    #[test]
    fn junk_record_carries_reason_without_hashes() {
        let record = FileRecord {
            kind: Kind::Junk,
            path: "/r/sample.part".into(),
            size: 0,
            mtime: 0.0,
            ctime: 0.0,
            inode_key: "1:3".into(),
            ext: "part".into(),
            reason: Some("*.part".into()),
            hashes: None,
            video_meta: None,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["reason"], "*.part");
        assert!(json.get("hashes").is_none());
    }
}
