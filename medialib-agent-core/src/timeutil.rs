use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch, matching the wire model's `mtime`/`ctime` unit.
pub fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
