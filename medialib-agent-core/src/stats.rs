//! Process-wide counters and current phase, updated atomically and exposed by the
//! Control surface's `/agent/stats`. The sole piece of global mutable state; every
//! component receives it by reference instead of reaching for ambient globals.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

use crate::model::Kind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Pass1Hash,
    Pass2Probe,
}

impl Phase {
    fn as_i64(self) -> i64 {
        match self {
            Phase::Idle => 0,
            Phase::Pass1Hash => 1,
            Phase::Pass2Probe => 2,
        }
    }

    fn from_i64(v: i64) -> Self {
        match v {
            1 => Phase::Pass1Hash,
            2 => Phase::Pass2Probe,
            _ => Phase::Idle,
        }
    }
}

pub struct AgentState {
    phase: AtomicI64,
    active: AtomicU64,
    uploaded: AtomicU64,
    batches: AtomicU64,
    errors: AtomicU64,
    files_seen: AtomicU64,
    upload_attempts: AtomicU64,
    upload_failures: AtomicU64,
    video_count: AtomicU64,
    image_count: AtomicU64,
    subtitle_count: AtomicU64,
    xml_count: AtomicU64,
    other_count: AtomicU64,
    junk_count: AtomicU64,
    started_at: Instant,
}

impl Default for AgentState {
    fn default() -> Self {
        Self {
            phase: AtomicI64::new(Phase::Idle.as_i64()),
            active: AtomicU64::new(0),
            uploaded: AtomicU64::new(0),
            batches: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            files_seen: AtomicU64::new(0),
            upload_attempts: AtomicU64::new(0),
            upload_failures: AtomicU64::new(0),
            video_count: AtomicU64::new(0),
            image_count: AtomicU64::new(0),
            subtitle_count: AtomicU64::new(0),
            xml_count: AtomicU64::new(0),
            other_count: AtomicU64::new(0),
            junk_count: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }
}

impl AgentState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Phase {
        Phase::from_i64(self.phase.load(Ordering::Relaxed))
    }

    pub fn set_phase(&self, phase: Phase) {
        self.phase.store(phase.as_i64(), Ordering::Relaxed);
    }

    pub fn task_started(&self) {
        self.active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn task_finished(&self) {
        self.active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn file_seen(&self) {
        self.files_seen.fetch_add(1, Ordering::Relaxed);
    }

    /// Per-kind breakdown of every file classified during Pass 1.
    pub fn record_kind(&self, kind: Kind) {
        let counter = match kind {
            Kind::Video => &self.video_count,
            Kind::Image => &self.image_count,
            Kind::Subtitle => &self.subtitle_count,
            Kind::Xml => &self.xml_count,
            Kind::Other => &self.other_count,
            Kind::Junk => &self.junk_count,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_batch_uploaded(&self, record_count: u64) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.uploaded.fetch_add(record_count, Ordering::Relaxed);
        self.upload_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_batch_outboxed(&self) {
        self.upload_attempts.fetch_add(1, Ordering::Relaxed);
        self.upload_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Fraction of upload attempts that failed in the process lifetime; feeds the
    /// permit pool's adaptation rule.
    pub fn error_rate(&self) -> f64 {
        let attempts = self.upload_attempts.load(Ordering::Relaxed);
        if attempts == 0 {
            return 0.0;
        }
        self.upload_failures.load(Ordering::Relaxed) as f64 / attempts as f64
    }

    pub fn rate_files_per_s(&self) -> f64 {
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed <= 0.0 {
            return 0.0;
        }
        self.files_seen.load(Ordering::Relaxed) as f64 / elapsed
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            active: self.active.load(Ordering::Relaxed),
            uploaded: self.uploaded.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            rate_files_per_s: self.rate_files_per_s(),
            totals: self.files_seen.load(Ordering::Relaxed),
            phase: self.phase(),
            counters: KindCounters {
                video: self.video_count.load(Ordering::Relaxed),
                image: self.image_count.load(Ordering::Relaxed),
                subtitle: self.subtitle_count.load(Ordering::Relaxed),
                xml: self.xml_count.load(Ordering::Relaxed),
                other: self.other_count.load(Ordering::Relaxed),
                junk: self.junk_count.load(Ordering::Relaxed),
            },
        }
    }
}

/// Per-kind breakdown of files seen, keyed the same way as [`Kind`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KindCounters {
    pub video: u64,
    pub image: u64,
    pub subtitle: u64,
    pub xml: u64,
    pub other: u64,
    pub junk: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub active: u64,
    pub uploaded: u64,
    pub batches: u64,
    pub errors: u64,
    pub rate_files_per_s: f64,
    pub totals: u64,
    pub phase: Phase,
    pub counters: KindCounters,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        let state = AgentState::new();
        let snap = state.snapshot();
        assert_eq!(snap.active, 0);
        assert_eq!(snap.uploaded, 0);
        assert_eq!(snap.batches, 0);
        assert_eq!(snap.errors, 0);
    }

    #[test]
    fn task_started_and_finished_balance_active_count() {
        let state = AgentState::new();
        state.task_started();
        state.task_started();
        state.task_finished();
        assert_eq!(state.snapshot().active, 1);
    }

    #[test]
    fn error_rate_is_zero_with_no_attempts() {
        let state = AgentState::new();
        assert_eq!(state.error_rate(), 0.0);
    }

    #[test]
    fn error_rate_reflects_failed_fraction() {
        let state = AgentState::new();
        state.record_batch_uploaded(10);
        state.record_batch_outboxed();
        assert!((state.error_rate() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn phase_transitions_are_observable() {
        let state = AgentState::new();
        assert_eq!(state.phase(), Phase::Idle);
        state.set_phase(Phase::Pass1Hash);
        assert_eq!(state.phase(), Phase::Pass1Hash);
    }

    #[test]
    fn counters_break_down_by_kind() {
        let state = AgentState::new();
        state.record_kind(Kind::Video);
        state.record_kind(Kind::Video);
        state.record_kind(Kind::Junk);
        let counters = state.snapshot().counters;
        assert_eq!(counters.video, 2);
        assert_eq!(counters.junk, 1);
        assert_eq!(counters.image, 0);
        assert_eq!(counters.other, 0);
    }
}
