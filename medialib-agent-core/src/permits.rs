//! A counting semaphore with externally mutable capacity in `[min_workers,
//! max_workers]`, gating every hash/probe task. Capacity changes take effect on the
//! next acquire, not retroactively on outstanding permits.

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveTime};
use tokio::sync::{Semaphore, SemaphorePermit};

pub struct PermitPool {
    semaphore: Semaphore,
    min_workers: usize,
    max_workers: usize,
    current_capacity: AtomicUsize,
    last_rebalance_delta: AtomicI64,
}

impl PermitPool {
    pub fn new(min_workers: usize, max_workers: usize) -> Arc<Self> {
        let initial = min_workers.max(1);
        Arc::new(Self {
            semaphore: Semaphore::new(initial),
            min_workers: min_workers.max(1),
            max_workers: max_workers.max(min_workers.max(1)),
            current_capacity: AtomicUsize::new(initial),
            last_rebalance_delta: AtomicI64::new(0),
        })
    }

    pub fn capacity(&self) -> usize {
        self.current_capacity.load(Ordering::Relaxed)
    }

    pub async fn acquire(&self) -> SemaphorePermit<'_> {
        self.semaphore
            .acquire()
            .await
            .expect("permit pool semaphore is never closed")
    }

    /// Adaptation rule, evaluated roughly every 5s by the caller: shrink by one when
    /// the outbox is backed up or uploads are failing, grow by one when latency is
    /// healthy and the outbox is empty, otherwise hold steady.
    pub fn rebalance(&self, outbox_size: u64, outbox_high_watermark: u64, error_rate: f64, latency_is_healthy: bool) {
        let delta = if outbox_size > outbox_high_watermark || error_rate > 0.10 {
            -1
        } else if latency_is_healthy && outbox_size == 0 {
            1
        } else {
            0
        };
        self.last_rebalance_delta.store(delta, Ordering::Relaxed);
        if delta == 0 {
            return;
        }
        let current = self.current_capacity.load(Ordering::Relaxed);
        let next = if delta > 0 {
            (current + 1).min(self.max_workers)
        } else {
            current.saturating_sub(1).max(self.min_workers)
        };
        if next == current {
            return;
        }
        if next > current {
            self.semaphore.add_permits(next - current);
        } else {
            // Permits already checked out continue to run; future acquires simply
            // see fewer available until enough are released to reach `next`.
            self.semaphore.forget_permits(current - next);
        }
        self.current_capacity.store(next, Ordering::Relaxed);
    }
}

/// `[start, end)` local-time window, local-time wrap-around supported (e.g.
/// `22:00..06:00`).
#[derive(Debug, Clone, Copy)]
pub struct OffPeakWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl OffPeakWindow {
    pub fn contains_now(&self) -> bool {
        self.contains(Local::now().time())
    }

    pub fn contains(&self, now: NaiveTime) -> bool {
        if self.start <= self.end {
            now >= self.start && now < self.end
        } else {
            now >= self.start || now < self.end
        }
    }
}

pub fn parse_hhmm(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M").ok().or_else(|| {
        let mut parts = s.split(':');
        let hour: u32 = parts.next()?.parse().ok()?;
        let minute: u32 = parts.next()?.parse().ok()?;
        NaiveTime::from_hms_opt(hour.min(23), minute.min(59), 0)
    })
}

pub const REBALANCE_INTERVAL: Duration = Duration::from_secs(5);
