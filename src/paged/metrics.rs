//! Page Cache Metrics
//!
//! Lock-free counters describing how a paged listing is being served.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

/// Per-listing metrics collector
#[derive(Debug, Default)]
pub struct CacheMetrics {
    hits: AtomicU64,
    misses: AtomicU64,

    // Upstream traffic
    fetches: AtomicU64,
    fetch_latency_us: AtomicU64,

    // Revalidation
    probes: AtomicU64,
    probe_changes: AtomicU64,
    hard_invalidations: AtomicU64,
    invalidations: AtomicU64,

    page_size_confirmations: AtomicU64,
}

impl CacheMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetch(&self, latency: Duration) {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        self.update_latency_ema(&self.fetch_latency_us, latency);
    }

    pub fn record_probe(&self, changed: bool) {
        self.probes.fetch_add(1, Ordering::Relaxed);
        if changed {
            self.probe_changes.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_hard_invalidation(&self) {
        self.hard_invalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalidation(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_page_size_confirmation(&self) {
        self.page_size_confirmations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn fetches(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    pub fn probes(&self) -> u64 {
        self.probes.load(Ordering::Relaxed)
    }

    pub fn hit_ratio(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64;
        if total == 0.0 {
            0.0
        } else {
            hits / total
        }
    }

    pub fn fetch_latency(&self) -> Duration {
        Duration::from_micros(self.fetch_latency_us.load(Ordering::Relaxed))
    }

    fn update_latency_ema(&self, target: &AtomicU64, duration: Duration) {
        let new_us = duration.as_micros() as u64;
        let alpha = 0.1; // EMA smoothing factor

        loop {
            let current = target.load(Ordering::Relaxed);
            let updated = if current == 0 {
                new_us
            } else {
                ((1.0 - alpha) * current as f64 + alpha * new_us as f64) as u64
            };

            if target
                .compare_exchange_weak(current, updated, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                break;
            }
        }
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            hits: self.hits(),
            misses: self.misses(),
            hit_ratio: self.hit_ratio(),
            fetches: self.fetches(),
            fetch_latency_us: self.fetch_latency_us.load(Ordering::Relaxed),
            probes: self.probes(),
            probe_changes: self.probe_changes.load(Ordering::Relaxed),
            hard_invalidations: self.hard_invalidations.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            page_size_confirmations: self.page_size_confirmations.load(Ordering::Relaxed),
        }
    }
}

/// Serializable metrics snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub hit_ratio: f64,
    pub fetches: u64,
    pub fetch_latency_us: u64,
    pub probes: u64,
    pub probe_changes: u64,
    pub hard_invalidations: u64,
    pub invalidations: u64,
    pub page_size_confirmations: u64,
}

// =============================================================================
// Tests
// =============================================================================
