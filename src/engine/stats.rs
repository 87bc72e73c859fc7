// Service statistics: scrape outcomes, cache hit rates, remote portal calls.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Point-in-time view of the session manager, served by the health endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: &'static str,
    pub active_sessions: usize,
    pub in_flight: usize,
    pub success_count: u64,
    pub failure_count: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_hit_rate: f64,
    pub portal_calls: u64,
    pub held_credentials: usize,
}

pub struct StatsCollector {
    success_total: AtomicU64,
    failure_total: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    portal_calls: AtomicU64,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self {
            success_total: AtomicU64::new(0),
            failure_total: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            portal_calls: AtomicU64::new(0),
        }
    }

    pub fn record_success(&self) {
        self.success_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failure_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// One underlying portal attempt, retries included.
    pub fn record_portal_call(&self) {
        self.portal_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn portal_calls(&self) -> u64 {
        self.portal_calls.load(Ordering::Relaxed)
    }

    pub fn snapshot(
        &self,
        active_sessions: usize,
        in_flight: usize,
        held_credentials: usize,
    ) -> HealthReport {
        let hits = self.cache_hits.load(Ordering::Relaxed);
        let misses = self.cache_misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        let cache_hit_rate = if lookups > 0 {
            hits as f64 / lookups as f64
        } else {
            0.0
        };

        HealthReport {
            status: "ok",
            active_sessions,
            in_flight,
            success_count: self.success_total.load(Ordering::Relaxed),
            failure_count: self.failure_total.load(Ordering::Relaxed),
            cache_hits: hits,
            cache_misses: misses,
            cache_hit_rate,
            portal_calls: self.portal_calls(),
            held_credentials,
        }
    }
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}
