//! Apply-cycle metrics for engine observability

use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;

use super::cache::CacheStats;

/// Engine counters since session start
#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineMetrics {
    /// Completed apply cycles (rebind, scoped apply, restriction commit/undo)
    pub apply_cycles: u64,

    /// Elements whose visibility was written
    pub elements_applied: u64,

    /// Calls that reached an authorizer
    pub authorizer_calls: u64,

    /// Per-cycle cache hits and misses, summed over all cycles
    pub cache_hits: u64,
    pub cache_misses: u64,

    /// Consistency violations detected
    pub consistency_violations: u64,

    /// Navigation attempts turned into a reroute
    pub redirects: u64,

    /// Latency of the last apply cycle and the running average
    pub last_apply_us: u64,
    pub avg_apply_us: f64,
}

impl EngineMetrics {
    /// Calculate cache hit rate
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }
}

/// Thread-safe metrics collector
#[derive(Debug, Default)]
pub struct MetricsCollector {
    metrics: RwLock<EngineMetrics>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finished apply cycle
    pub fn record_cycle(
        &self,
        elements: usize,
        authorizer_calls: usize,
        cache: CacheStats,
        latency: Duration,
    ) {
        let mut metrics = self.metrics.write();
        metrics.apply_cycles += 1;
        metrics.elements_applied += elements as u64;
        metrics.authorizer_calls += authorizer_calls as u64;
        metrics.cache_hits += cache.hits as u64;
        metrics.cache_misses += cache.misses as u64;

        let micros = latency.as_micros() as u64;
        metrics.last_apply_us = micros;
        let n = metrics.apply_cycles as f64;
        metrics.avg_apply_us += (micros as f64 - metrics.avg_apply_us) / n;
    }

    /// Record a detected consistency violation
    pub fn record_violation(&self) {
        self.metrics.write().consistency_violations += 1;
    }

    /// Record a navigation reroute
    pub fn record_redirect(&self) {
        self.metrics.write().redirects += 1;
    }

    /// Snapshot of the current counters
    pub fn snapshot(&self) -> EngineMetrics {
        self.metrics.read().clone()
    }
}
