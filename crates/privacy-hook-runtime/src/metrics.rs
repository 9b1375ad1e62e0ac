//! Counters for gate decisions.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Gate operation metrics (thread-safe counters).
#[derive(Debug, Default)]
pub struct GateMetrics {
    /// Calls answered from the cache without a consent check
    cache_hits: AtomicU64,
    /// Calls refused because consent was not granted
    denials: AtomicU64,
    /// Calls that reached the real accessor
    fetches: AtomicU64,
    /// Fetched values that were not stored (absent or empty)
    unstored: AtomicU64,
    /// Cache entries that held a value of another type
    type_mismatches: AtomicU64,
}

impl GateMetrics {
    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_denial(&self) {
        self.denials.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetch(&self) {
        self.fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unstored(&self) {
        self.unstored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_type_mismatch(&self) {
        self.type_mismatches.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of current metrics.
    pub fn snapshot(&self) -> GateMetricsSnapshot {
        GateMetricsSnapshot {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            denials: self.denials.load(Ordering::Relaxed),
            fetches: self.fetches.load(Ordering::Relaxed),
            unstored: self.unstored.load(Ordering::Relaxed),
            type_mismatches: self.type_mismatches.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters.
    pub fn reset(&self) {
        self.cache_hits.store(0, Ordering::Relaxed);
        self.denials.store(0, Ordering::Relaxed);
        self.fetches.store(0, Ordering::Relaxed);
        self.unstored.store(0, Ordering::Relaxed);
        self.type_mismatches.store(0, Ordering::Relaxed);
    }
}

/// Snapshot of metrics (for reporting).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateMetricsSnapshot {
    pub cache_hits: u64,
    pub denials: u64,
    pub fetches: u64,
    pub unstored: u64,
    pub type_mismatches: u64,
}

impl GateMetricsSnapshot {
    pub fn total_calls(&self) -> u64 {
        self.cache_hits + self.denials + self.fetches
    }

    /// Share of calls answered from the cache.
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.total_calls();
        if total == 0 {
            return 0.0;
        }
        self.cache_hits as f64 / total as f64
    }

    /// Format a human-readable report.
    pub fn format_report(&self) -> String {
        let mut lines = Vec::new();
        lines.push("Consent Gate Report".to_string());
        lines.push("=".repeat(50));
        lines.push(format!("  Cache hits:      {}", self.cache_hits));
        lines.push(format!("  Denied:          {}", self.denials));
        lines.push(format!("  Real fetches:    {}", self.fetches));
        lines.push(format!("  Not stored:      {}", self.unstored));
        lines.push(format!("  Type mismatches: {}", self.type_mismatches));
        lines.push(format!(
            "  Cache Hit Rate:  {:.1}%",
            self.cache_hit_rate() * 100.0
        ));
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_and_rate() {
        let metrics = GateMetrics::default();
        metrics.record_cache_hit();
        metrics.record_cache_hit();
        metrics.record_cache_hit();
        metrics.record_fetch();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_calls(), 4);
        assert!((snapshot.cache_hit_rate() - 0.75).abs() < f64::EPSILON);
        assert!(snapshot.format_report().contains("75.0%"));

        metrics.reset();
        assert_eq!(metrics.snapshot(), GateMetricsSnapshot::default());
        assert_eq!(GateMetricsSnapshot::default().cache_hit_rate(), 0.0);
    }
}
