//! Observability counters for the candle engine
//!
//! Atomic counters updated on the ingest path, an ingest latency window,
//! and threshold checks that turn counters into alerts. `export` yields a
//! flat map for Prometheus-style exposition.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tracing::warn;

/// Core metrics for the candle engine.
pub struct EngineMetrics {
    // Ingest
    pub ticks_accepted: AtomicU64,
    pub ticks_rejected: AtomicU64,
    pub ingest_latency_ns: Mutex<LatencyTracker>,

    // Windows
    pub candles_created: AtomicU64,
    pub candles_updated: AtomicU64,
    pub stale_ticks: AtomicU64,
    pub candles_evicted: AtomicU64,
    pub storage_failures: AtomicU64,
    pub granularity_failures: AtomicU64,

    // Tickets
    pub tickets_changed: AtomicU64,
    pub tickets_unchanged: AtomicU64,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self {
            ticks_accepted: AtomicU64::new(0),
            ticks_rejected: AtomicU64::new(0),
            ingest_latency_ns: Mutex::new(LatencyTracker::new(1000)),
            candles_created: AtomicU64::new(0),
            candles_updated: AtomicU64::new(0),
            stale_ticks: AtomicU64::new(0),
            candles_evicted: AtomicU64::new(0),
            storage_failures: AtomicU64::new(0),
            granularity_failures: AtomicU64::new(0),
            tickets_changed: AtomicU64::new(0),
            tickets_unchanged: AtomicU64::new(0),
        }
    }

    /// Record a tick that passed validation.
    pub fn record_tick_accepted(&self, latency_ns: u64) {
        self.ticks_accepted.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut tracker) = self.ingest_latency_ns.lock() {
            tracker.record(latency_ns);
        }
    }

    pub fn record_tick_rejected(&self) {
        self.ticks_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_candle_created(&self, evicted: usize) {
        self.candles_created.fetch_add(1, Ordering::Relaxed);
        self.candles_evicted.fetch_add(evicted as u64, Ordering::Relaxed);
    }

    pub fn record_candle_updated(&self) {
        self.candles_updated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stale_tick(&self) {
        self.stale_ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_storage_failure(&self) {
        self.storage_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_granularity_failure(&self) {
        self.granularity_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ticket(&self, changed: bool) {
        if changed {
            self.tickets_changed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.tickets_unchanged.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Check alert thresholds and generate alerts.
    pub fn check_thresholds(&self, thresholds: &AlertThresholds) -> Vec<Alert> {
        let mut alerts = Vec::new();

        let failures = self.storage_failures.load(Ordering::Relaxed);
        if failures > thresholds.max_storage_failures {
            alerts.push(Alert {
                level: AlertLevel::Critical,
                metric: "storage_failures".to_string(),
                message: format!(
                    "Storage failures: {} > threshold {}",
                    failures, thresholds.max_storage_failures
                ),
            });
        }

        let stale = self.stale_ticks.load(Ordering::Relaxed);
        if stale > thresholds.max_stale_ticks {
            alerts.push(Alert {
                level: AlertLevel::Warning,
                metric: "stale_ticks".to_string(),
                message: format!("Stale ticks: {} > threshold {}", stale, thresholds.max_stale_ticks),
            });
        }

        if let Ok(tracker) = self.ingest_latency_ns.lock() {
            if let Some(p99) = tracker.percentile(99) {
                if p99 > thresholds.max_ingest_p99_ns {
                    alerts.push(Alert {
                        level: AlertLevel::Warning,
                        metric: "ingest_p99".to_string(),
                        message: format!(
                            "Ingest p99: {}ns > threshold {}ns",
                            p99, thresholds.max_ingest_p99_ns
                        ),
                    });
                }
            }
        }

        for alert in &alerts {
            warn!(metric = %alert.metric, level = ?alert.level, "{}", alert.message);
        }

        alerts
    }

    /// Export metrics as a BTreeMap for Prometheus-style exposition.
    pub fn export(&self) -> BTreeMap<String, u64> {
        let counters = [
            ("ticks_accepted", &self.ticks_accepted),
            ("ticks_rejected", &self.ticks_rejected),
            ("candles_created", &self.candles_created),
            ("candles_updated", &self.candles_updated),
            ("stale_ticks", &self.stale_ticks),
            ("candles_evicted", &self.candles_evicted),
            ("storage_failures", &self.storage_failures),
            ("granularity_failures", &self.granularity_failures),
            ("tickets_changed", &self.tickets_changed),
            ("tickets_unchanged", &self.tickets_unchanged),
        ];
        counters
            .iter()
            .map(|(name, counter)| (name.to_string(), counter.load(Ordering::Relaxed)))
            .collect()
    }
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks latency samples for percentile calculation.
pub struct LatencyTracker {
    samples: VecDeque<u64>,
    max_samples: usize,
}

impl LatencyTracker {
    pub fn new(max_samples: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(max_samples),
            max_samples,
        }
    }

    /// Record a latency sample, dropping the oldest once full.
    pub fn record(&mut self, value: u64) {
        if self.samples.len() >= self.max_samples {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    /// Get a percentile value (0-100).
    pub fn percentile(&self, p: usize) -> Option<u64> {
        if self.samples.is_empty() {
            return None;
        }

        let mut sorted: Vec<u64> = self.samples.iter().copied().collect();
        sorted.sort_unstable();

        let idx = (p.min(100) * (sorted.len() - 1)) / 100;
        Some(sorted[idx])
    }

    pub fn count(&self) -> usize {
        self.samples.len()
    }
}

/// Alert severity level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertLevel {
    Warning,
    Critical,
}

/// An alert triggered by threshold breach.
#[derive(Debug, Clone)]
pub struct Alert {
    pub level: AlertLevel,
    pub metric: String,
    pub message: String,
}

/// Configurable alert thresholds.
#[derive(Debug, Clone)]
pub struct AlertThresholds {
    pub max_storage_failures: u64,
    pub max_stale_ticks: u64,
    /// Max ingest p99 latency in nanoseconds.
    pub max_ingest_p99_ns: u64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            max_storage_failures: 0,
            max_stale_ticks: 1_000,
            max_ingest_p99_ns: 1_000_000, // 1ms
        }
    }
}
