//! Candle aggregation
//!
//! Folds each tick into every configured granularity's window. Per
//! granularity the decision is made against the window head under the
//! store's per-key lock:
//!
//! - same bucket as the head: fold the price into the head
//! - newer bucket (or empty window): prepend a fresh candle, trim the tail
//! - older bucket than the head: leave the window alone (stale tick)
//!
//! Granularities are processed independently. A storage failure or an
//! unsupported configured granularity is recorded in the report and the
//! remaining granularities still run.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use types::candle::Candle;
use types::errors::{GranularityError, TickError};
use types::granularity::Granularity;
use types::ids::InstrumentCode;
use types::numeric::round_price;
use types::tick::Tick;

use crate::bucket::BucketKeyResolver;
use crate::config::{ConfigError, EngineConfig, PriceSource};
use crate::directory::InstrumentDirectory;
use crate::metrics::EngineMetrics;
use crate::store::{CandleStore, HeadWrite, StoreError, WindowKey};

/// What happened to one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WindowOutcome {
    /// A new head candle was prepended.
    Created { evicted: usize },
    /// The head candle absorbed the tick.
    Updated,
    /// The tick belongs to a bucket older than the head; nothing written.
    Stale,
}

/// Why one granularity could not be processed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GranularityFailure {
    #[error("invalid granularity: {0}")]
    InvalidGranularity(#[from] GranularityError),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[from] StoreError),

    #[error("bucket key unresolvable: {0}")]
    Unresolvable(TickError),
}

/// Outcome of one configured granularity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GranularityResult {
    /// Granularity label, or the raw configured value if it is unsupported.
    pub granularity: String,
    pub result: Result<WindowOutcome, GranularityFailure>,
}

/// Per-granularity report for one ingested tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub code: InstrumentCode,
    pub timestamp: i64,
    pub results: Vec<GranularityResult>,
}

impl IngestReport {
    /// Whether every granularity succeeded.
    pub fn is_complete(&self) -> bool {
        self.results.iter().all(|r| r.result.is_ok())
    }

    pub fn succeeded(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| r.result.is_ok())
            .map(|r| r.granularity.as_str())
            .collect()
    }

    pub fn failed(&self) -> Vec<(&str, &GranularityFailure)> {
        self.results
            .iter()
            .filter_map(|r| r.result.as_ref().err().map(|e| (r.granularity.as_str(), e)))
            .collect()
    }

    /// Whether a failure other than an unsupported configured
    /// granularity occurred.
    pub fn has_runtime_failure(&self) -> bool {
        self.failed()
            .iter()
            .any(|(_, failure)| !matches!(failure, GranularityFailure::InvalidGranularity(_)))
    }

    /// Outcome for a supported granularity, if it is configured.
    pub fn outcome(&self, granularity: Granularity) -> Option<&Result<WindowOutcome, GranularityFailure>> {
        self.results
            .iter()
            .find(|r| r.granularity == granularity.label())
            .map(|r| &r.result)
    }
}

impl fmt::Display for IngestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}: {} ok, {} failed",
            self.code,
            self.timestamp,
            self.succeeded().len(),
            self.failed().len()
        )
    }
}

/// Errors returned by `CandleAggregator::ingest`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IngestError {
    /// The tick was rejected before any write.
    #[error("invalid tick: {0}")]
    InvalidTick(#[from] TickError),

    /// Some granularities failed; the report says which.
    #[error("ingest incomplete: {0}")]
    Partial(IngestReport),
}

/// Orchestrates tick ingestion across granularities.
pub struct CandleAggregator {
    store: Arc<dyn CandleStore>,
    resolver: BucketKeyResolver,
    granularities: Vec<(String, Result<Granularity, GranularityError>)>,
    price_source: PriceSource,
    capacity: usize,
    directory: Option<Arc<dyn InstrumentDirectory>>,
    metrics: Arc<EngineMetrics>,
}

impl CandleAggregator {
    /// Build an aggregator over `store`.
    ///
    /// Unsupported granularity strings are logged here and reported on
    /// every ingest; they do not prevent construction.
    pub fn new(config: &EngineConfig, store: Arc<dyn CandleStore>) -> Result<Self, ConfigError> {
        config.validate()?;
        let resolver = config.resolver()?;

        let granularities: Vec<(String, Result<Granularity, GranularityError>)> = config
            .granularities
            .iter()
            .map(|raw| {
                let parsed = raw.parse::<Granularity>();
                match &parsed {
                    Ok(g) => (g.label().to_string(), parsed),
                    Err(err) => {
                        error!(value = %raw, error = %err, "Unsupported granularity configured");
                        (raw.clone(), parsed)
                    }
                }
            })
            .collect();

        info!(
            granularities = granularities.len(),
            capacity = config.window_capacity,
            price_source = ?config.price_source,
            utc_offset_seconds = config.utc_offset_seconds,
            "CandleAggregator initialized"
        );

        Ok(Self {
            store,
            resolver,
            granularities,
            price_source: config.price_source,
            capacity: config.window_capacity,
            directory: None,
            metrics: Arc::new(EngineMetrics::new()),
        })
    }

    /// Use `directory` for ticks that arrive without a price precision.
    pub fn with_directory(mut self, directory: Arc<dyn InstrumentDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Share a metrics registry with other components.
    pub fn with_metrics(mut self, metrics: Arc<EngineMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<EngineMetrics> {
        &self.metrics
    }

    pub fn resolver(&self) -> &BucketKeyResolver {
        &self.resolver
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Supported granularities this aggregator maintains.
    pub fn granularities(&self) -> Vec<Granularity> {
        self.granularities
            .iter()
            .filter_map(|(_, g)| g.as_ref().ok().copied())
            .collect()
    }

    /// Reject ticks that cannot be placed in time.
    pub fn validate(&self, tick: &Tick) -> Result<(), TickError> {
        tick.validate()?;
        self.resolver.check_time(tick.time.as_deref(), tick.timestamp)?;
        // the timestamp must be representable on the calendar
        self.resolver.format(tick.timestamp)?;
        Ok(())
    }

    /// The candle price for a tick: the configured quote side rounded to
    /// the instrument's precision, or the last price when that is zero.
    pub fn select_price(&self, tick: &Tick) -> Decimal {
        let quoted = match self.price_source {
            PriceSource::Ask => tick.ask,
            PriceSource::Bid => tick.bid,
        };
        let digits = tick.digit.or_else(|| {
            self.directory
                .as_ref()
                .and_then(|d| d.price_digits(&tick.code))
        });
        let rounded = match digits {
            Some(digits) => round_price(quoted, digits),
            None => quoted,
        };
        if rounded.is_zero() {
            tick.price
        } else {
            rounded
        }
    }

    /// Fold a tick into every configured granularity.
    ///
    /// Validation failures write nothing. Otherwise every granularity is
    /// attempted; if any fails the full report comes back in
    /// `IngestError::Partial`.
    pub fn ingest(&self, tick: &Tick) -> Result<IngestReport, IngestError> {
        let started = Instant::now();

        if let Err(err) = self.validate(tick) {
            self.metrics.record_tick_rejected();
            warn!(code = %tick.code, timestamp = tick.timestamp, error = %err, "Rejecting tick");
            return Err(IngestError::InvalidTick(err));
        }

        let price = self.select_price(tick);
        let results = self
            .granularities
            .iter()
            .map(|(label, granularity)| {
                let result = match granularity {
                    Ok(g) => self.apply_granularity(tick, price, *g),
                    Err(err) => {
                        self.metrics.record_granularity_failure();
                        Err(GranularityFailure::InvalidGranularity(err.clone()))
                    }
                };
                GranularityResult {
                    granularity: label.clone(),
                    result,
                }
            })
            .collect();

        let report = IngestReport {
            code: tick.code.clone(),
            timestamp: tick.timestamp,
            results,
        };

        self.metrics
            .record_tick_accepted(started.elapsed().as_nanos() as u64);

        if report.is_complete() {
            Ok(report)
        } else {
            if report.has_runtime_failure() {
                warn!(report = %report, "Ingest incomplete");
            } else {
                // unsupported granularities were reported at construction
                debug!(report = %report, "Ingest skipped unsupported granularities");
            }
            Err(IngestError::Partial(report))
        }
    }

    /// Candles for one window, newest first, at most `limit` (and never
    /// more than the window capacity).
    pub fn load_candles(
        &self,
        code: &InstrumentCode,
        granularity: Granularity,
        limit: usize,
    ) -> Result<Vec<Candle>, StoreError> {
        let key = WindowKey::new(code.clone(), granularity);
        self.store.read_range(&key, limit.min(self.capacity))
    }

    fn apply_granularity(
        &self,
        tick: &Tick,
        price: Decimal,
        granularity: Granularity,
    ) -> Result<WindowOutcome, GranularityFailure> {
        let bucket = self
            .resolver
            .resolve(tick.timestamp, granularity)
            .map_err(GranularityFailure::Unresolvable)?;
        let key = WindowKey::new(tick.code.clone(), granularity);

        let mut outcome = WindowOutcome::Stale;
        let mut label_error = None;

        let written = self.store.apply(&key, self.capacity, &mut |head: Option<&Candle>| match head {
            Some(head) if head.bucket_start == bucket => {
                let mut candle = head.clone();
                candle.fold(price, tick.price, tick.volume, tick.wave);
                debug_assert!(candle.is_valid());
                outcome = WindowOutcome::Updated;
                HeadWrite::Replace(candle)
            }
            Some(head) if head.bucket_start > bucket => {
                outcome = WindowOutcome::Stale;
                HeadWrite::Keep
            }
            _ => match self.resolver.format(bucket) {
                Ok(label) => {
                    outcome = WindowOutcome::Created { evicted: 0 };
                    HeadWrite::Prepend(Candle::open_at(
                        price,
                        tick.volume,
                        tick.wave,
                        bucket,
                        label,
                    ))
                }
                Err(err) => {
                    label_error = Some(err);
                    HeadWrite::Keep
                }
            },
        });

        let written = written.map_err(|err| {
            self.metrics.record_storage_failure();
            error!(key = %key, error = %err, "Window write failed");
            GranularityFailure::StorageUnavailable(err)
        })?;

        if let Some(err) = label_error {
            return Err(GranularityFailure::Unresolvable(err));
        }

        match outcome {
            WindowOutcome::Created { .. } => {
                self.metrics.record_candle_created(written.evicted);
                debug!(key = %key, bucket, len = written.len, "Opened bucket");
                Ok(WindowOutcome::Created {
                    evicted: written.evicted,
                })
            }
            WindowOutcome::Updated => {
                self.metrics.record_candle_updated();
                Ok(WindowOutcome::Updated)
            }
            WindowOutcome::Stale => {
                self.metrics.record_stale_tick();
                debug!(key = %key, bucket, "Dropping tick older than window head");
                Ok(WindowOutcome::Stale)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::StaticDirectory;
    use crate::store::InMemoryCandleStore;
    use std::str::FromStr;

    // 2023-11-14 22:13:20 UTC
    const TS: i64 = 1_700_000_000;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn code() -> InstrumentCode {
        InstrumentCode::new("rb2405")
    }

    fn tick_at(timestamp: i64, ask: &str) -> Tick {
        Tick::new(code(), timestamp, dec(ask))
    }

    fn aggregator_with(granularities: &[&str]) -> CandleAggregator {
        let config = EngineConfig {
            granularities: granularities.iter().map(|g| g.to_string()).collect(),
            ..EngineConfig::default()
        };
        CandleAggregator::new(&config, Arc::new(InMemoryCandleStore::new())).unwrap()
    }

    fn head(agg: &CandleAggregator, g: Granularity) -> Candle {
        agg.load_candles(&code(), g, 1).unwrap().remove(0)
    }

    #[test]
    fn test_first_tick_opens_all_windows() {
        let agg = CandleAggregator::new(&EngineConfig::default(), Arc::new(InMemoryCandleStore::new()))
            .unwrap();

        let report = agg.ingest(&tick_at(TS, "3521")).unwrap();
        assert_eq!(report.results.len(), 12);
        for g in Granularity::ALL {
            assert_eq!(
                report.outcome(g),
                Some(&Ok(WindowOutcome::Created { evicted: 0 }))
            );
            let candle = head(&agg, g);
            assert_eq!(candle.open, dec("3521"));
            assert_eq!(candle.close, dec("3521"));
        }
    }

    #[test]
    fn test_same_bucket_folds() {
        let agg = aggregator_with(&["5m"]);
        agg.ingest(&tick_at(TS, "3521")).unwrap();
        agg.ingest(&tick_at(TS + 10, "3530")).unwrap();
        agg.ingest(&tick_at(TS + 20, "3515")).unwrap();
        let report = agg.ingest(&tick_at(TS + 30, "3524")).unwrap();

        assert_eq!(report.outcome(Granularity::M5), Some(&Ok(WindowOutcome::Updated)));
        let candle = head(&agg, Granularity::M5);
        assert_eq!(candle.open, dec("3521"));
        assert_eq!(candle.high, dec("3530"));
        assert_eq!(candle.low, dec("3515"));
        assert_eq!(candle.close, dec("3524"));
        assert_eq!(candle.bucket_label, "2023-11-14 22:10:00");
        assert_eq!(agg.load_candles(&code(), Granularity::M5, 10).unwrap().len(), 1);
    }

    #[test]
    fn test_new_bucket_demotes_head() {
        let agg = aggregator_with(&["5m"]);
        agg.ingest(&tick_at(TS, "3521")).unwrap();
        // 22:15:01
        let report = agg.ingest(&tick_at(TS + 101, "3540")).unwrap();

        assert_eq!(
            report.outcome(Granularity::M5),
            Some(&Ok(WindowOutcome::Created { evicted: 0 }))
        );
        let candles = agg.load_candles(&code(), Granularity::M5, 10).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].bucket_label, "2023-11-14 22:15:00");
        assert_eq!(candles[0].open, dec("3540"));
        assert_eq!(candles[1].bucket_label, "2023-11-14 22:10:00");
        assert_eq!(candles[1].close, dec("3521"));
    }

    #[test]
    fn test_stale_tick_leaves_window_untouched() {
        let agg = aggregator_with(&["1m"]);
        agg.ingest(&tick_at(TS, "3521")).unwrap();
        agg.ingest(&tick_at(TS + 60, "3525")).unwrap();

        let before = agg.load_candles(&code(), Granularity::M1, 10).unwrap();
        let report = agg.ingest(&tick_at(TS + 1, "3000")).unwrap();
        assert_eq!(report.outcome(Granularity::M1), Some(&Ok(WindowOutcome::Stale)));
        assert_eq!(agg.load_candles(&code(), Granularity::M1, 10).unwrap(), before);
        assert_eq!(agg.metrics().export()["stale_ticks"], 1);
    }

    #[test]
    fn test_price_source_and_rounding() {
        let config = EngineConfig {
            price_source: PriceSource::Bid,
            granularities: vec!["1m".to_string()],
            ..EngineConfig::default()
        };
        let agg = CandleAggregator::new(&config, Arc::new(InMemoryCandleStore::new())).unwrap();

        let tick = Tick::new(code(), TS, dec("75.31"))
            .with_quote(dec("75.305"), dec("75.35"))
            .with_digit(2);
        assert_eq!(agg.select_price(&tick), dec("75.31"));
    }

    #[test]
    fn test_zero_quote_falls_back_to_last_price() {
        let agg = aggregator_with(&["1m"]);
        let tick = Tick::new(code(), TS, dec("3521")).with_quote(dec("3520"), Decimal::ZERO);
        assert_eq!(agg.select_price(&tick), dec("3521"));

        // rounds to zero at the instrument's precision
        let tick = Tick::new(code(), TS, dec("0.7"))
            .with_quote(dec("0.2"), dec("0.4"))
            .with_digit(0);
        assert_eq!(agg.select_price(&tick), dec("0.7"));
    }

    #[test]
    fn test_directory_supplies_missing_digits() {
        let directory = StaticDirectory::new().with(code(), 1);
        let agg = aggregator_with(&["1m"]).with_directory(Arc::new(directory));

        let tick = Tick::new(code(), TS, dec("3521")).with_quote(dec("3520"), dec("3521.26"));
        assert_eq!(agg.select_price(&tick), dec("3521.3"));

        let explicit = tick.clone().with_digit(2);
        assert_eq!(agg.select_price(&explicit), dec("3521.26"));
    }

    #[test]
    fn test_volume_and_wave_replaced() {
        let agg = aggregator_with(&["1h"]);
        agg.ingest(&tick_at(TS, "3521").with_volume(dec("10")).with_wave(dec("1")))
            .unwrap();
        agg.ingest(&tick_at(TS + 5, "3522").with_volume(dec("14")).with_wave(dec("-2")))
            .unwrap();

        let candle = head(&agg, Granularity::H1);
        assert_eq!(candle.volume, dec("14"));
        assert_eq!(candle.wave, dec("-2"));
    }

    #[test]
    fn test_invalid_tick_writes_nothing() {
        let agg = aggregator_with(&["1m", "day"]);
        let bad = tick_at(TS, "3521").with_time("2023-11-14 22:13:21");

        match agg.ingest(&bad) {
            Err(IngestError::InvalidTick(TickError::TimeMismatch { .. })) => {}
            other => panic!("Expected TimeMismatch, got {:?}", other),
        }
        assert!(agg.load_candles(&code(), Granularity::M1, 10).unwrap().is_empty());
        assert_eq!(agg.metrics().export()["ticks_rejected"], 1);

        let bad = tick_at(-5, "3521");
        assert!(matches!(
            agg.ingest(&bad),
            Err(IngestError::InvalidTick(TickError::InvalidTimestamp(-5)))
        ));
    }

    #[test]
    fn test_matching_formatted_time_accepted() {
        let agg = aggregator_with(&["1m"]);
        let tick = tick_at(TS, "3521").with_time("2023-11-14 22:13:20");
        assert!(agg.ingest(&tick).is_ok());
    }

    #[test]
    fn test_unsupported_granularity_isolated() {
        let agg = aggregator_with(&["5", "7", "day"]);
        assert_eq!(agg.granularities(), vec![Granularity::M5, Granularity::Day]);

        let report = match agg.ingest(&tick_at(TS, "3521")) {
            Err(IngestError::Partial(report)) => report,
            other => panic!("Expected Partial, got {:?}", other),
        };
        assert_eq!(report.succeeded(), vec!["5m", "day"]);
        let failed = report.failed();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].0, "7");
        assert!(matches!(failed[0].1, GranularityFailure::InvalidGranularity(_)));

        assert_eq!(agg.load_candles(&code(), Granularity::M5, 10).unwrap().len(), 1);
        assert_eq!(agg.load_candles(&code(), Granularity::Day, 10).unwrap().len(), 1);
        // a static config defect is not a runtime failure
        assert!(!report.has_runtime_failure());
    }

    #[test]
    fn test_window_capacity_enforced() {
        let config = EngineConfig {
            window_capacity: 3,
            granularities: vec!["1m".to_string()],
            ..EngineConfig::default()
        };
        let agg = CandleAggregator::new(&config, Arc::new(InMemoryCandleStore::new())).unwrap();

        let mut evicted = 0;
        for minute in 0..5 {
            let report = agg.ingest(&tick_at(TS + minute * 60, "3521")).unwrap();
            if let Some(Ok(WindowOutcome::Created { evicted: n })) = report.outcome(Granularity::M1) {
                evicted += n;
            }
        }
        assert_eq!(evicted, 2);
        let candles = agg.load_candles(&code(), Granularity::M1, 500).unwrap();
        assert_eq!(candles.len(), 3);
        // oldest survivor is the third minute
        assert_eq!(candles[2].bucket_start, 1_700_000_100);
        assert_eq!(candles[0].bucket_start, 1_700_000_220);
    }

    #[test]
    fn test_load_candles_limit_capped() {
        let agg = aggregator_with(&["1m"]);
        for minute in 0..4 {
            agg.ingest(&tick_at(TS + minute * 60, "3521")).unwrap();
        }
        assert_eq!(agg.load_candles(&code(), Granularity::M1, 2).unwrap().len(), 2);
        assert_eq!(agg.load_candles(&code(), Granularity::M1, usize::MAX).unwrap().len(), 4);
    }

    #[test]
    fn test_report_display() {
        let agg = aggregator_with(&["1m", "x"]);
        let err = agg.ingest(&tick_at(TS, "3521")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "ingest incomplete: rb2405@1700000000: 1 ok, 1 failed"
        );
    }
}
