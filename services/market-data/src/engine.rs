//! Tick entry point
//!
//! `QuoteEngine` pairs the candle aggregator with the ticket store. A
//! rejected tick touches neither. An accepted tick always updates the
//! ticket, even when some candle windows could not be written.

use std::sync::Arc;

use tracing::{debug, info};
use types::candle::Candle;
use types::errors::TickError;
use types::granularity::Granularity;
use types::ids::InstrumentCode;
use types::tick::{RawTick, Tick};

use crate::aggregator::{CandleAggregator, IngestError, IngestReport, WindowOutcome};
use crate::config::{ConfigError, EngineConfig};
use crate::directory::InstrumentDirectory;
use crate::metrics::EngineMetrics;
use crate::store::{CandleStore, InMemoryCandleStore, StoreError};
use crate::ticket::{TicketChange, TicketStore, TicketView};

/// Everything one accepted tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickOutcome {
    pub ticket: TicketChange,
    pub report: IngestReport,
}

impl TickOutcome {
    /// Granularities whose head candle was created or updated.
    pub fn touched(&self) -> Vec<Granularity> {
        self.report
            .results
            .iter()
            .filter(|r| matches!(r.result, Ok(WindowOutcome::Created { .. }) | Ok(WindowOutcome::Updated)))
            .filter_map(|r| r.granularity.parse().ok())
            .collect()
    }
}

pub struct QuoteEngine {
    aggregator: CandleAggregator,
    tickets: TicketStore,
    metrics: Arc<EngineMetrics>,
    dispatch_buffer: usize,
}

impl QuoteEngine {
    pub fn new(config: &EngineConfig, store: Arc<dyn CandleStore>) -> Result<Self, ConfigError> {
        let metrics = Arc::new(EngineMetrics::new());
        let aggregator = CandleAggregator::new(config, store)?.with_metrics(Arc::clone(&metrics));
        info!("QuoteEngine initialized");
        Ok(Self {
            aggregator,
            tickets: TicketStore::new(),
            metrics,
            dispatch_buffer: config.dispatch_buffer,
        })
    }

    /// Engine over a fresh process-local candle store.
    pub fn in_memory(config: &EngineConfig) -> Result<Self, ConfigError> {
        Self::new(config, Arc::new(InMemoryCandleStore::new()))
    }

    pub fn with_directory(mut self, directory: Arc<dyn InstrumentDirectory>) -> Self {
        self.aggregator = self.aggregator.with_directory(directory);
        self
    }

    pub fn metrics(&self) -> &Arc<EngineMetrics> {
        &self.metrics
    }

    /// Inbound channel bound from the validated config.
    pub fn dispatch_buffer(&self) -> usize {
        self.dispatch_buffer
    }

    pub fn aggregator(&self) -> &CandleAggregator {
        &self.aggregator
    }

    /// Process one tick.
    ///
    /// `Err` means the tick was rejected and nothing was written. A tick
    /// with failed granularities is still `Ok`; inspect
    /// `report.is_complete()`.
    pub fn on_tick(&self, tick: &Tick) -> Result<TickOutcome, TickError> {
        let report = match self.aggregator.ingest(tick) {
            Ok(report) => report,
            Err(IngestError::Partial(report)) => report,
            Err(IngestError::InvalidTick(err)) => return Err(err),
        };

        let ticket = self.tickets.update(tick);
        self.metrics.record_ticket(ticket.is_changed());
        debug!(code = %tick.code, ticket = ?ticket, complete = report.is_complete(), "Tick processed");

        Ok(TickOutcome { ticket, report })
    }

    /// Validate a feed record and process it.
    pub fn on_raw(&self, raw: RawTick) -> Result<TickOutcome, TickError> {
        let tick = Tick::try_from(raw).map_err(|err| {
            self.metrics.record_tick_rejected();
            err
        })?;
        self.on_tick(&tick)
    }

    /// Up to `limit` candles for one window, newest first.
    pub fn load_candles(
        &self,
        code: &InstrumentCode,
        granularity: Granularity,
        limit: usize,
    ) -> Result<Vec<Candle>, StoreError> {
        self.aggregator.load_candles(code, granularity, limit)
    }

    /// One instrument's ticket, or every ticket when `code` is `None`.
    pub fn load_ticket(&self, code: Option<&InstrumentCode>) -> TicketView {
        self.tickets.load(code)
    }

    pub fn tickets(&self) -> &TicketStore {
        &self.tickets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    const TS: i64 = 1_700_000_000;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn engine() -> QuoteEngine {
        let config = EngineConfig {
            granularities: vec!["1m".to_string(), "5m".to_string()],
            ..EngineConfig::default()
        };
        QuoteEngine::in_memory(&config).unwrap()
    }

    #[test]
    fn test_tick_updates_candles_and_ticket() {
        let engine = engine();
        let code = InstrumentCode::new("rb2405");
        let outcome = engine.on_tick(&Tick::new(code.clone(), TS, dec("3521"))).unwrap();

        assert_eq!(outcome.ticket, TicketChange::Changed);
        assert!(outcome.report.is_complete());
        assert_eq!(outcome.touched(), vec![Granularity::M1, Granularity::M5]);
        assert_eq!(engine.load_candles(&code, Granularity::M5, 10).unwrap().len(), 1);

        match engine.load_ticket(Some(&code)) {
            TicketView::Single(Some(ticket)) => assert_eq!(ticket.price, dec("3521")),
            other => panic!("Expected ticket, got {:?}", other),
        }
    }

    #[test]
    fn test_repeat_quote_unchanged() {
        let engine = engine();
        let code = InstrumentCode::new("rb2405");
        engine.on_tick(&Tick::new(code.clone(), TS, dec("3521"))).unwrap();
        let outcome = engine.on_tick(&Tick::new(code, TS + 1, dec("3521"))).unwrap();
        assert_eq!(outcome.ticket, TicketChange::Unchanged);

        let exported = engine.metrics().export();
        assert_eq!(exported["tickets_changed"], 1);
        assert_eq!(exported["tickets_unchanged"], 1);
        assert_eq!(exported["candles_updated"], 2);
    }

    #[test]
    fn test_rejected_tick_writes_nothing() {
        let engine = engine();
        let code = InstrumentCode::new("rb2405");
        let bad = Tick::new(code.clone(), 0, dec("3521"));

        assert_eq!(engine.on_tick(&bad), Err(TickError::InvalidTimestamp(0)));
        assert!(engine.tickets().is_empty());
        assert!(engine.load_candles(&code, Granularity::M1, 10).unwrap().is_empty());
    }

    #[test]
    fn test_on_raw_requires_code() {
        let engine = engine();
        let raw = RawTick {
            timestamp: Some(TS),
            price: Some(dec("3521")),
            ..RawTick::default()
        };
        assert_eq!(engine.on_raw(raw), Err(TickError::MissingField("code")));
        assert_eq!(engine.metrics().export()["ticks_rejected"], 1);
    }

    #[test]
    fn test_stale_tick_not_touched() {
        let engine = engine();
        let code = InstrumentCode::new("rb2405");
        engine.on_tick(&Tick::new(code.clone(), TS + 120, dec("3521"))).unwrap();
        let outcome = engine.on_tick(&Tick::new(code, TS, dec("3500"))).unwrap();

        // 22:13 is behind the 22:15 head on both windows
        assert!(outcome.touched().is_empty());
        assert_eq!(outcome.ticket, TicketChange::Changed);
    }
}
