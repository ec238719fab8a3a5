//! Market Data Service
//!
//! Consumes futures price ticks and maintains:
//! - OHLC candles in twelve granularities, from one minute to one year
//! - A bounded sliding window of the newest candles per instrument and
//!   granularity
//! - The latest quote (ticket) per instrument, with change detection
//! - An async dispatcher that publishes changed quotes and candle heads
//!
//! # Architecture
//!
//! ```text
//!          Price Feed
//!              │
//!        ┌─────▼──────┐
//!        │ Dispatcher │  ← mpsc in, broadcast out
//!        └─────┬──────┘
//!              │
//!        ┌─────▼──────┐
//!        │QuoteEngine │  ← validates once, writes nothing on reject
//!        └──┬──────┬──┘
//!           │      │
//! ┌─────────▼──┐ ┌─▼──────────┐
//! │ Aggregator │ │TicketStore │
//! └─────┬──────┘ └────────────┘
//!       │  BucketKeyResolver
//! ┌─────▼──────┐
//! │CandleStore │  ← one lock per window
//! └────────────┘
//! ```

pub mod aggregator;
pub mod bucket;
pub mod config;
pub mod directory;
pub mod dispatcher;
pub mod engine;
pub mod metrics;
pub mod store;
pub mod ticket;

pub use aggregator::{CandleAggregator, GranularityFailure, IngestError, IngestReport, WindowOutcome};
pub use bucket::BucketKeyResolver;
pub use config::{EngineConfig, PriceSource};
pub use dispatcher::{DispatchStats, Dispatcher, QuoteUpdate};
pub use engine::{QuoteEngine, TickOutcome};
pub use store::{CandleStore, InMemoryCandleStore, StoreError, WindowKey, WINDOW_CAPACITY};
pub use ticket::{TicketChange, TicketStore, TicketView};

// Library version
pub const SERVICE_VERSION: &str = "0.1.0";
