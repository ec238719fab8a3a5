//! Property-based tests for candle aggregation
//!
//! Properties:
//! - Folding within one bucket yields last/max/min regardless of order
//! - Windows never exceed their capacity
//! - Bucket starts are strictly decreasing newest to oldest
//! - Bucket resolution is idempotent and contains the tick

use std::sync::Arc;

use market_data::bucket::BucketKeyResolver;
use market_data::config::EngineConfig;
use market_data::engine::QuoteEngine;
use market_data::store::{CandleStore, InMemoryCandleStore};
use proptest::prelude::*;
use rust_decimal::Decimal;
use types::granularity::Granularity;
use types::ids::InstrumentCode;
use types::tick::Tick;

// 2023-11-14 22:13:00 UTC, minute aligned
const MINUTE: i64 = 1_699_999_980;

fn code() -> InstrumentCode {
    InstrumentCode::new("rb2405")
}

fn engine_with_capacity(capacity: usize) -> (QuoteEngine, Arc<InMemoryCandleStore>) {
    let store = Arc::new(InMemoryCandleStore::new());
    let config = EngineConfig {
        window_capacity: capacity,
        granularities: vec!["1m".to_string(), "5m".to_string(), "1h".to_string()],
        ..EngineConfig::default()
    };
    let engine = QuoteEngine::new(&config, store.clone()).unwrap();
    (engine, store)
}

fn granularity_strategy() -> impl Strategy<Value = Granularity> {
    (0usize..12).prop_map(|i| Granularity::ALL[i])
}

proptest! {
    #[test]
    fn prop_fold_within_bucket(prices in prop::collection::vec(1i64..100_000, 1..40)) {
        let (engine, _) = engine_with_capacity(500);
        for (i, price) in prices.iter().enumerate() {
            let tick = Tick::new(code(), MINUTE + (i as i64 % 60), Decimal::new(*price, 2));
            engine.on_tick(&tick).unwrap();
        }

        let candles = engine.load_candles(&code(), Granularity::M1, 500).unwrap();
        prop_assert_eq!(candles.len(), 1);
        let candle = &candles[0];
        let max = prices.iter().copied().max().unwrap();
        let min = prices.iter().copied().min().unwrap();
        prop_assert_eq!(candle.open, Decimal::new(prices[0], 2));
        prop_assert_eq!(candle.close, Decimal::new(*prices.last().unwrap(), 2));
        prop_assert_eq!(candle.high, Decimal::new(max, 2));
        prop_assert_eq!(candle.low, Decimal::new(min, 2));
    }

    #[test]
    fn prop_fold_order_independent_extremes(mut prices in prop::collection::vec(1i64..10_000, 2..30)) {
        let (forward, _) = engine_with_capacity(500);
        let (reversed, _) = engine_with_capacity(500);
        for price in &prices {
            forward.on_tick(&Tick::new(code(), MINUTE, Decimal::from(*price))).unwrap();
        }
        prices.reverse();
        for price in &prices {
            reversed.on_tick(&Tick::new(code(), MINUTE, Decimal::from(*price))).unwrap();
        }

        let a = &forward.load_candles(&code(), Granularity::M1, 1).unwrap()[0];
        let b = &reversed.load_candles(&code(), Granularity::M1, 1).unwrap()[0];
        prop_assert_eq!(a.high, b.high);
        prop_assert_eq!(a.low, b.low);
    }

    #[test]
    fn prop_window_bounded_and_ordered(
        capacity in 1usize..20,
        offsets in prop::collection::vec(0i64..86_400, 1..200),
    ) {
        let (engine, store) = engine_with_capacity(capacity);
        for (i, offset) in offsets.iter().enumerate() {
            let tick = Tick::new(code(), MINUTE + offset, Decimal::from(100 + i as i64));
            engine.on_tick(&tick).unwrap();
        }

        for key in store.keys().unwrap() {
            let candles = store.read_range(&key, usize::MAX).unwrap();
            prop_assert!(candles.len() <= capacity);
            prop_assert!(!candles.is_empty());
            for pair in candles.windows(2) {
                prop_assert!(pair[0].bucket_start > pair[1].bucket_start);
            }
            for candle in &candles {
                prop_assert!(candle.is_valid());
            }
        }
    }

    #[test]
    fn prop_resolve_contains_tick(
        timestamp in 1i64..4_102_444_800,
        granularity in granularity_strategy(),
        offset_hours in -12i32..=14,
    ) {
        let resolver = BucketKeyResolver::with_offset_seconds(offset_hours * 3_600).unwrap();
        let start = resolver.resolve(timestamp, granularity).unwrap();
        prop_assert!(start <= timestamp);
        prop_assert_eq!(resolver.resolve(start, granularity).unwrap(), start);

        let previous = resolver.previous(timestamp, granularity).unwrap();
        prop_assert!(previous < start);
        prop_assert_eq!(resolver.resolve(start - 1, granularity).unwrap(), previous);
    }
}
