//! OHLC candle records
//!
//! A candle belongs to exactly one (instrument, granularity) window and is
//! identified inside it by `bucket_start`. Only the head of a window is
//! ever mutated.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::numeric::{max_of, min_of};

/// A single OHLC candle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub wave: Decimal,
    /// Bucket start, epoch seconds
    pub bucket_start: i64,
    /// Bucket start in the feed's wall-clock format
    pub bucket_label: String,
}

impl Candle {
    /// Open a new bucket at `price`.
    pub fn open_at(
        price: Decimal,
        volume: Decimal,
        wave: Decimal,
        bucket_start: i64,
        bucket_label: String,
    ) -> Self {
        Self {
            open: price,
            high: price,
            low: price,
            close: price,
            volume,
            wave,
            bucket_start,
            bucket_label,
        }
    }

    /// Fold a price into this candle.
    ///
    /// `fallback` replaces a low that comes out as zero, so a zero field on
    /// a candle opened without a usable price cannot drag the low to zero.
    /// Such a candle is re-opened at the first non-zero price. Volume and
    /// wave are snapshots from the feed and are replaced, not accumulated.
    pub fn fold(&mut self, price: Decimal, fallback: Decimal, volume: Decimal, wave: Decimal) {
        if self.open.is_zero() {
            self.open = price;
        }
        let fields = [self.open, self.high, self.low, self.close, price];
        self.close = price;
        self.high = max_of(&fields);
        let low = min_of(&fields);
        let low = if low.is_zero() { fallback } else { low };
        // keep low <= min(open, close) even when the fallback overshoots
        self.low = low.min(self.open).min(self.close);
        self.volume = volume;
        self.wave = wave;
    }

    /// OHLC integrity: high bounds open and close from above, low from below.
    pub fn is_valid(&self) -> bool {
        self.high >= self.open
            && self.high >= self.close
            && self.high >= self.low
            && self.low <= self.open
            && self.low <= self.close
    }
}
