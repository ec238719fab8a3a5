//! Incoming price ticks
//!
//! A `RawTick` is what the feed delivers: every field optional, prices as
//! strings or numbers. `Tick::try_from(RawTick)` is the single validation
//! point; anything past it has a code, an epoch timestamp and non-negative
//! volume.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::TickError;
use crate::ids::InstrumentCode;

/// Format of the feed's formatted timestamps.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Tick as received from the feed, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTick {
    pub code: Option<String>,
    pub timestamp: Option<i64>,
    pub time: Option<String>,
    pub price: Option<Decimal>,
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
    pub digit: Option<u32>,
    pub volume: Option<Decimal>,
    pub wave: Option<Decimal>,
}

/// A validated price update for one instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tick {
    pub code: InstrumentCode,
    /// Epoch seconds; the canonical time of the tick
    pub timestamp: i64,
    /// Feed-formatted wall-clock time, if the feed sent one
    pub time: Option<String>,
    pub price: Decimal,
    pub bid: Decimal,
    pub ask: Decimal,
    /// Price precision; looked up by code when absent
    pub digit: Option<u32>,
    pub volume: Decimal,
    pub wave: Decimal,
}

impl Tick {
    /// Create a tick quoting `price` on both sides.
    pub fn new(code: InstrumentCode, timestamp: i64, price: Decimal) -> Self {
        Self {
            code,
            timestamp,
            time: None,
            price,
            bid: price,
            ask: price,
            digit: None,
            volume: Decimal::ZERO,
            wave: Decimal::ZERO,
        }
    }

    pub fn with_quote(mut self, bid: Decimal, ask: Decimal) -> Self {
        self.bid = bid;
        self.ask = ask;
        self
    }

    pub fn with_digit(mut self, digit: u32) -> Self {
        self.digit = Some(digit);
        self
    }

    pub fn with_volume(mut self, volume: Decimal) -> Self {
        self.volume = volume;
        self
    }

    pub fn with_wave(mut self, wave: Decimal) -> Self {
        self.wave = wave;
        self
    }

    pub fn with_time(mut self, time: impl Into<String>) -> Self {
        self.time = Some(time.into());
        self
    }

    /// Check the invariants a constructed (not deserialized-from-raw) tick
    /// must still satisfy.
    pub fn validate(&self) -> Result<(), TickError> {
        if self.timestamp <= 0 {
            return Err(TickError::InvalidTimestamp(self.timestamp));
        }
        if let Some(time) = &self.time {
            parse_time(time)?;
        }
        if self.volume < Decimal::ZERO {
            return Err(TickError::Negative {
                field: "volume",
                value: self.volume.to_string(),
            });
        }
        Ok(())
    }
}

impl TryFrom<RawTick> for Tick {
    type Error = TickError;

    fn try_from(raw: RawTick) -> Result<Self, Self::Error> {
        let code = raw.code.ok_or(TickError::MissingField("code"))?;
        let code = InstrumentCode::try_new(code)?;
        let timestamp = raw.timestamp.ok_or(TickError::MissingField("timestamp"))?;

        let tick = Tick {
            code,
            timestamp,
            time: raw.time,
            price: raw.price.unwrap_or(Decimal::ZERO),
            bid: raw.bid.unwrap_or(Decimal::ZERO),
            ask: raw.ask.unwrap_or(Decimal::ZERO),
            digit: raw.digit,
            volume: raw.volume.unwrap_or(Decimal::ZERO),
            wave: raw.wave.unwrap_or(Decimal::ZERO),
        };
        tick.validate()?;
        Ok(tick)
    }
}

/// Parse a feed-formatted timestamp (`YYYY-MM-DD HH:MM:SS`).
pub fn parse_time(time: &str) -> Result<NaiveDateTime, TickError> {
    NaiveDateTime::parse_from_str(time.trim(), TIME_FORMAT)
        .map_err(|_| TickError::MalformedTime(time.to_string()))
}
