//! Latest-quote snapshots
//!
//! One `Ticket` per instrument, overwritten on every tick and never
//! historized.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ids::InstrumentCode;
use crate::tick::Tick;

/// Latest quote for an instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub code: InstrumentCode,
    pub price: Decimal,
    pub bid: Decimal,
    pub ask: Decimal,
    pub digit: Option<u32>,
    pub volume: Decimal,
    pub wave: Decimal,
    pub timestamp: i64,
    pub time: Option<String>,
}

impl Ticket {
    /// Whether `other` quotes the same price, bid and ask.
    ///
    /// Volume, wave and time are ignored: a quote that only moved in time
    /// is not a change worth notifying.
    pub fn same_quote(&self, other: &Ticket) -> bool {
        self.price == other.price && self.bid == other.bid && self.ask == other.ask
    }
}

impl From<&Tick> for Ticket {
    fn from(tick: &Tick) -> Self {
        Self {
            code: tick.code.clone(),
            price: tick.price,
            bid: tick.bid,
            ask: tick.ask,
            digit: tick.digit,
            volume: tick.volume,
            wave: tick.wave,
            timestamp: tick.timestamp,
            time: tick.time.clone(),
        }
    }
}
