//! Instrument metadata lookup
//!
//! The symbol table lives in the surrounding system's relational store.
//! The engine only ever asks one question of it: how many decimal places
//! does this instrument quote in.

use std::collections::HashMap;

use types::ids::InstrumentCode;

/// Price-precision lookup by instrument code.
pub trait InstrumentDirectory: Send + Sync {
    fn price_digits(&self, code: &InstrumentCode) -> Option<u32>;
}

/// Directory backed by a fixed map, loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    digits: HashMap<InstrumentCode, u32>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, code: InstrumentCode, digits: u32) -> Self {
        self.digits.insert(code, digits);
        self
    }

    pub fn insert(&mut self, code: InstrumentCode, digits: u32) {
        self.digits.insert(code, digits);
    }
}

impl FromIterator<(InstrumentCode, u32)> for StaticDirectory {
    fn from_iter<I: IntoIterator<Item = (InstrumentCode, u32)>>(iter: I) -> Self {
        Self {
            digits: iter.into_iter().collect(),
        }
    }
}

impl InstrumentDirectory for StaticDirectory {
    fn price_digits(&self, code: &InstrumentCode) -> Option<u32> {
        self.digits.get(code).copied()
    }
}
