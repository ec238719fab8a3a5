//! Identifier types for traded instruments
//!
//! Futures contracts are identified by their exchange code (e.g. `"rb2405"`,
//! `"CL"`). Codes are opaque; only emptiness and whitespace are rejected.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::errors::TickError;

/// Instrument identifier (futures contract code)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct InstrumentCode(String);

impl InstrumentCode {
    /// Create a new InstrumentCode
    ///
    /// # Panics
    /// Panics if the code is empty or contains whitespace
    pub fn new(code: impl Into<String>) -> Self {
        match Self::try_new(code) {
            Ok(code) => code,
            Err(err) => panic!("{err}"),
        }
    }

    /// Try to create an InstrumentCode, rejecting empty or whitespace codes
    pub fn try_new(code: impl Into<String>) -> Result<Self, TickError> {
        let s = code.into();
        if s.is_empty() || s.chars().any(char::is_whitespace) {
            return Err(TickError::InvalidCode(s));
        }
        Ok(Self(s))
    }

    /// Get the code string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for InstrumentCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::try_new(s).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for InstrumentCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<&str> for InstrumentCode {
    type Error = TickError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::try_new(s)
    }
}
