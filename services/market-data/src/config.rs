//! Engine configuration
//!
//! Loaded from JSON by the process wiring; every field has a default so a
//! partial document is enough. Granularities are kept as the raw strings
//! the deployment wrote: an unsupported one is reported per granularity
//! at ingest time rather than refusing to start the engine.

use serde::{Deserialize, Serialize};
use types::granularity::Granularity;

use crate::bucket::BucketKeyResolver;
use crate::store::WINDOW_CAPACITY;

/// Which side of the quote feeds the candles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceSource {
    #[default]
    Ask,
    Bid,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("config parse error: {0}")]
    Parse(String),

    #[error("window capacity must be within 1..={max}, got {value}")]
    InvalidCapacity { value: usize, max: usize },

    #[error("utc offset must be within ±86399 seconds, got {0}")]
    InvalidOffset(i32),

    #[error("dispatch buffer must be positive")]
    InvalidDispatchBuffer,

    #[error("no granularities configured")]
    NoGranularities,
}

/// Configuration for the candle engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Candles retained per (instrument, granularity) window.
    pub window_capacity: usize,
    /// Quote side used as the candle price.
    pub price_source: PriceSource,
    /// Exchange wall clock, seconds east of UTC.
    pub utc_offset_seconds: i32,
    /// Granularities to maintain, as written in the deployment config.
    pub granularities: Vec<String>,
    /// Capacity of the dispatcher's inbound tick channel.
    pub dispatch_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window_capacity: WINDOW_CAPACITY,
            price_source: PriceSource::Ask,
            utc_offset_seconds: 0,
            granularities: Granularity::ALL.iter().map(|g| g.label().to_string()).collect(),
            dispatch_buffer: 10_000,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_capacity == 0 || self.window_capacity > WINDOW_CAPACITY {
            return Err(ConfigError::InvalidCapacity {
                value: self.window_capacity,
                max: WINDOW_CAPACITY,
            });
        }
        self.resolver()?;
        if self.dispatch_buffer == 0 {
            return Err(ConfigError::InvalidDispatchBuffer);
        }
        if self.granularities.is_empty() {
            return Err(ConfigError::NoGranularities);
        }
        Ok(())
    }

    /// Bucket resolver on the configured wall clock.
    pub fn resolver(&self) -> Result<BucketKeyResolver, ConfigError> {
        BucketKeyResolver::with_offset_seconds(self.utc_offset_seconds)
            .ok_or(ConfigError::InvalidOffset(self.utc_offset_seconds))
    }
}
