//! Types library for the candle aggregation engine
//!
//! This library provides the record definitions shared by the engine and its
//! consumers (push service, risk checks), keeping every field named and typed.
//!
//! # Modules
//! - `ids`: Instrument identifiers
//! - `numeric`: Fixed-precision price helpers
//! - `granularity`: The twelve candle periods
//! - `tick`: Incoming price updates and their validation
//! - `candle`: OHLC records
//! - `ticket`: Latest-quote snapshots
//! - `errors`: Error taxonomy

// Public modules
pub mod ids;
pub mod numeric;
pub mod granularity;
pub mod tick;
pub mod candle;
pub mod ticket;
pub mod errors;

// Library version constant
pub const LIB_VERSION: &str = "1.0.0";

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::candle::*;
    pub use crate::errors::*;
    pub use crate::granularity::*;
    pub use crate::ids::*;
    pub use crate::numeric::*;
    pub use crate::tick::*;
    pub use crate::ticket::*;
}
