//! Candle granularities
//!
//! Twelve fixed periods. Intraday periods are expressed in minutes and
//! aligned by integer arithmetic; calendar periods (week, month, year)
//! follow the calendar and have no fixed length.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::GranularityError;

/// Supported candle granularities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Granularity {
    /// 1 minute
    M1,
    /// 5 minutes
    M5,
    /// 10 minutes
    M10,
    /// 15 minutes
    M15,
    /// 30 minutes
    M30,
    /// 1 hour
    H1,
    /// 2 hours
    H2,
    /// 4 hours
    H4,
    /// Calendar day
    Day,
    /// Calendar week starting Monday
    Week,
    /// Calendar month
    Month,
    /// Calendar year
    Year,
}

impl Granularity {
    /// All granularities, finest first.
    pub const ALL: [Granularity; 12] = [
        Granularity::M1,
        Granularity::M5,
        Granularity::M10,
        Granularity::M15,
        Granularity::M30,
        Granularity::H1,
        Granularity::H2,
        Granularity::H4,
        Granularity::Day,
        Granularity::Week,
        Granularity::Month,
        Granularity::Year,
    ];

    /// Period length in minutes for intraday granularities.
    pub fn minutes(&self) -> Option<i64> {
        match self {
            Granularity::M1 => Some(1),
            Granularity::M5 => Some(5),
            Granularity::M10 => Some(10),
            Granularity::M15 => Some(15),
            Granularity::M30 => Some(30),
            Granularity::H1 => Some(60),
            Granularity::H2 => Some(120),
            Granularity::H4 => Some(240),
            Granularity::Day | Granularity::Week | Granularity::Month | Granularity::Year => None,
        }
    }

    /// Fixed period length in seconds. Month and year have none.
    pub fn fixed_seconds(&self) -> Option<i64> {
        match self {
            Granularity::Day => Some(86_400),
            Granularity::Week => Some(7 * 86_400),
            Granularity::Month | Granularity::Year => None,
            intraday => intraday.minutes().map(|m| m * 60),
        }
    }

    /// Short label used in storage keys and on the wire.
    pub fn label(&self) -> &'static str {
        match self {
            Granularity::M1 => "1m",
            Granularity::M5 => "5m",
            Granularity::M10 => "10m",
            Granularity::M15 => "15m",
            Granularity::M30 => "30m",
            Granularity::H1 => "1h",
            Granularity::H2 => "2h",
            Granularity::H4 => "4h",
            Granularity::Day => "day",
            Granularity::Week => "week",
            Granularity::Month => "month",
            Granularity::Year => "year",
        }
    }
}

impl FromStr for Granularity {
    type Err = GranularityError;

    /// Accepts labels (`"5m"`, `"4h"`, `"day"`), bare minute counts as the
    /// feed configuration writes them (`"5"`, `"240"`), and a few aliases.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let granularity = match value.trim() {
            "1" | "1m" | "1min" => Granularity::M1,
            "5" | "5m" | "5min" => Granularity::M5,
            "10" | "10m" | "10min" => Granularity::M10,
            "15" | "15m" | "15min" => Granularity::M15,
            "30" | "30m" | "30min" => Granularity::M30,
            "60" | "1h" | "1hour" => Granularity::H1,
            "120" | "2h" | "2hour" => Granularity::H2,
            "240" | "4h" | "4hour" => Granularity::H4,
            "day" | "1d" => Granularity::Day,
            "week" | "1w" => Granularity::Week,
            "month" | "1mo" => Granularity::Month,
            "year" | "1y" => Granularity::Year,
            _ => return Err(GranularityError::new(value)),
        };
        Ok(granularity)
    }
}

impl TryFrom<String> for Granularity {
    type Error = GranularityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Granularity> for String {
    fn from(granularity: Granularity) -> Self {
        granularity.label().to_string()
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
