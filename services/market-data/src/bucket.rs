//! Bucket key resolution
//!
//! Maps a tick time to the start of the bucket it belongs to for a given
//! granularity. All arithmetic is on epoch seconds shifted into the
//! exchange's wall clock (a fixed UTC offset); formatted strings are only
//! produced or parsed at the boundary.
//!
//! Intraday periods divide the hour (1m..30m) or the day (1h..4h) evenly,
//! so flooring the local epoch to the period length lands on the segment
//! boundary. Week, month and year follow the calendar.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc};
use types::errors::TickError;
use types::granularity::Granularity;
use types::tick::{parse_time, TIME_FORMAT};

const DAY_SECONDS: i64 = 86_400;

/// Stateless resolver of bucket-start timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketKeyResolver {
    offset: FixedOffset,
}

impl BucketKeyResolver {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    /// Resolver on UTC wall clock.
    pub fn utc() -> Self {
        Self::new(Utc.fix())
    }

    /// Resolver for a wall clock `seconds` east of UTC.
    ///
    /// Returns `None` when the offset is a day or more.
    pub fn with_offset_seconds(seconds: i32) -> Option<Self> {
        FixedOffset::east_opt(seconds).map(Self::new)
    }

    pub fn offset_seconds(&self) -> i32 {
        self.offset.local_minus_utc()
    }

    /// Start of the bucket containing `timestamp` (epoch seconds).
    pub fn resolve(&self, timestamp: i64, granularity: Granularity) -> Result<i64, TickError> {
        let local = self.to_local(timestamp)?;
        let start = match granularity {
            Granularity::Week => {
                // 1970-01-01 was a Thursday; shift so Monday is weekday 0
                let days = local.div_euclid(DAY_SECONDS);
                let since_monday = (days + 3).rem_euclid(7);
                (days - since_monday) * DAY_SECONDS
            }
            Granularity::Month => {
                let date = local_date(local, timestamp)?;
                month_start(date.year(), date.month(), timestamp)?
            }
            Granularity::Year => {
                let date = local_date(local, timestamp)?;
                month_start(date.year(), 1, timestamp)?
            }
            fixed => {
                let period = fixed
                    .fixed_seconds()
                    .ok_or(TickError::InvalidTimestamp(timestamp))?;
                local - local.rem_euclid(period)
            }
        };
        self.to_utc(start, timestamp)
    }

    /// Start of the bucket immediately preceding the one containing
    /// `timestamp`.
    pub fn previous(&self, timestamp: i64, granularity: Granularity) -> Result<i64, TickError> {
        let current = self.resolve(timestamp, granularity)?;
        let start = match granularity {
            Granularity::Month => {
                let date = local_date(self.to_local(current)?, timestamp)?;
                let (year, month) = if date.month() == 1 {
                    (date.year() - 1, 12)
                } else {
                    (date.year(), date.month() - 1)
                };
                self.to_utc(month_start(year, month, timestamp)?, timestamp)?
            }
            Granularity::Year => {
                let date = local_date(self.to_local(current)?, timestamp)?;
                self.to_utc(month_start(date.year() - 1, 1, timestamp)?, timestamp)?
            }
            fixed => {
                let period = fixed
                    .fixed_seconds()
                    .ok_or(TickError::InvalidTimestamp(timestamp))?;
                current
                    .checked_sub(period)
                    .ok_or(TickError::InvalidTimestamp(timestamp))?
            }
        };
        Ok(start)
    }

    /// Resolve from a feed-formatted timestamp.
    pub fn resolve_formatted(&self, time: &str, granularity: Granularity) -> Result<i64, TickError> {
        self.resolve(self.parse(time)?, granularity)
    }

    /// Epoch seconds of a feed-formatted wall-clock time.
    pub fn parse(&self, time: &str) -> Result<i64, TickError> {
        let naive = parse_time(time)?;
        self.offset
            .from_local_datetime(&naive)
            .single()
            .map(|dt| dt.timestamp())
            .ok_or_else(|| TickError::MalformedTime(time.to_string()))
    }

    /// Wall-clock rendering of `timestamp` in the feed's format.
    pub fn format(&self, timestamp: i64) -> Result<String, TickError> {
        self.offset
            .timestamp_opt(timestamp, 0)
            .single()
            .map(|dt| dt.format(TIME_FORMAT).to_string())
            .ok_or(TickError::InvalidTimestamp(timestamp))
    }

    /// Check that a tick's formatted time, when present, names the same
    /// instant as its epoch timestamp.
    pub fn check_time(&self, time: Option<&str>, timestamp: i64) -> Result<(), TickError> {
        match time {
            Some(time) if self.parse(time)? != timestamp => Err(TickError::TimeMismatch {
                time: time.to_string(),
                timestamp,
            }),
            _ => Ok(()),
        }
    }

    fn to_local(&self, timestamp: i64) -> Result<i64, TickError> {
        timestamp
            .checked_add(i64::from(self.offset_seconds()))
            .ok_or(TickError::InvalidTimestamp(timestamp))
    }

    fn to_utc(&self, local: i64, original: i64) -> Result<i64, TickError> {
        local
            .checked_sub(i64::from(self.offset_seconds()))
            .ok_or(TickError::InvalidTimestamp(original))
    }
}

impl Default for BucketKeyResolver {
    fn default() -> Self {
        Self::utc()
    }
}

/// Calendar date of a local epoch value.
fn local_date(local: i64, original: i64) -> Result<NaiveDate, TickError> {
    DateTime::from_timestamp(local, 0)
        .map(|dt| dt.date_naive())
        .ok_or(TickError::InvalidTimestamp(original))
}

/// Local epoch of midnight on the first day of `year`-`month`.
fn month_start(year: i32, month: u32, original: i64) -> Result<i64, TickError> {
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt: NaiveDateTime| dt.and_utc().timestamp())
        .ok_or(TickError::InvalidTimestamp(original))
}
