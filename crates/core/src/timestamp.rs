//! Hybrid-logical-clock timestamps.
//!
//! A [`Timestamp`] pairs a physical wall time (nanoseconds since the Unix epoch) with a
//! logical counter that orders events sharing the same wall time. Ordering is
//! lexicographic on `(wall_time, logical)`, so the zero value is the minimum.
//!
//! On the wire, resolved notifications carry timestamps as a decimal string
//! `<wall_time>.<logical>` where the fractional part is the logical counter padded to
//! ten digits, e.g. `1546300800000000000.0000000002`.

use core::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{FeedError, FeedResult};

const LOGICAL_DIGITS: usize = 10;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Timestamp {
    wall_time: i64,
    logical: u32,
}

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp {
        wall_time: 0,
        logical: 0,
    };

    pub const fn new(wall_time: i64, logical: u32) -> Self {
        Self { wall_time, logical }
    }

    pub fn wall_time(&self) -> i64 {
        self.wall_time
    }

    pub fn logical(&self) -> u32 {
        self.logical
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// Raises `self` to `other` if `other` is larger. Returns true if `self` changed.
    pub fn forward(&mut self, other: Timestamp) -> bool {
        if other > *self {
            *self = other;
            return true;
        }
        false
    }

    /// Converts a wall-clock time (e.g. a transaction timestamp) with a zero logical part.
    pub fn from_datetime(at: DateTime<Utc>) -> FeedResult<Self> {
        let nanos = at
            .timestamp_nanos_opt()
            .ok_or_else(|| FeedError::decode(format!("{at} is out of nanosecond range")))?;
        Ok(Self::new(nanos, 0))
    }

    pub fn to_datetime(&self) -> DateTime<Utc> {
        Utc.timestamp_nanos(self.wall_time)
    }

    /// Renders the wire decimal form.
    pub fn to_decimal(&self) -> String {
        format!("{}.{:0width$}", self.wall_time, self.logical, width = LOGICAL_DIGITS)
    }

    /// Parses the wire decimal form.
    ///
    /// The integral part is the wall time; the fractional part, scaled by 10^10, is the
    /// logical counter. Negative values, exponents and fractional parts that cannot be
    /// represented exactly are rejected.
    pub fn from_decimal(s: &str) -> FeedResult<Self> {
        let s = s.trim();
        if s.starts_with('-') {
            return Err(FeedError::decode(format!("timestamp {s:?} cannot be negative")));
        }
        let (integral, fractional) = s.split_once('.').unwrap_or((s, ""));
        if integral.is_empty() || !integral.bytes().all(|b| b.is_ascii_digit()) {
            return Err(FeedError::decode(format!("invalid timestamp {s:?}")));
        }
        if !fractional.bytes().all(|b| b.is_ascii_digit()) {
            return Err(FeedError::decode(format!("invalid timestamp {s:?}")));
        }

        let wall_time = integral
            .parse::<i64>()
            .map_err(|e| FeedError::decode(format!("converting timestamp {s:?}: {e}")))?;

        let significant = fractional.trim_end_matches('0');
        if significant.len() > LOGICAL_DIGITS {
            return Err(FeedError::decode(format!(
                "logical part of {s:?} has too many digits"
            )));
        }
        if significant.is_empty() {
            return Ok(Self::new(wall_time, 0));
        }
        let padded = format!("{significant:0<width$}", width = LOGICAL_DIGITS);
        let logical = padded
            .parse::<u64>()
            .ok()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| FeedError::decode(format!("logical part of {s:?} overflows")))?;

        Ok(Self::new(wall_time, logical))
    }
}

impl core::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.to_decimal())
    }
}

impl FromStr for Timestamp {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_decimal(s)
    }
}
