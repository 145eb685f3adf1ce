//! Strongly-typed identifiers.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::FeedError;

/// Identifier of the background job that produces a feed.
///
/// Jobs are addressed by the integer id their scheduler hands back on creation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(i64);

impl JobId {
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}

impl core::fmt::Display for JobId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<i64> for JobId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl FromStr for JobId {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(Self)
            .map_err(|e| FeedError::config(format!("JobId: {e}")))
    }
}

/// Identifier of one feed subscription (one reader instance).
///
/// Only used to correlate log lines; it carries no transport meaning.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeedId(Uuid);

impl FeedId {
    /// Uses UUIDv7 so ids sort by creation time in logs.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for FeedId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for FeedId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for FeedId {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = Uuid::from_str(s).map_err(|e| FeedError::config(format!("FeedId: {e}")))?;
        Ok(Self(uuid))
    }
}
