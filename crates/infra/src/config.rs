//! Runtime configuration.
//!
//! All settings have defaults that match the sinks the readers are paired with, so an
//! empty environment yields a usable config. Values are read from `FEEDCHECK_*` variables:
//!
//! | variable | default |
//! |----------|---------|
//! | `FEEDCHECK_FLUSH_WAIT_MS` | `30` |
//! | `FEEDCHECK_MAILBOX_TABLE` | `sqlsink` |
//! | `FEEDCHECK_MAILBOX_PARTITIONS` | `0,1,2` |
//! | `FEEDCHECK_STREAM_BUFFER` | `1` |
//! | `FEEDCHECK_SINK_DIR` | unset |
//! | `FEEDCHECK_DATABASE_URL` | unset |
//! | `FEEDCHECK_JOB_ID` | unset |
//! | `FEEDCHECK_LOG_FORMAT` | `json` |

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use feedcheck_core::{FeedError, FeedResult, JobId};
use serde::{Deserialize, Serialize};

const PREFIX: &str = "FEEDCHECK_";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            other => Err(FeedError::config(format!(
                "LOG_FORMAT must be json or pretty, got {other:?}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedConfig {
    /// Upper bound on how long the job error gate waits for a flush notification.
    pub flush_wait: Duration,
    pub mailbox_table: String,
    pub mailbox_partitions: Vec<String>,
    /// Rows buffered between a streaming cursor and its reader.
    pub stream_buffer: usize,
    pub sink_dir: Option<PathBuf>,
    pub database_url: Option<String>,
    pub job_id: Option<JobId>,
    pub log_format: LogFormat,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            flush_wait: Duration::from_millis(30),
            mailbox_table: "sqlsink".to_string(),
            mailbox_partitions: vec!["0".to_string(), "1".to_string(), "2".to_string()],
            stream_buffer: 1,
            sink_dir: None,
            database_url: None,
            job_id: None,
            log_format: LogFormat::Json,
        }
    }
}

impl FeedConfig {
    /// Loads from the process environment.
    pub fn from_env() -> FeedResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads through `lookup`, which receives full variable names (`FEEDCHECK_...`).
    pub fn from_lookup<F>(lookup: F) -> FeedResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(&format!("{PREFIX}{name}"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut config = Self::default();

        if let Some(ms) = get("FLUSH_WAIT_MS") {
            config.flush_wait = Duration::from_millis(parse_number("FLUSH_WAIT_MS", &ms)?);
        }
        if let Some(table) = get("MAILBOX_TABLE") {
            config.mailbox_table = table;
        }
        if let Some(list) = get("MAILBOX_PARTITIONS") {
            config.mailbox_partitions = list
                .split(',')
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect();
        }
        if let Some(n) = get("STREAM_BUFFER") {
            config.stream_buffer = parse_number("STREAM_BUFFER", &n)?;
        }
        config.sink_dir = get("SINK_DIR").map(PathBuf::from);
        config.database_url = get("DATABASE_URL");
        config.job_id = get("JOB_ID").map(|id| id.parse()).transpose()?;
        if let Some(format) = get("LOG_FORMAT") {
            config.log_format = format.parse()?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> FeedResult<()> {
        if self.stream_buffer == 0 {
            return Err(FeedError::config("STREAM_BUFFER must be at least 1"));
        }
        if self.mailbox_partitions.is_empty() {
            return Err(FeedError::config("MAILBOX_PARTITIONS must not be empty"));
        }
        crate::pg::validate_identifier(&self.mailbox_table)?;
        Ok(())
    }
}

fn parse_number<T: FromStr>(name: &str, raw: &str) -> FeedResult<T>
where
    T::Err: core::fmt::Display,
{
    raw.parse()
        .map_err(|e| FeedError::config(format!("{name}={raw:?}: {e}")))
}
