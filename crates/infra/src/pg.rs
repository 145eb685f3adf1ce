//! Shared helpers for the Postgres-backed collaborators.

use std::sync::LazyLock;

use feedcheck_core::{FeedError, FeedResult};
use regex::Regex;

static IDENTIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("valid identifier regex"));

/// Table names are interpolated into statements, so only plain identifiers are accepted.
pub(crate) fn validate_identifier(name: &str) -> FeedResult<()> {
    if IDENTIFIER_RE.is_match(name) {
        Ok(())
    } else {
        Err(FeedError::config(format!("{name:?} is not a valid table name")))
    }
}

pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> FeedError {
    match err {
        sqlx::Error::Database(db_err) => FeedError::transport(format!(
            "database error in {operation}: {}",
            db_err.message()
        )),
        sqlx::Error::PoolClosed => {
            FeedError::transport(format!("connection pool closed in {operation}"))
        }
        sqlx::Error::RowNotFound => {
            FeedError::transport(format!("unexpected row not found in {operation}"))
        }
        sqlx::Error::ColumnDecode { index, source } => FeedError::malformed(format!(
            "column {index} in {operation}: {source}"
        )),
        other => FeedError::transport(format!("sqlx error in {operation}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers() {
        assert!(validate_identifier("sqlsink").is_ok());
        assert!(validate_identifier("_t2").is_ok());
        assert!(validate_identifier("2t").is_err());
        assert!(validate_identifier("a.b").is_err());
        assert!(validate_identifier("").is_err());
    }

    #[test]
    fn pool_closed_is_transport() {
        let err = map_sqlx_error("drain", sqlx::Error::PoolClosed);
        assert_eq!(err, FeedError::transport("connection pool closed in drain"));
    }
}
