//! Repository layer for database operations.
//!
//! Methods are organized across submodules by domain:
//! - `trades.rs` - idempotent trade inserts and dedup-guard queries
//! - `lots.rs` - lot replace/query
//! - `holdings.rs` - holdings snapshot upsert and account valuation

mod holdings;
mod lots;
mod trades;

use crate::domain::Decimal;
use sqlx::sqlite::SqlitePool;
use std::str::FromStr;
use tracing::warn;

/// Repository for database operations.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Parse a stored decimal string, defaulting (with a warning) on corruption
/// rather than failing the whole query.
pub(crate) fn parse_decimal_lenient(context: &str, value: &str) -> Decimal {
    Decimal::from_str(value).unwrap_or_else(|e| {
        warn!(
            context,
            value,
            error = %e,
            "Failed to parse stored decimal, using default"
        );
        Decimal::default()
    })
}
