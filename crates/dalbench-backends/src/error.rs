//! Adapter error types.

use thiserror::Error;

/// Errors raised inside the persistence adapters.
#[derive(Debug, Error)]
pub enum BackendError {
    /// SQLite driver error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// PostgreSQL driver error.
    #[cfg(feature = "postgres")]
    #[error("postgres error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// JSON encoding or decoding of a document or column.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Decimal column could not be parsed.
    #[error("decimal error: {0}")]
    Decimal(#[from] rust_decimal::Error),

    /// UUID column could not be parsed.
    #[error("uuid error: {0}")]
    Uuid(#[from] uuid::Error),

    /// The async runtime driving the driver could not start.
    #[error("runtime error: {0}")]
    Runtime(#[source] std::io::Error),

    /// A write addressed an aggregate that does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A write would duplicate an existing aggregate.
    #[error("duplicate key: {0}")]
    Duplicate(String),

    /// A stored value cannot be mapped back onto the model.
    #[error("invalid data: {0}")]
    InvalidData(String),
}

impl From<BackendError> for dalbench_core::Error {
    fn from(err: BackendError) -> Self {
        dalbench_core::Error::backend(err)
    }
}

/// Result alias for adapter internals.
pub type Result<T> = std::result::Result<T, BackendError>;
