//! Infrastructure errors
//!
//! Services wrap these in their own error types and decide what the caller
//! sees; nothing here knows about HTTP.

use thiserror::Error;

/// Failure talking to PostgreSQL
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// The pool could not be opened
    #[error("Database connection error: {0}")]
    Connection(#[source] sqlx::Error),

    /// A statement or transaction failed
    #[error("Database query error: {0}")]
    Query(#[source] sqlx::Error),

    /// Embedded schema migrations did not apply
    #[error("Database migration error: {0}")]
    Migration(String),

    /// Pool settings are unusable, e.g. an unparsable URL
    #[error("Database configuration error: {0}")]
    Configuration(String),
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Failure of a cache backend or of a cached payload
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache backend error: {0}")]
    Backend(#[from] redis::RedisError),

    /// A cached value could not be encoded or decoded
    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type CacheResult<T> = Result<T, CacheError>;
