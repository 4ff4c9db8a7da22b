//! # Database Error Types
//!
//! Error types for database operations and the stock engines.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  ValidationError / CoreError (business outcome)                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbError::Core ─────────────┐                                          │
//! │                             │                                           │
//! │  SQLite Error (sqlx::Error) │                                          │
//! │       │                     │                                           │
//! │       ▼                     ▼                                           │
//! │  DbError (this module) ─► unit of work dropped ─► rollback             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Caller: is_retryable()? retry from the start : surface                │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use stockline_core::{CoreError, ValidationError};
use thiserror::Error;

/// SQLite primary/extended result codes that mean "another writer got there
/// first": BUSY, LOCKED, BUSY_RECOVERY, LOCKED_SHAREDCACHE, BUSY_SNAPSHOT.
const SQLITE_CONTENTION_CODES: &[&str] = &["5", "6", "261", "262", "517"];

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// A business rule rejected the operation (not found, insufficient
    /// stock, invalid transition, bad input).
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Unique constraint violation.
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// The unit of work lost a race with another writer and was rolled back.
    ///
    /// ## When This Occurs
    /// - SQLite reports BUSY/LOCKED after the busy timeout
    /// - A read snapshot went stale before the unit's first write
    ///
    /// Nothing was committed; retrying the whole operation is safe.
    #[error("Concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    /// The unit of work exceeded its time budget and was rolled back.
    #[error("Unit of work timed out after {after_ms} ms")]
    Timeout { after_ms: u64 },

    /// Database connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Begin/commit/rollback failed.
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// A stored JSON column could not be encoded or decoded.
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::Core(CoreError::not_found(entity, id))
    }

    /// Creates a UniqueViolation error.
    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Whether retrying the whole operation from the start may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DbError::ConcurrencyConflict(_) | DbError::Timeout { .. } | DbError::PoolExhausted
        )
    }

    /// Whether this is a system fault rather than a business outcome.
    ///
    /// Business outcomes (`Core`) are rejected requests and are not logged as
    /// faults.
    pub fn is_fault(&self) -> bool {
        !matches!(self, DbError::Core(_))
    }

    /// The business error, if this is one.
    pub fn as_core(&self) -> Option<&CoreError> {
        match self {
            DbError::Core(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ValidationError> for DbError {
    fn from(err: ValidationError) -> Self {
        DbError::Core(CoreError::Validation(err))
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::Core(NotFound)
/// sqlx::Error::Database       → constraint / contention / query failure
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("Record", "unknown"),

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();
                let code = db_err.code();

                if code
                    .as_deref()
                    .is_some_and(|c| SQLITE_CONTENTION_CODES.contains(&c))
                    || msg.contains("database is locked")
                {
                    DbError::ConcurrencyConflict(msg.to_string())
                } else if msg.contains("UNIQUE constraint failed") {
                    let field = msg
                        .split("UNIQUE constraint failed: ")
                        .nth(1)
                        .unwrap_or("unknown")
                        .to_string();
                    DbError::UniqueViolation {
                        field,
                        value: "unknown".to_string(),
                    }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;
