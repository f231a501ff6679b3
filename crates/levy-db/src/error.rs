//! # Database Error Types
//!
//! Error types for database operations and order close orchestration.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)                                             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbError (this module) ← Adds context and categorization                │
//! │       │                   SQLITE_BUSY / LOCKED → DbError::Busy          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  InvoiceSequencer ← Busy retried with backoff, then CoreError::Transient│
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  EngineError ← What OrderCloser callers see                             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use levy_core::{ConfigurationError, CoreError};
use thiserror::Error;

/// Database operation errors.
///
/// These errors wrap sqlx errors and provide additional context
/// for debugging and retry decisions.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - Two profile versions with the same number for a tenant
    /// - A second snapshot for an already closed order
    /// - The same invoice value issued twice in one period
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    ///
    /// ## When This Occurs
    /// - Activating a profile id that was never stored
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// Another connection holds the write lock.
    ///
    /// ## When This Occurs
    /// - Concurrent invoice issuance outlasted `busy_timeout`
    #[error("Database busy: {0}")]
    Busy(String),

    /// Database connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// A stored JSON document could not be read or written.
    #[error("Corrupt {entity} document: {message}")]
    Serialization { entity: String, message: String },

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a UniqueViolation error.
    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Creates a Serialization error for a JSON column.
    pub fn serialization(entity: impl Into<String>, err: serde_json::Error) -> Self {
        DbError::Serialization {
            entity: entity.into(),
            message: err.to_string(),
        }
    }

    /// True for lock contention and pool timeouts, which may clear on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, DbError::Busy(_) | DbError::PoolExhausted)
    }
}

/// SQLite primary result codes for lock contention.
const SQLITE_BUSY: &str = "5";
const SQLITE_LOCKED: &str = "6";

fn is_busy(code: Option<&str>, msg: &str) -> bool {
    // Extended codes (BUSY_SNAPSHOT = 517, ...) keep the primary code in the low byte.
    let primary = code
        .and_then(|c| c.parse::<i32>().ok())
        .map(|c| (c & 0xff).to_string());
    matches!(primary.as_deref(), Some(SQLITE_BUSY) | Some(SQLITE_LOCKED))
        || msg.contains("database is locked")
        || msg.contains("database table is locked")
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → Busy / UniqueViolation / ForeignKeyViolation / QueryFailed
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();
                let code = db_err.code();

                if is_busy(code.as_deref(), msg) {
                    DbError::Busy(msg.to_string())
                } else if msg.contains("UNIQUE constraint failed") {
                    // "UNIQUE constraint failed: <table>.<column>"
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

// =============================================================================
// Configuration Error
// =============================================================================

/// Errors from loading, validating or saving `levy.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A setting is out of range.
    #[error("Invalid engine configuration: {0}")]
    Invalid(String),

    /// The file exists but is not valid TOML for [`crate::EngineConfig`].
    #[error("Failed to load config: {0}")]
    LoadFailed(String),

    #[error("Failed to save config: {0}")]
    SaveFailed(String),

    #[error("Config file I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::LoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for ConfigError {
    fn from(err: toml::ser::Error) -> Self {
        ConfigError::SaveFailed(err.to_string())
    }
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

// =============================================================================
// Engine Error
// =============================================================================

/// Errors from closing an order end to end.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Calculation, validation or invoice retry exhaustion.
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Db(#[from] DbError),

    /// The tenant has no active tax profile to calculate with.
    #[error("No active tax profile for tenant {tenant_id}")]
    ProfileNotActive { tenant_id: String },
}

impl From<ConfigurationError> for EngineError {
    fn from(err: ConfigurationError) -> Self {
        EngineError::Core(CoreError::Configuration(err))
    }
}

impl From<levy_core::ValidationError> for EngineError {
    fn from(err: levy_core::ValidationError) -> Self {
        EngineError::Core(CoreError::Validation(err))
    }
}

impl EngineError {
    /// True when the caller should retry the whole close operation.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Core(err) => err.is_retryable(),
            EngineError::Db(err) => err.is_transient(),
            EngineError::ProfileNotActive { .. } => false,
        }
    }
}

/// Result type for orchestration operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_codes() {
        assert!(is_busy(Some("5"), "database is locked"));
        assert!(is_busy(Some("517"), "database is locked"));
        assert!(is_busy(Some("6"), "database table is locked"));
        assert!(is_busy(None, "database is locked"));
        assert!(!is_busy(Some("19"), "UNIQUE constraint failed: tax_snapshots.order_id"));
        assert!(!is_busy(Some("2067"), "UNIQUE constraint failed: tax_snapshots.order_id"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(DbError::Busy("locked".to_string()).is_transient());
        assert!(DbError::PoolExhausted.is_transient());
        assert!(!DbError::duplicate("order_id", "A-1").is_transient());

        let engine: EngineError = DbError::Busy("locked".to_string()).into();
        assert!(engine.is_retryable());

        let engine: EngineError = ConfigurationError::MissingTaxCode {
            owner: "delivery".to_string(),
        }
        .into();
        assert!(!engine.is_retryable());
        assert!(!EngineError::ProfileNotActive {
            tenant_id: "t".to_string()
        }
        .is_retryable());
    }
}
