//! # Error Types
//!
//! Domain-specific error types for levy-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  levy-core errors (this file)                                           │
//! │  ├── CoreError           - What a calculation or issuance returns       │
//! │  ├── ConfigurationError  - Broken tax profile (fatal, never retried)    │
//! │  └── ValidationError     - Malformed order input                        │
//! │                                                                         │
//! │  levy-db errors (separate crate)                                        │
//! │  ├── DbError             - Database operation failures                  │
//! │  └── EngineError         - Order close orchestration                    │
//! │                                                                         │
//! │  Flow: ConfigurationError ─┐                                            │
//! │        ValidationError ────┼──► CoreError ──► EngineError ──► caller    │
//! │        retry exhaustion ───┘                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Retry Semantics
//! Only [`CoreError::Transient`] is worth retrying. Everything else means the
//! order cannot close until someone fixes the profile or the input.

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Errors surfaced by the tax engine.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The tax profile (or the jurisdiction override picked for this order)
    /// is unusable.
    ///
    /// ## User Workflow
    /// ```text
    /// Cashier presses "Close order"
    ///      │
    ///      ▼
    /// Surcharge "svc" is taxable with taxCode "vat"
    /// but effective rates only contain "std"
    ///      │
    ///      ▼
    /// Configuration(DanglingTaxCode { .. })
    ///      │
    ///      ▼
    /// Order stays open, admin is told to fix the profile
    /// ```
    #[error("Tax configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// The order input failed validation.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The order was priced in a different currency than the profile.
    #[error("Order currency {order} does not match tax profile currency {profile}")]
    CurrencyMismatch { order: String, profile: String },

    /// The invoice counter stayed contended for the whole retry budget.
    ///
    /// The caller retries the whole close operation.
    #[error("Invoice counter contended after {attempts} attempts: {reason}")]
    Transient { attempts: u32, reason: String },
}

impl CoreError {
    /// True when repeating the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Transient { .. })
    }
}

// =============================================================================
// Configuration Error
// =============================================================================

/// A tax profile that cannot produce a correct snapshot.
///
/// These are never downgraded to "no tax": a silently skipped tax line
/// misstates the tenant's filing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// A surcharge or delivery points at a rate code that does not exist.
    #[error("{owner} references unknown tax code '{tax_code}'")]
    DanglingTaxCode { owner: String, tax_code: String },

    /// A taxable surcharge or delivery has no tax code at all.
    #[error("{owner} is taxable but has no tax code")]
    MissingTaxCode { owner: String },

    /// A rate or surcharge percentage below zero.
    #[error("{owner} has negative basis points: {bps}")]
    NegativeBps { owner: String, bps: i32 },

    /// Two rules in the same list share a code.
    #[error("Duplicate {kind} code '{code}'")]
    DuplicateCode { kind: String, code: String },

    /// A rule code is blank.
    #[error("{kind} code must not be empty")]
    EmptyCode { kind: String },

    /// The profile header itself is malformed.
    #[error("Invalid tax profile {field}: {reason}")]
    InvalidProfile { field: String, reason: String },

    /// Invoice numbering settings are unusable.
    #[error("Invalid invoice numbering: {reason}")]
    InvalidNumbering { reason: String },

    /// A problem inside the jurisdiction override that was selected.
    #[error("Jurisdiction '{code}': {source}")]
    Jurisdiction {
        code: String,
        #[source]
        source: Box<ConfigurationError>,
    },
}

impl ConfigurationError {
    /// Attributes this error to the jurisdiction override `code`.
    ///
    /// Errors from the base profile (empty code) are returned unchanged.
    pub fn in_jurisdiction(self, code: &str) -> Self {
        if code.is_empty() {
            return self;
        }
        ConfigurationError::Jurisdiction {
            code: code.to_string(),
            source: Box::new(self),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when the order handed to the engine is malformed.
/// Missing optional data (category, tags, locality) is never an error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Invalid format (e.g., invalid UUID, bad currency code).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
