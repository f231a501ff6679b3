//! # Validation Module
//!
//! Input validation for orders, identifiers and stored tax profiles.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Profile save (TaxProfileRepository::create_version)           │
//! │  ├── validate_tax_profile: header, numbering, EVERY jurisdiction        │
//! │  └── Broken profiles never become active                                │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Order close (calculate_tax_snapshot)                          │
//! │  ├── validate_order_input: quantities, amount bounds                    │
//! │  └── resolver re-validates the one effective config it picked           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                             │
//! │  ├── UNIQUE (tenant, order) on snapshots and issued invoices            │
//! │  └── Foreign key from active pointer to profile version                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust,no_run
//! use levy_core::validation::{validate_order_id, validate_quantity};
//!
//! validate_order_id("ORD-2025-000123").unwrap();
//! validate_quantity(5).unwrap();
//! ```

use std::collections::HashSet;

use crate::error::{ConfigurationError, ValidationError};
use crate::jurisdiction::EffectiveConfig;
use crate::types::{InvoiceNumberingConfig, OrderInput, TaxProfile};
use crate::MAX_INVOICE_PADDING;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Largest quantity on a single line.
pub const MAX_LINE_QUANTITY: i64 = 1_000_000;

/// Largest absolute per-unit price or addon amount.
pub const MAX_UNIT_CENTS: i64 = 1_000_000_000_000;

/// Largest absolute pre-tax order value.
///
/// Keeps every intermediate sum (surcharges, tax, fees) far from i64 limits.
pub const MAX_ORDER_CENTS: i64 = 1_000_000_000_000_000;

/// Longest tenant, order or series identifier.
pub const MAX_ID_LEN: usize = 128;

/// Longest invoice prefix or suffix.
pub const MAX_AFFIX_LEN: usize = 32;

// =============================================================================
// Identifier Validators
// =============================================================================

fn validate_identifier(field: &str, value: &str) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.len() > MAX_ID_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_ID_LEN,
        });
    }

    Ok(())
}

/// Validates a tenant identifier.
///
/// ## Example
/// ```rust
/// use levy_core::validation::validate_tenant_id;
///
/// assert!(validate_tenant_id("00000000-0000-0000-0000-000000000001").is_ok());
/// assert!(validate_tenant_id("  ").is_err());
/// ```
pub fn validate_tenant_id(tenant_id: &str) -> ValidationResult<()> {
    validate_identifier("tenant_id", tenant_id)
}

/// Validates an order identifier used as the idempotency key.
pub fn validate_order_id(order_id: &str) -> ValidationResult<()> {
    validate_identifier("order_id", order_id)
}

/// Validates a UUID string format.
///
/// ## Example
/// ```rust
/// use levy_core::validation::validate_uuid;
///
/// assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000").is_ok());
/// assert!(validate_uuid("not-a-uuid").is_err());
/// ```
pub fn validate_uuid(id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "id".to_string(),
        });
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: "id".to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

/// Validates an ISO-style code: exactly `len` ASCII letters.
fn validate_iso_code(field: &str, code: &str, len: usize) -> ValidationResult<()> {
    if code.len() != len || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: format!("must be {} ASCII letters", len),
        });
    }
    Ok(())
}

/// Validates an ISO 4217 currency code ("PHP", "USD").
pub fn validate_currency_code(currency: &str) -> ValidationResult<()> {
    validate_iso_code("currency", currency, 3)
}

// =============================================================================
// Order Validators
// =============================================================================

/// Validates a line quantity.
///
/// ## Rules
/// - Must be between 0 and MAX_LINE_QUANTITY
///
/// A zero-quantity line (a voided item left on the ticket) is valid and
/// contributes a base of zero.
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if !(0..=MAX_LINE_QUANTITY).contains(&qty) {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 0,
            max: MAX_LINE_QUANTITY,
        });
    }

    Ok(())
}

fn validate_magnitude(field: &str, cents: i64, max: i64) -> ValidationResult<()> {
    if cents < -max || cents > max {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: -max,
            max,
        });
    }
    Ok(())
}

/// Validates an order before calculation.
///
/// ## Rules
/// - `orderType` is present
/// - Every line has a quantity within bounds and bounded per-unit amounts
/// - The order value and delivery fee stay within [`MAX_ORDER_CENTS`]
/// - The delivery fee is not negative
///
/// Missing categories, tags, customer or locality are fine.
pub fn validate_order_input(input: &OrderInput) -> ValidationResult<()> {
    if input.order_type.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "orderType".to_string(),
        });
    }

    if let Some(currency) = input.currency.as_deref().map(str::trim) {
        if !currency.is_empty() {
            validate_currency_code(currency)?;
        }
    }

    let mut order_total: i128 = 0;
    for line in &input.lines {
        validate_quantity(i64::from(line.quantity))?;
        validate_magnitude("unitPriceCents", line.unit_price_cents, MAX_UNIT_CENTS)?;
        validate_magnitude("addonsCents", line.addons_cents, MAX_UNIT_CENTS)?;

        let unit = line.unit_price_cents as i128 + line.addons_cents as i128;
        order_total += unit * i128::from(line.quantity);
        if order_total.abs() > MAX_ORDER_CENTS as i128 {
            return Err(ValidationError::OutOfRange {
                field: "order total".to_string(),
                min: -MAX_ORDER_CENTS,
                max: MAX_ORDER_CENTS,
            });
        }
    }

    if input.delivery_fee_cents < 0 {
        return Err(ValidationError::OutOfRange {
            field: "deliveryFeeCents".to_string(),
            min: 0,
            max: MAX_ORDER_CENTS,
        });
    }
    validate_magnitude("deliveryFeeCents", input.delivery_fee_cents, MAX_ORDER_CENTS)?;

    Ok(())
}

// =============================================================================
// Profile Validators
// =============================================================================

fn invalid_profile(field: &str, reason: impl Into<String>) -> ConfigurationError {
    ConfigurationError::InvalidProfile {
        field: field.to_string(),
        reason: reason.into(),
    }
}

/// Validates invoice numbering settings.
pub fn validate_invoice_numbering(numbering: &InvoiceNumberingConfig) -> Result<(), ConfigurationError> {
    let invalid = |reason: String| ConfigurationError::InvalidNumbering { reason };

    if numbering.padding > MAX_INVOICE_PADDING {
        return Err(invalid(format!(
            "padding {} exceeds {}",
            numbering.padding, MAX_INVOICE_PADDING
        )));
    }

    if let Some(series) = &numbering.series {
        if series.len() > MAX_ID_LEN || series.chars().any(char::is_whitespace) {
            return Err(invalid(format!(
                "series '{}' must be at most {} characters without whitespace",
                series, MAX_ID_LEN
            )));
        }
    }

    for (name, affix) in [("prefix", &numbering.prefix), ("suffix", &numbering.suffix)] {
        if affix.as_ref().is_some_and(|a| a.len() > MAX_AFFIX_LEN) {
            return Err(invalid(format!("{} longer than {} characters", name, MAX_AFFIX_LEN)));
        }
    }

    Ok(())
}

/// Validates a whole profile before it is stored.
///
/// The base configuration and the configuration produced by every
/// jurisdiction override must be usable, not only the ones a given order
/// would select.
pub fn validate_tax_profile(profile: &TaxProfile) -> Result<(), ConfigurationError> {
    validate_iso_code("country", &profile.country, 2)
        .map_err(|err| invalid_profile("country", err.to_string()))?;
    validate_currency_code(&profile.currency)
        .map_err(|err| invalid_profile("currency", err.to_string()))?;

    EffectiveConfig::base(profile).validate()?;

    let mut seen = HashSet::new();
    for rule in &profile.jurisdictions {
        if rule.code.trim().is_empty() {
            return Err(ConfigurationError::EmptyCode {
                kind: "jurisdiction".to_string(),
            });
        }
        if !seen.insert(rule.code.as_str()) {
            return Err(ConfigurationError::DuplicateCode {
                kind: "jurisdiction".to_string(),
                code: rule.code.clone(),
            });
        }
        EffectiveConfig::with_override(profile, rule).validate()?;
    }

    if let Some(numbering) = &profile.b2b_config.invoice_numbering {
        validate_invoice_numbering(numbering)?;
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
