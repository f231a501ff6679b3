//! # levy-core: Pure Tax Engine for Levy
//!
//! This crate is the **heart** of Levy. It turns a closed restaurant order
//! and the tenant's tax profile into a frozen [`TaxSnapshot`], and it owns the
//! pure half of invoice numbering. Nothing in here performs I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Levy Architecture                              │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │            Order processing (external collaborator)             │   │
//! │  │     cashier closes order ──► OrderInput + tenant id             │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              levy-db (OrderCloser, InvoiceSequencer)            │   │
//! │  │   loads active TaxProfile, issues numbers, stores snapshots     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ levy-core (THIS CRATE) ★                        │   │
//! │  │                                                                 │   │
//! │  │  ┌────────┐ ┌──────────────┐ ┌────────────┐ ┌───────────────┐  │   │
//! │  │  │ money  │ │ jurisdiction │ │ classifier │ │   snapshot    │  │   │
//! │  │  │ cents  │ │   resolve    │ │  buckets   │ │  calculator   │  │   │
//! │  │  └────────┘ └──────────────┘ └────────────┘ └───────────────┘  │   │
//! │  │  ┌────────┐ ┌──────────────┐ ┌────────────┐                    │   │
//! │  │  │ types  │ │   invoice    │ │ validation │                    │   │
//! │  │  │ rules  │ │ period/format│ │   checks   │                    │   │
//! │  │  └────────┘ └──────────────┘ └────────────┘                    │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO CLOCK • PURE FUNCTIONS              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - Integer cents, rounding modes, rate application and extraction
//! - [`types`] - Rule model (profiles, rates, surcharges, jurisdictions) and order input
//! - [`jurisdiction`] - Effective configuration for an order's locality
//! - [`classifier`] - Per-line rate bucket classification
//! - [`snapshot`] - The snapshot calculator and the frozen snapshot types
//! - [`invoice`] - Period keys, counter transitions, number formatting
//! - [`validation`] - Profile and input validation
//! - [`error`] - Domain error types
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: same profile + same order = byte-identical snapshot
//! 2. **Integer Money**: every amount is i64 cents, every product is i128
//! 3. **First Match Wins**: rule lists are ordered and scanned front to back
//! 4. **Loud Configuration Errors**: a dangling tax code never degrades to "no tax"
//!
//! ## Example Usage
//!
//! ```rust
//! use levy_core::snapshot::calculate_tax_snapshot;
//! use levy_core::types::{OrderInput, OrderLine, TaxProfile, TaxRateRule};
//!
//! let mut profile = TaxProfile::new("PH", "PHP");
//! profile.rates.push(TaxRateRule::all("std", "Standard", 1200));
//!
//! let order = OrderInput::new("dine_in", vec![OrderLine::new(2, 2500)]);
//! let snapshot = calculate_tax_snapshot(&profile, &order).unwrap();
//!
//! assert_eq!(snapshot.totals.sub_total_cents, 5000);
//! assert_eq!(snapshot.totals.tax_cents, 600);
//! assert_eq!(snapshot.totals.grand_total_cents, 5600);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod classifier;
pub mod error;
pub mod invoice;
pub mod jurisdiction;
pub mod money;
pub mod snapshot;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{ConfigurationError, CoreError, CoreResult, ValidationError};
pub use invoice::{InvoiceCounter, PeriodKey};
pub use jurisdiction::{resolve_effective_config, EffectiveConfig};
pub use money::{Money, RoundingMode};
pub use snapshot::{calculate_tax_snapshot, TaxSnapshot};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Default tenant ID for single-tenant deployments and development seeds.
pub const DEFAULT_TENANT_ID: &str = "00000000-0000-0000-0000-000000000001";

/// Basis points in one whole (100.00%).
pub const BPS_DENOMINATOR: i64 = 10_000;

/// Widest zero padding an invoice number may request.
///
/// ## Business Reason
/// u64 counters never need more than 20 digits; 18 keeps numbers readable
/// on printed B2B invoices.
pub const MAX_INVOICE_PADDING: u8 = 18;

/// Conflict retries before an invoice issuance surfaces a transient error.
pub const DEFAULT_MAX_CONFLICT_RETRIES: u32 = 5;
