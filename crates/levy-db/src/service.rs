//! # Order Close
//!
//! Ties the pure engine to storage: the one place an order's tax is frozen.
//!
//! ## Close Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  close_order(tenant, order_id, input, now)                              │
//! │       │                                                                 │
//! │       ├── snapshot already stored? ──────────────► return it            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  active profile (loaded once) ── none ──► ProfileNotActive              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  calculate_tax_snapshot (pure) ── ConfigurationError ──► nothing stored │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  numbering enabled + tax ID? ──► issue_for_order (idempotent)           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  insert snapshot + invoice number ──► ClosedOrder                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A retry after a failure between numbering and the snapshot insert reuses
//! the number already recorded for the order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use levy_core::invoice::numbering_for_order;
use levy_core::validation::{validate_order_id, validate_tenant_id};
use levy_core::{calculate_tax_snapshot, OrderInput, TaxSnapshot};

use crate::error::{DbError, EngineError, EngineResult};
use crate::pool::Database;
use crate::sequencer::{InvoiceSequencer, RetryPolicy};

/// Result of closing an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosedOrder {
    pub order_id: String,
    pub snapshot: TaxSnapshot,
    pub invoice_number: Option<String>,
    pub closed_at: DateTime<Utc>,
}

/// Closes orders: calculate, number, freeze.
#[derive(Debug, Clone)]
pub struct OrderCloser {
    db: Database,
    sequencer: InvoiceSequencer,
}

impl OrderCloser {
    pub fn new(db: Database, policy: RetryPolicy) -> Self {
        let sequencer = db.sequencer(policy);
        OrderCloser { db, sequencer }
    }

    /// Calculates, numbers and stores the tax snapshot of an order.
    ///
    /// Safe to call again for the same order: the stored result is returned
    /// unchanged, even if the active profile changed in between.
    ///
    /// ## Errors
    /// - `ProfileNotActive` when the tenant has no active profile
    /// - `Core(Configuration)` / `Core(Validation)` when the profile or order is unusable
    /// - `Core(Transient)` when the invoice counter stayed contended; retry the close
    pub async fn close_order(
        &self,
        tenant_id: &str,
        order_id: &str,
        input: &OrderInput,
        now: DateTime<Utc>,
    ) -> EngineResult<ClosedOrder> {
        validate_tenant_id(tenant_id)?;
        validate_order_id(order_id)?;

        if let Some(stored) = self.db.snapshots().get(tenant_id, order_id).await? {
            debug!(tenant_id, order_id, "Order already closed, returning stored snapshot");
            return Ok(ClosedOrder {
                order_id: stored.order_id,
                snapshot: stored.snapshot,
                invoice_number: stored.invoice_number,
                closed_at: stored.closed_at,
            });
        }

        let profile = self
            .db
            .profiles()
            .get_active(tenant_id)
            .await?
            .ok_or_else(|| EngineError::ProfileNotActive {
                tenant_id: tenant_id.to_string(),
            })?;

        let snapshot = calculate_tax_snapshot(&profile, input)?;

        let invoice_number = match numbering_for_order(&profile, input) {
            Some(numbering) => Some(
                self.sequencer
                    .issue_for_order(tenant_id, order_id, numbering, now)
                    .await?
                    .number,
            ),
            None => None,
        };

        let inserted = self
            .db
            .snapshots()
            .insert(tenant_id, order_id, &snapshot, invoice_number.as_deref(), now)
            .await;

        match inserted {
            Ok(()) => {}
            // A concurrent close of the same order won; its snapshot is the frozen one.
            Err(DbError::UniqueViolation { .. }) => {
                let stored = self
                    .db
                    .snapshots()
                    .get(tenant_id, order_id)
                    .await?
                    .ok_or_else(|| DbError::not_found("TaxSnapshot", order_id))?;
                return Ok(ClosedOrder {
                    order_id: stored.order_id,
                    snapshot: stored.snapshot,
                    invoice_number: stored.invoice_number,
                    closed_at: stored.closed_at,
                });
            }
            Err(err) => return Err(err.into()),
        }

        info!(
            tenant_id,
            order_id,
            profile_version = snapshot.profile_version,
            tax_cents = snapshot.totals.tax_cents,
            grand_total_cents = snapshot.totals.grand_total_cents,
            invoice_number = invoice_number.as_deref(),
            "Order closed"
        );

        Ok(ClosedOrder {
            order_id: order_id.to_string(),
            snapshot,
            invoice_number,
            closed_at: now,
        })
    }
}
