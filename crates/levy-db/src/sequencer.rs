//! # Invoice Sequencer
//!
//! Atomic, reset-aware invoice numbering on top of SQLite.
//!
//! ## One Issue Attempt
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │   │                                                                     │
//! │   ├─ INSERT counter row ... ON CONFLICT DO NOTHING   ◄── takes the      │
//! │   │                                                      write lock     │
//! │   ├─ (order-scoped) already numbered? ──► return stored number          │
//! │   ├─ SELECT current_value, period_key                                   │
//! │   ├─ next = counter.issue(reset_policy, now)          (levy-core)       │
//! │   ├─ UPDATE ... WHERE current_value = ? AND period_key = ?              │
//! │   │        0 rows ──► Conflict                                          │
//! │   ├─ (order-scoped) INSERT issued_invoices                              │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `SQLITE_BUSY` and compare-and-set conflicts are retried with exponential
//! backoff. After `max_conflict_retries` the caller gets
//! [`CoreError::Transient`] and should retry the whole order close. A number
//! that was committed is never revoked.

use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use levy_core::validation::{validate_invoice_numbering, validate_order_id, validate_tenant_id};
use levy_core::{CoreError, InvoiceNumberingConfig, DEFAULT_MAX_CONFLICT_RETRIES};

use crate::error::{DbResult, EngineResult};
use crate::repository::invoice::{self, IssuedInvoice};

// =============================================================================
// Retry Policy
// =============================================================================

/// How long the sequencer keeps trying a contended counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub max_conflict_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_backoff,
            max_interval: self.max_backoff,
            multiplier: 2.0,
            // Attempts are bounded by max_conflict_retries instead.
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

// =============================================================================
// Sequencer
// =============================================================================

enum Attempt {
    Issued(IssuedInvoice),
    Conflict,
}

/// Issues sequential invoice numbers per tenant and series.
#[derive(Debug, Clone)]
pub struct InvoiceSequencer {
    pool: SqlitePool,
    policy: RetryPolicy,
}

impl InvoiceSequencer {
    pub fn new(pool: SqlitePool, policy: RetryPolicy) -> Self {
        InvoiceSequencer { pool, policy }
    }

    /// Issues the next number of `numbering`'s series.
    ///
    /// Not idempotent: every call consumes a number. Order close goes
    /// through [`issue_for_order`](Self::issue_for_order).
    pub async fn issue(
        &self,
        tenant_id: &str,
        numbering: &InvoiceNumberingConfig,
        now: DateTime<Utc>,
    ) -> EngineResult<IssuedInvoice> {
        self.issue_with_retry(tenant_id, None, numbering, now).await
    }

    /// Issues a number for an order exactly once.
    ///
    /// A repeated call for the same order returns the number stored by the
    /// first call and leaves the counter untouched.
    pub async fn issue_for_order(
        &self,
        tenant_id: &str,
        order_id: &str,
        numbering: &InvoiceNumberingConfig,
        now: DateTime<Utc>,
    ) -> EngineResult<IssuedInvoice> {
        validate_order_id(order_id)?;

        let issued = invoice::InvoiceRepository::new(self.pool.clone())
            .find_issued(tenant_id, order_id)
            .await?;
        if let Some(existing) = issued {
            debug!(tenant_id, order_id, number = %existing.number, "Order already numbered");
            return Ok(existing);
        }

        self.issue_with_retry(tenant_id, Some(order_id), numbering, now)
            .await
    }

    async fn issue_with_retry(
        &self,
        tenant_id: &str,
        order_id: Option<&str>,
        numbering: &InvoiceNumberingConfig,
        now: DateTime<Utc>,
    ) -> EngineResult<IssuedInvoice> {
        validate_tenant_id(tenant_id)?;
        validate_invoice_numbering(numbering)?;

        let mut backoff = self.policy.backoff();
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;

            let reason = match self.try_issue(tenant_id, order_id, numbering, now).await {
                Ok(Attempt::Issued(issued)) => {
                    info!(
                        tenant_id,
                        order_id,
                        series = %issued.series,
                        period = %issued.period_key,
                        value = issued.value,
                        number = %issued.number,
                        attempts,
                        "Issued invoice number"
                    );
                    return Ok(issued);
                }
                Ok(Attempt::Conflict) => "invoice counter advanced concurrently".to_string(),
                Err(err) if err.is_transient() => err.to_string(),
                Err(err) => return Err(err.into()),
            };

            if attempts > self.policy.max_conflict_retries {
                warn!(tenant_id, order_id, attempts, %reason, "Invoice issuance retries exhausted");
                return Err(CoreError::Transient { attempts, reason }.into());
            }

            let delay = backoff.next_backoff().unwrap_or(self.policy.max_backoff);
            debug!(tenant_id, attempt = attempts, ?delay, %reason, "Retrying invoice issuance");
            tokio::time::sleep(delay).await;
        }
    }

    async fn try_issue(
        &self,
        tenant_id: &str,
        order_id: Option<&str>,
        numbering: &InvoiceNumberingConfig,
        now: DateTime<Utc>,
    ) -> DbResult<Attempt> {
        let series = numbering.series_key();
        let policy = numbering.reset_policy;

        let mut tx = self.pool.begin().await?;

        invoice::ensure_counter(&mut tx, tenant_id, series, policy, now).await?;

        if let Some(order_id) = order_id {
            if let Some(existing) = invoice::find_issued_in(&mut tx, tenant_id, order_id).await? {
                tx.rollback().await?;
                return Ok(Attempt::Issued(existing));
            }
        }

        let current = invoice::read_counter(&mut tx, tenant_id, series).await?;
        let next = current.issue(policy, now);

        if !invoice::compare_and_set(&mut tx, tenant_id, series, &current, &next, policy, now).await? {
            tx.rollback().await?;
            return Ok(Attempt::Conflict);
        }

        let issued = IssuedInvoice {
            number: numbering.format_number(next.current_value),
            value: next.current_value,
            period_key: next.period_key,
            series: series.to_string(),
            order_id: order_id.map(str::to_string),
            issued_at: now,
        };

        if let Some(order_id) = order_id {
            invoice::record_issued(&mut tx, tenant_id, order_id, &issued).await?;
        }

        tx.commit().await?;
        Ok(Attempt::Issued(issued))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::pool::{Database, DbConfig};
    use chrono::TimeZone;
    use levy_core::ResetPolicy;

    fn numbering(series: Option<&str>, policy: ResetPolicy) -> InvoiceNumberingConfig {
        InvoiceNumberingConfig {
            enabled: true,
            series: series.map(str::to_string),
            prefix: Some("INV-".to_string()),
            suffix: None,
            padding: 4,
            reset_policy: policy,
        }
    }

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 10, 0, 0).unwrap()
    }

    async fn sequencer() -> (Database, InvoiceSequencer) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let sequencer = db.sequencer(RetryPolicy::default());
        (db, sequencer)
    }

    #[tokio::test]
    async fn test_sequential_numbers() {
        let (_db, sequencer) = sequencer().await;
        let numbering = numbering(None, ResetPolicy::Never);

        let first = sequencer.issue("t", &numbering, at(2025, 1, 1)).await.unwrap();
        let second = sequencer.issue("t", &numbering, at(2025, 1, 1)).await.unwrap();

        assert_eq!(first.number, "INV-0001");
        assert_eq!(second.number, "INV-0002");
        assert_eq!(second.value, 2);
        assert!(second.order_id.is_none());
    }

    #[tokio::test]
    async fn test_yearly_reset_across_new_year() {
        let (db, sequencer) = sequencer().await;
        let numbering = numbering(None, ResetPolicy::Yearly);

        sequencer.issue("t", &numbering, at(2024, 12, 31)).await.unwrap();
        let last = sequencer.issue("t", &numbering, at(2024, 12, 31)).await.unwrap();
        assert_eq!((last.period_key.as_str(), last.value), ("2024", 2));

        let first = sequencer.issue("t", &numbering, at(2025, 1, 1)).await.unwrap();
        assert_eq!((first.period_key.as_str(), first.value), ("2025", 1));

        let counter = db.invoices().counter("t", "").await.unwrap().unwrap();
        assert_eq!(counter.current_value, 1);
        assert_eq!(counter.period_key.as_str(), "2025");
    }

    #[tokio::test]
    async fn test_series_and_tenants_are_independent() {
        let (_db, sequencer) = sequencer().await;
        let a = numbering(Some("A"), ResetPolicy::Never);
        let b = numbering(Some("B"), ResetPolicy::Never);

        sequencer.issue("t", &a, at(2025, 1, 1)).await.unwrap();
        let a2 = sequencer.issue("t", &a, at(2025, 1, 1)).await.unwrap();
        let b1 = sequencer.issue("t", &b, at(2025, 1, 1)).await.unwrap();
        let other = sequencer.issue("t2", &a, at(2025, 1, 1)).await.unwrap();

        assert_eq!(a2.number, "A-INV-0002");
        assert_eq!(b1.number, "B-INV-0001");
        assert_eq!(other.value, 1);
    }

    #[tokio::test]
    async fn test_order_scoped_issue_is_idempotent() {
        let (db, sequencer) = sequencer().await;
        let numbering = numbering(None, ResetPolicy::Monthly);

        let first = sequencer
            .issue_for_order("t", "order-1", &numbering, at(2025, 2, 1))
            .await
            .unwrap();
        let again = sequencer
            .issue_for_order("t", "order-1", &numbering, at(2025, 3, 1))
            .await
            .unwrap();
        let next = sequencer
            .issue_for_order("t", "order-2", &numbering, at(2025, 2, 1))
            .await
            .unwrap();

        assert_eq!(first, again);
        assert_eq!(first.order_id.as_deref(), Some("order-1"));
        assert_eq!(next.value, 2);
        assert_eq!(db.invoices().list_issued("t", "").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_numbering_is_rejected() {
        let (_db, sequencer) = sequencer().await;
        let mut numbering = numbering(None, ResetPolicy::Never);
        numbering.padding = 40;

        let err = sequencer.issue("t", &numbering, at(2025, 1, 1)).await.unwrap_err();
        assert!(matches!(err, EngineError::Core(CoreError::Configuration(_))));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_locked_counter_surfaces_transient_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("levy.db");

        let holder = Database::new(DbConfig::new(&path)).await.unwrap();
        let contender = Database::new(
            DbConfig::new(&path)
                .busy_timeout(Duration::from_millis(20))
                .run_migrations(false),
        )
        .await
        .unwrap();

        // Another connection holds the write lock for the whole test.
        let mut blocker = holder.pool().begin().await.unwrap();
        sqlx::query(
            "INSERT INTO invoice_counters (tenant_id, series, updated_at) VALUES ('other', '', 'now')",
        )
        .execute(&mut *blocker)
        .await
        .unwrap();

        let sequencer = contender.sequencer(RetryPolicy {
            max_conflict_retries: 2,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
        });
        let numbering = numbering(None, ResetPolicy::Never);

        let err = sequencer.issue("t", &numbering, at(2025, 1, 1)).await.unwrap_err();
        match &err {
            EngineError::Core(CoreError::Transient { attempts, .. }) => assert_eq!(*attempts, 3),
            other => panic!("expected transient error, got {:?}", other),
        }
        assert!(err.is_retryable());

        blocker.rollback().await.unwrap();
        let issued = sequencer.issue("t", &numbering, at(2025, 1, 1)).await.unwrap();
        assert_eq!(issued.value, 1);
    }
}
