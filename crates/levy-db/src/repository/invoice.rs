//! # Invoice Repository
//!
//! Invoice counters and the order-scoped ledger of issued numbers.
//!
//! Counter rows are only ever advanced by [`crate::InvoiceSequencer`]; the
//! `pub(crate)` statements below are the steps of its write transaction. The
//! public methods are read-only views for reporting and diagnostics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Sqlite, SqliteConnection, SqlitePool};

use levy_core::{InvoiceCounter, PeriodKey, ResetPolicy};

use crate::error::{DbError, DbResult};

/// One issued invoice number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedInvoice {
    /// Formatted number, e.g. `B-INV-000042`.
    pub number: String,
    /// Counter value within `period_key`.
    pub value: u64,
    pub period_key: PeriodKey,
    /// Counter namespace; empty when no series is configured.
    pub series: String,
    /// Set when issued through `issue_for_order`.
    pub order_id: Option<String>,
    pub issued_at: DateTime<Utc>,
}

type IssuedRow = (String, String, String, i64, String, DateTime<Utc>);

fn decode_issued(
    (order_id, series, period_key, value, number, issued_at): IssuedRow,
) -> DbResult<IssuedInvoice> {
    let value = u64::try_from(value)
        .map_err(|_| DbError::Internal(format!("negative invoice value {} for {}", value, number)))?;
    Ok(IssuedInvoice {
        number,
        value,
        period_key: PeriodKey::from_stored(period_key),
        series,
        order_id: Some(order_id),
        issued_at,
    })
}

fn to_sql_value(value: u64) -> DbResult<i64> {
    i64::try_from(value)
        .map_err(|_| DbError::Internal(format!("invoice counter {} exceeds i64", value)))
}

/// Repository for invoice counters and issued numbers.
#[derive(Debug, Clone)]
pub struct InvoiceRepository {
    pool: SqlitePool,
}

impl InvoiceRepository {
    /// Creates a new InvoiceRepository.
    pub fn new(pool: SqlitePool) -> Self {
        InvoiceRepository { pool }
    }

    /// The number already issued to an order, if any.
    pub async fn find_issued(
        &self,
        tenant_id: &str,
        order_id: &str,
    ) -> DbResult<Option<IssuedInvoice>> {
        select_issued(&self.pool, tenant_id, order_id).await
    }

    /// Current state of a tenant/series counter; `None` before the first issue.
    pub async fn counter(&self, tenant_id: &str, series: &str) -> DbResult<Option<InvoiceCounter>> {
        let row: Option<(i64, String)> = sqlx::query_as(
            "SELECT current_value, period_key FROM invoice_counters WHERE tenant_id = ?1 AND series = ?2",
        )
        .bind(tenant_id)
        .bind(series)
        .fetch_optional(&self.pool)
        .await?;

        row.map(decode_counter).transpose()
    }

    /// Order-scoped numbers of one series, in issue order.
    pub async fn list_issued(&self, tenant_id: &str, series: &str) -> DbResult<Vec<IssuedInvoice>> {
        let rows: Vec<IssuedRow> = sqlx::query_as(
            r#"
            SELECT order_id, series, period_key, sequence_value, invoice_number, issued_at
            FROM issued_invoices
            WHERE tenant_id = ?1 AND series = ?2
            ORDER BY issued_at, period_key, sequence_value
            "#,
        )
        .bind(tenant_id)
        .bind(series)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(decode_issued).collect()
    }
}

fn decode_counter((value, period_key): (i64, String)) -> DbResult<InvoiceCounter> {
    let current_value = u64::try_from(value)
        .map_err(|_| DbError::Internal(format!("negative invoice counter {}", value)))?;
    Ok(InvoiceCounter {
        current_value,
        period_key: PeriodKey::from_stored(period_key),
    })
}

async fn select_issued<'e, E>(
    executor: E,
    tenant_id: &str,
    order_id: &str,
) -> DbResult<Option<IssuedInvoice>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row: Option<IssuedRow> = sqlx::query_as(
        r#"
        SELECT order_id, series, period_key, sequence_value, invoice_number, issued_at
        FROM issued_invoices
        WHERE tenant_id = ?1 AND order_id = ?2
        "#,
    )
    .bind(tenant_id)
    .bind(order_id)
    .fetch_optional(executor)
    .await?;

    row.map(decode_issued).transpose()
}

// =============================================================================
// Sequencer Transaction Steps
// =============================================================================

/// Creates the counter row if missing. Being a write, this also takes
/// SQLite's write lock for the rest of the transaction.
pub(crate) async fn ensure_counter(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    series: &str,
    policy: ResetPolicy,
    now: DateTime<Utc>,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO invoice_counters (tenant_id, series, current_value, period_key, reset_policy, updated_at)
        VALUES (?1, ?2, 0, '', ?3, ?4)
        ON CONFLICT (tenant_id, series) DO NOTHING
        "#,
    )
    .bind(tenant_id)
    .bind(series)
    .bind(policy)
    .bind(now)
    .execute(conn)
    .await?;

    Ok(())
}

pub(crate) async fn read_counter(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    series: &str,
) -> DbResult<InvoiceCounter> {
    let row: (i64, String) = sqlx::query_as(
        "SELECT current_value, period_key FROM invoice_counters WHERE tenant_id = ?1 AND series = ?2",
    )
    .bind(tenant_id)
    .bind(series)
    .fetch_one(conn)
    .await?;

    decode_counter(row)
}

/// Writes `next` only if the row still holds `expected`.
///
/// Returns `false` when another writer advanced the counter first.
pub(crate) async fn compare_and_set(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    series: &str,
    expected: &InvoiceCounter,
    next: &InvoiceCounter,
    policy: ResetPolicy,
    now: DateTime<Utc>,
) -> DbResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE invoice_counters
        SET current_value = ?1, period_key = ?2, reset_policy = ?3, updated_at = ?4
        WHERE tenant_id = ?5 AND series = ?6 AND current_value = ?7 AND period_key = ?8
        "#,
    )
    .bind(to_sql_value(next.current_value)?)
    .bind(next.period_key.as_str())
    .bind(policy)
    .bind(now)
    .bind(tenant_id)
    .bind(series)
    .bind(to_sql_value(expected.current_value)?)
    .bind(expected.period_key.as_str())
    .execute(conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Ledger lookup inside the issuing transaction.
pub(crate) async fn find_issued_in(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    order_id: &str,
) -> DbResult<Option<IssuedInvoice>> {
    select_issued(conn, tenant_id, order_id).await
}

pub(crate) async fn record_issued(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    order_id: &str,
    invoice: &IssuedInvoice,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO issued_invoices (
            tenant_id, order_id, series, period_key, sequence_value, invoice_number, issued_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(tenant_id)
    .bind(order_id)
    .bind(&invoice.series)
    .bind(invoice.period_key.as_str())
    .bind(to_sql_value(invoice.value)?)
    .bind(&invoice.number)
    .bind(invoice.issued_at)
    .execute(conn)
    .await?;

    Ok(())
}
