//! # Snapshot Repository
//!
//! Insert-only storage for the tax snapshot frozen at order close.
//!
//! Rows are never updated or deleted; triggers in the schema abort any
//! attempt. Reporting reads these rows as-is and never recomputes them from
//! the current profile.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::debug;

use levy_core::TaxSnapshot;

use crate::error::{DbError, DbResult};

/// A snapshot as persisted with its order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSnapshot {
    pub order_id: String,
    pub snapshot: TaxSnapshot,
    pub invoice_number: Option<String>,
    pub closed_at: DateTime<Utc>,
}

/// Repository for frozen tax snapshots.
#[derive(Debug, Clone)]
pub struct SnapshotRepository {
    pool: SqlitePool,
}

impl SnapshotRepository {
    /// Creates a new SnapshotRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SnapshotRepository { pool }
    }

    /// Freezes `snapshot` for an order.
    ///
    /// ## Errors
    /// `DbError::UniqueViolation` if the order already has a snapshot.
    pub async fn insert(
        &self,
        tenant_id: &str,
        order_id: &str,
        snapshot: &TaxSnapshot,
        invoice_number: Option<&str>,
        closed_at: DateTime<Utc>,
    ) -> DbResult<()> {
        let document =
            serde_json::to_string(snapshot).map_err(|e| DbError::serialization("tax snapshot", e))?;

        debug!(
            tenant_id,
            order_id,
            grand_total_cents = snapshot.totals.grand_total_cents,
            "Persisting tax snapshot"
        );

        sqlx::query(
            r#"
            INSERT INTO tax_snapshots (
                tenant_id, order_id, profile_id, invoice_number,
                grand_total_cents, tax_cents, snapshot, closed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(tenant_id)
        .bind(order_id)
        .bind(&snapshot.profile_id)
        .bind(invoice_number)
        .bind(snapshot.totals.grand_total_cents)
        .bind(snapshot.totals.tax_cents)
        .bind(&document)
        .bind(closed_at)
        .execute(&self.pool)
        .await
        .map_err(|err| match DbError::from(err) {
            DbError::UniqueViolation { .. } => DbError::duplicate("tax_snapshots.order_id", order_id),
            other => other,
        })?;

        Ok(())
    }

    /// The frozen snapshot of an order, if it was closed.
    pub async fn get(&self, tenant_id: &str, order_id: &str) -> DbResult<Option<StoredSnapshot>> {
        let row: Option<(String, Option<String>, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT snapshot, invoice_number, closed_at
            FROM tax_snapshots
            WHERE tenant_id = ?1 AND order_id = ?2
            "#,
        )
        .bind(tenant_id)
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(document, invoice_number, closed_at)| {
            let snapshot = serde_json::from_str(&document)
                .map_err(|e| DbError::serialization("tax snapshot", e))?;
            Ok(StoredSnapshot {
                order_id: order_id.to_string(),
                snapshot,
                invoice_number,
                closed_at,
            })
        })
        .transpose()
    }

    /// Snapshots closed in `[from, to)`, oldest first.
    pub async fn list_closed_between(
        &self,
        tenant_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DbResult<Vec<StoredSnapshot>> {
        let rows: Vec<(String, String, Option<String>, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT order_id, snapshot, invoice_number, closed_at
            FROM tax_snapshots
            WHERE tenant_id = ?1 AND closed_at >= ?2 AND closed_at < ?3
            ORDER BY closed_at, order_id
            "#,
        )
        .bind(tenant_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(order_id, document, invoice_number, closed_at)| {
                let snapshot = serde_json::from_str(&document)
                    .map_err(|e| DbError::serialization("tax snapshot", e))?;
                Ok(StoredSnapshot {
                    order_id,
                    snapshot,
                    invoice_number,
                    closed_at,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use chrono::TimeZone;
    use levy_core::{calculate_tax_snapshot, OrderInput, OrderLine, TaxProfile, TaxRateRule};

    async fn setup() -> (Database, TaxSnapshot) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let mut profile = TaxProfile::new("PH", "PHP");
        profile.rates.push(TaxRateRule::all("std", "VAT", 1200));
        let stored = db.profiles().create_version("t", &profile).await.unwrap();

        let order = OrderInput::new("dine_in", vec![OrderLine::new(2, 2500)]);
        let snapshot = calculate_tax_snapshot(&stored, &order).unwrap();
        (db, snapshot)
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let (db, snapshot) = setup().await;
        let closed_at = Utc.with_ymd_and_hms(2025, 5, 1, 19, 30, 0).unwrap();

        db.snapshots()
            .insert("t", "order-1", &snapshot, Some("INV-7"), closed_at)
            .await
            .unwrap();

        let stored = db.snapshots().get("t", "order-1").await.unwrap().unwrap();
        assert_eq!(stored.snapshot, snapshot);
        assert_eq!(stored.invoice_number.as_deref(), Some("INV-7"));
        assert_eq!(stored.closed_at, closed_at);

        assert!(db.snapshots().get("other-tenant", "order-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_snapshots_are_frozen() {
        let (db, snapshot) = setup().await;
        let now = Utc::now();

        db.snapshots().insert("t", "order-1", &snapshot, None, now).await.unwrap();

        let err = db
            .snapshots()
            .insert("t", "order-1", &snapshot, None, now)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));

        let update = sqlx::query("UPDATE tax_snapshots SET tax_cents = 0")
            .execute(db.pool())
            .await;
        assert!(update.is_err());

        let delete = sqlx::query("DELETE FROM tax_snapshots").execute(db.pool()).await;
        assert!(delete.is_err());

        let stored = db.snapshots().get("t", "order-1").await.unwrap().unwrap();
        assert_eq!(stored.snapshot.totals.tax_cents, 600);
    }

    #[tokio::test]
    async fn test_list_closed_between() {
        let (db, snapshot) = setup().await;
        let day = |d| Utc.with_ymd_and_hms(2025, 5, d, 12, 0, 0).unwrap();

        for (order, d) in [("a", 1), ("b", 2), ("c", 3)] {
            db.snapshots().insert("t", order, &snapshot, None, day(d)).await.unwrap();
        }

        let listed = db.snapshots().list_closed_between("t", day(2), day(3)).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].order_id, "b");
    }
}
