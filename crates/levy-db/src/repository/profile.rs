//! # Tax Profile Repository
//!
//! Versioned tax profiles and the per-tenant active pointer.
//!
//! ## Versioning
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Profile Versions                                  │
//! │                                                                         │
//! │  tax_profiles (immutable rows)          active_tax_profiles             │
//! │  ┌──────────┬─────────┬──────────┐      ┌──────────┬────────────┐       │
//! │  │ tenant   │ version │ id       │      │ tenant   │ profile_id │       │
//! │  ├──────────┼─────────┼──────────┤      ├──────────┼────────────┤       │
//! │  │ t-1      │ 1       │ 7c1e...  │      │ t-1      │ 9a04...  ──┼──┐    │
//! │  │ t-1      │ 2       │ 9a04... ◄┼──────┼──────────┴────────────┘  │    │
//! │  └──────────┴─────────┴──────────┘      └──────────────────────────┘    │
//! │                                                                         │
//! │  create_version() stores a new row, never edits an old one.             │
//! │  activate() moves the pointer. An order close that already loaded       │
//! │  version 1 keeps calculating with version 1.                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

use levy_core::validation::{validate_tax_profile, validate_tenant_id, validate_uuid};
use levy_core::TaxProfile;

use crate::error::{DbError, DbResult, EngineResult};

/// One stored profile version, without its document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileVersion {
    pub id: String,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub active: bool,
}

/// Repository for tax profile versions.
#[derive(Debug, Clone)]
pub struct TaxProfileRepository {
    pool: SqlitePool,
}

impl TaxProfileRepository {
    /// Creates a new TaxProfileRepository.
    pub fn new(pool: SqlitePool) -> Self {
        TaxProfileRepository { pool }
    }

    /// Validates `profile` and stores it as the tenant's next version.
    ///
    /// The returned copy carries the assigned `id` (UUID v4) and `version`.
    /// The new version is not active until [`activate`](Self::activate).
    pub async fn create_version(
        &self,
        tenant_id: &str,
        profile: &TaxProfile,
    ) -> EngineResult<TaxProfile> {
        validate_tenant_id(tenant_id)?;
        validate_tax_profile(profile)?;

        let mut stored = profile.clone();
        stored.id = Uuid::new_v4().to_string();
        let now = Utc::now();

        // The INSERT takes the write lock, so the MAX(version) it reads cannot
        // be raced by another writer before the document is filled in.
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;

        let version: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO tax_profiles (id, tenant_id, version, document, created_at)
            SELECT ?1, ?2, COALESCE(MAX(version), 0) + 1, '{}', ?3
            FROM tax_profiles
            WHERE tenant_id = ?2
            RETURNING version
            "#,
        )
        .bind(&stored.id)
        .bind(tenant_id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(DbError::from)?;

        stored.version = version;
        let document = serde_json::to_string(&stored)
            .map_err(|e| DbError::serialization("tax profile", e))?;

        sqlx::query("UPDATE tax_profiles SET document = ?1 WHERE id = ?2")
            .bind(&document)
            .bind(&stored.id)
            .execute(&mut *tx)
            .await
            .map_err(DbError::from)?;

        tx.commit().await.map_err(DbError::from)?;

        info!(tenant_id, profile_id = %stored.id, version, "Stored tax profile version");
        Ok(stored)
    }

    /// Points the tenant's active profile at `profile_id`.
    ///
    /// The profile must belong to the same tenant.
    pub async fn activate(&self, tenant_id: &str, profile_id: &str) -> DbResult<()> {
        if validate_uuid(profile_id).is_err() {
            return Err(DbError::not_found("TaxProfile", profile_id));
        }

        let owner: Option<String> =
            sqlx::query_scalar("SELECT tenant_id FROM tax_profiles WHERE id = ?1")
                .bind(profile_id)
                .fetch_optional(&self.pool)
                .await?;

        match owner {
            Some(owner) if owner == tenant_id => {}
            _ => return Err(DbError::not_found("TaxProfile", profile_id)),
        }

        sqlx::query(
            r#"
            INSERT INTO active_tax_profiles (tenant_id, profile_id, activated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (tenant_id) DO UPDATE SET
                profile_id = excluded.profile_id,
                activated_at = excluded.activated_at
            "#,
        )
        .bind(tenant_id)
        .bind(profile_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        info!(tenant_id, profile_id, "Activated tax profile");
        Ok(())
    }

    /// The tenant's active profile, if one has been activated.
    pub async fn get_active(&self, tenant_id: &str) -> DbResult<Option<TaxProfile>> {
        let row: Option<(String, i64, String)> = sqlx::query_as(
            r#"
            SELECT p.id, p.version, p.document
            FROM active_tax_profiles a
            JOIN tax_profiles p ON p.id = a.profile_id
            WHERE a.tenant_id = ?1
            "#,
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        debug!(tenant_id, found = row.is_some(), "Loaded active tax profile");
        row.map(decode_profile).transpose()
    }

    /// Gets a stored profile version by ID.
    pub async fn get_by_id(&self, profile_id: &str) -> DbResult<Option<TaxProfile>> {
        let row: Option<(String, i64, String)> =
            sqlx::query_as("SELECT id, version, document FROM tax_profiles WHERE id = ?1")
                .bind(profile_id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(decode_profile).transpose()
    }

    /// All versions stored for a tenant, newest first.
    pub async fn list_versions(&self, tenant_id: &str) -> DbResult<Vec<ProfileVersion>> {
        let rows: Vec<(String, i64, DateTime<Utc>, bool)> = sqlx::query_as(
            r#"
            SELECT p.id, p.version, p.created_at, a.profile_id IS NOT NULL
            FROM tax_profiles p
            LEFT JOIN active_tax_profiles a
                ON a.tenant_id = p.tenant_id AND a.profile_id = p.id
            WHERE p.tenant_id = ?1
            ORDER BY p.version DESC
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, version, created_at, active)| ProfileVersion {
                id,
                version,
                created_at,
                active,
            })
            .collect())
    }
}

/// Row columns are authoritative for identity.
fn decode_profile((id, version, document): (String, i64, String)) -> DbResult<TaxProfile> {
    let mut profile: TaxProfile =
        serde_json::from_str(&document).map_err(|e| DbError::serialization("tax profile", e))?;
    profile.id = id;
    profile.version = version;
    Ok(profile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::pool::{Database, DbConfig};
    use levy_core::{ConfigurationError, CoreError, TaxRateRule};

    async fn repo() -> TaxProfileRepository {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.profiles()
    }

    fn sample(rate_bps: i32) -> TaxProfile {
        let mut profile = TaxProfile::new("PH", "PHP");
        profile.rates.push(TaxRateRule::all("std", "VAT", rate_bps));
        profile
    }

    #[tokio::test]
    async fn test_versions_are_sequential_per_tenant() {
        let repo = repo().await;

        let v1 = repo.create_version("tenant-a", &sample(1200)).await.unwrap();
        let v2 = repo.create_version("tenant-a", &sample(1000)).await.unwrap();
        let other = repo.create_version("tenant-b", &sample(500)).await.unwrap();

        assert_eq!(v1.version, 1);
        assert_eq!(v2.version, 2);
        assert_eq!(other.version, 1);
        assert_ne!(v1.id, v2.id);

        let loaded = repo.get_by_id(&v2.id).await.unwrap().unwrap();
        assert_eq!(loaded, v2);
    }

    #[tokio::test]
    async fn test_activation_moves_pointer() {
        let repo = repo().await;
        assert!(repo.get_active("tenant-a").await.unwrap().is_none());

        let v1 = repo.create_version("tenant-a", &sample(1200)).await.unwrap();
        let v2 = repo.create_version("tenant-a", &sample(1000)).await.unwrap();

        repo.activate("tenant-a", &v1.id).await.unwrap();
        assert_eq!(repo.get_active("tenant-a").await.unwrap().unwrap().version, 1);

        repo.activate("tenant-a", &v2.id).await.unwrap();
        let active = repo.get_active("tenant-a").await.unwrap().unwrap();
        assert_eq!(active.id, v2.id);
        assert_eq!(active.rates[0].rate_bps, 1000);

        let versions = repo.list_versions("tenant-a").await.unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].version, 2);
        assert!(versions[0].active);
        assert!(!versions[1].active);
    }

    #[tokio::test]
    async fn test_activate_rejects_foreign_profile() {
        let repo = repo().await;
        let theirs = repo.create_version("tenant-b", &sample(1200)).await.unwrap();

        let err = repo.activate("tenant-a", &theirs.id).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));

        let err = repo.activate("tenant-a", "missing").await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_invalid_profile_is_not_stored() {
        let repo = repo().await;
        let err = repo.create_version("tenant-a", &sample(-5)).await.unwrap_err();

        assert!(matches!(
            err,
            EngineError::Core(CoreError::Configuration(ConfigurationError::NegativeBps { .. }))
        ));
        assert!(repo.list_versions("tenant-a").await.unwrap().is_empty());
    }
}
