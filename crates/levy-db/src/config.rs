//! # Engine Configuration
//!
//! Runtime settings for the database layer and invoice sequencer.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                            │
//! │     LEVY_DATABASE_PATH=/var/lib/levy/levy.db                            │
//! │     LEVY_INVOICE_MAX_RETRIES=8                                          │
//! │                                                                         │
//! │  2. TOML Config File                                                    │
//! │     ~/.config/levy-engine/levy.toml (Linux)                             │
//! │     ~/Library/Application Support/com.levy.engine/levy.toml (macOS)     │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                    │
//! │     5 connections, 5 conflict retries, default tenant                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # levy.toml
//! [database]
//! path = "/var/lib/levy/levy.db"
//! max_connections = 5
//! busy_timeout_ms = 5000
//!
//! [invoice]
//! max_conflict_retries = 5
//! initial_backoff_ms = 10
//! max_backoff_ms = 500
//!
//! [tenant]
//! default_id = "00000000-0000-0000-0000-000000000001"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use levy_core::DEFAULT_TENANT_ID;

use crate::error::{ConfigError, ConfigResult};
use crate::pool::DbConfig;
use crate::sequencer::RetryPolicy;

// =============================================================================
// Database Settings
// =============================================================================

/// `[database]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file. Falls back to the platform data directory when unset.
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// How long a connection waits on SQLite's write lock before `SQLITE_BUSY`.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    5
}
fn default_min_connections() -> u32 {
    1
}
fn default_busy_timeout() -> u64 {
    5_000
}
fn default_connect_timeout() -> u64 {
    30
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            busy_timeout_ms: default_busy_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

// =============================================================================
// Invoice Settings
// =============================================================================

/// `[invoice]` section: how hard the sequencer fights for a contended counter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceSettings {
    /// Attempts after the first before giving up with a transient error.
    #[serde(default = "default_max_conflict_retries")]
    pub max_conflict_retries: u32,

    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

fn default_max_conflict_retries() -> u32 {
    levy_core::DEFAULT_MAX_CONFLICT_RETRIES
}
fn default_initial_backoff() -> u64 {
    10
}
fn default_max_backoff() -> u64 {
    500
}

impl Default for InvoiceSettings {
    fn default() -> Self {
        InvoiceSettings {
            max_conflict_retries: default_max_conflict_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

// =============================================================================
// Tenant Settings
// =============================================================================

/// `[tenant]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantSettings {
    /// Tenant used by single-restaurant deployments and the seed binary.
    #[serde(default = "default_tenant_id")]
    pub default_id: String,
}

fn default_tenant_id() -> String {
    DEFAULT_TENANT_ID.to_string()
}

impl Default for TenantSettings {
    fn default() -> Self {
        TenantSettings {
            default_id: default_tenant_id(),
        }
    }
}

// =============================================================================
// Engine Configuration
// =============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub invoice: InvoiceSettings,

    #[serde(default)]
    pub tenant: TenantSettings,
}

impl EngineConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (levy.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading engine config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load engine config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> ConfigResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| ConfigError::SaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Engine config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be greater than 0".into(),
            ));
        }
        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigError::Invalid(format!(
                "database.min_connections ({}) exceeds max_connections ({})",
                self.database.min_connections, self.database.max_connections
            )));
        }
        if self.invoice.max_conflict_retries == 0 {
            return Err(ConfigError::Invalid(
                "invoice.max_conflict_retries must be greater than 0".into(),
            ));
        }
        if self.invoice.initial_backoff_ms > self.invoice.max_backoff_ms {
            return Err(ConfigError::Invalid(
                "invoice.initial_backoff_ms must not exceed max_backoff_ms".into(),
            ));
        }
        levy_core::validation::validate_tenant_id(&self.tenant.default_id)
            .map_err(|e| ConfigError::Invalid(format!("tenant.default_id: {}", e)))?;

        Ok(())
    }

    /// Applies `LEVY_*` environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("LEVY_DATABASE_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = Some(PathBuf::from(path));
        }

        if let Some(max) = lookup("LEVY_DATABASE_MAX_CONNECTIONS") {
            match max.parse::<u32>() {
                Ok(n) => self.database.max_connections = n,
                Err(_) => warn!(value = %max, "Ignoring non-numeric LEVY_DATABASE_MAX_CONNECTIONS"),
            }
        }

        if let Some(id) = lookup("LEVY_TENANT_ID") {
            debug!(tenant_id = %id, "Overriding default tenant from environment");
            self.tenant.default_id = id;
        }

        if let Some(retries) = lookup("LEVY_INVOICE_MAX_RETRIES") {
            match retries.parse::<u32>() {
                Ok(n) => self.invoice.max_conflict_retries = n,
                Err(_) => warn!(value = %retries, "Ignoring non-numeric LEVY_INVOICE_MAX_RETRIES"),
            }
        }

        if let Some(ms) = lookup("LEVY_INVOICE_INITIAL_BACKOFF_MS") {
            if let Ok(ms) = ms.parse::<u64>() {
                self.invoice.initial_backoff_ms = ms;
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "levy", "engine")
            .map(|dirs| dirs.config_dir().join("levy.toml"))
    }

    /// Database file: the configured path, else `levy.db` in the platform data directory.
    pub fn database_path(&self) -> PathBuf {
        self.database.path.clone().unwrap_or_else(|| {
            directories::ProjectDirs::from("com", "levy", "engine")
                .map(|dirs| dirs.data_dir().join("levy.db"))
                .unwrap_or_else(|| PathBuf::from("levy.db"))
        })
    }

    // =========================================================================
    // Conversions
    // =========================================================================

    /// Pool settings for [`crate::Database::new`].
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(self.database_path())
            .max_connections(self.database.max_connections)
            .min_connections(self.database.min_connections)
            .busy_timeout(Duration::from_millis(self.database.busy_timeout_ms))
            .connect_timeout(Duration::from_secs(self.database.connect_timeout_secs))
    }

    /// Retry settings for [`crate::InvoiceSequencer`].
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_conflict_retries: self.invoice.max_conflict_retries,
            initial_backoff: Duration::from_millis(self.invoice.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.invoice.max_backoff_ms),
        }
    }

    pub fn default_tenant_id(&self) -> &str {
        &self.tenant.default_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.invoice.max_conflict_retries, 5);
        assert_eq!(config.default_tenant_id(), DEFAULT_TENANT_ID);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = EngineConfig::default();

        config.invoice.max_conflict_retries = 0;
        assert!(config.validate().is_err());
        config.invoice.max_conflict_retries = 3;

        config.database.max_connections = 0;
        assert!(config.validate().is_err());
        config.database.max_connections = 4;

        config.database.min_connections = 5;
        assert!(config.validate().is_err());
        config.database.min_connections = 1;

        config.invoice.initial_backoff_ms = 1_000;
        assert!(config.validate().is_err());
        config.invoice.initial_backoff_ms = 10;

        config.tenant.default_id = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("LEVY_DATABASE_PATH", "/tmp/levy-test.db"),
            ("LEVY_TENANT_ID", "tenant-b"),
            ("LEVY_INVOICE_MAX_RETRIES", "9"),
            ("LEVY_DATABASE_MAX_CONNECTIONS", "many"),
        ]
        .into_iter()
        .collect();

        let mut config = EngineConfig::default();
        config.apply_overrides_from(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.database_path(), PathBuf::from("/tmp/levy-test.db"));
        assert_eq!(config.default_tenant_id(), "tenant-b");
        assert_eq!(config.invoice.max_conflict_retries, 9);
        // Unparseable values leave the previous setting alone.
        assert_eq!(config.database.max_connections, 5);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            [invoice]
            max_conflict_retries = 7
            "#,
        )
        .unwrap();

        assert_eq!(config.invoice.max_conflict_retries, 7);
        assert_eq!(config.invoice.max_backoff_ms, 500);
        assert_eq!(config.database.busy_timeout_ms, 5_000);
        assert_eq!(config.tenant.default_id, DEFAULT_TENANT_ID);
    }

    #[test]
    fn test_toml_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("levy.toml");

        let mut config = EngineConfig::default();
        config.database.path = Some(dir.path().join("levy.db"));
        config.invoice.max_conflict_retries = 6;
        config.save(Some(path.clone())).unwrap();

        let loaded: EngineConfig =
            toml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_conversions() {
        let mut config = EngineConfig::default();
        config.database.path = Some(PathBuf::from("/tmp/x.db"));
        config.database.busy_timeout_ms = 250;

        let db = config.db_config();
        assert_eq!(db.database_path, PathBuf::from("/tmp/x.db"));
        assert_eq!(db.busy_timeout, Duration::from_millis(250));

        let retry = config.retry_policy();
        assert_eq!(retry.max_conflict_retries, 5);
        assert_eq!(retry.initial_backoff, Duration::from_millis(10));
    }
}
