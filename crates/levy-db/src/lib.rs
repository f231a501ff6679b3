//! # levy-db: Database Layer for Levy
//!
//! Persistence and order-close orchestration around the pure `levy-core`
//! engine. SQLite via sqlx, WAL mode, embedded migrations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Levy Data Flow                                   │
//! │                                                                         │
//! │  Order service (close order)                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐    │
//! │  │                     levy-db (THIS CRATE)                        │    │
//! │  │                                                                 │    │
//! │  │   ┌──────────────┐   ┌──────────────────┐   ┌──────────────┐    │    │
//! │  │   │ OrderCloser  │──►│ InvoiceSequencer │   │  Migrations  │    │    │
//! │  │   │ (service.rs) │   │ (sequencer.rs)   │   │  (embedded)  │    │    │
//! │  │   └──────┬───────┘   └────────┬─────────┘   └──────────────┘    │    │
//! │  │          │                    │                                 │    │
//! │  │          ▼                    ▼                                 │    │
//! │  │   ┌─────────────────────────────────────┐   ┌──────────────┐    │    │
//! │  │   │ Repositories                        │   │   Database   │    │    │
//! │  │   │ profiles · invoices · snapshots     │──►│   (pool.rs)  │    │    │
//! │  │   └─────────────────────────────────────┘   └──────────────┘    │    │
//! │  └─────────────────────────────────────────────────────────────────┘    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐    │
//! │  │                     SQLite Database (levy.db)                   │    │
//! │  └─────────────────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`config`] - `levy.toml` + environment configuration
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database and orchestration error types
//! - [`repository`] - Profiles, invoice counters, snapshots
//! - [`sequencer`] - Atomic invoice numbering with retry
//! - [`service`] - Order close
//!
//! ## Usage
//!
//! ```rust,ignore
//! use levy_db::{Database, EngineConfig};
//!
//! let config = EngineConfig::load(None)?;
//! let db = Database::new(config.db_config()).await?;
//!
//! let closed = db
//!     .order_closer(config.retry_policy())
//!     .close_order(config.default_tenant_id(), "order-42", &input, Utc::now())
//!     .await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod sequencer;
pub mod service;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::EngineConfig;
pub use error::{ConfigError, DbError, DbResult, EngineError, EngineResult};
pub use pool::{Database, DbConfig};
pub use sequencer::{InvoiceSequencer, RetryPolicy};
pub use service::{ClosedOrder, OrderCloser};

// Repository re-exports for convenience
pub use repository::invoice::{InvoiceRepository, IssuedInvoice};
pub use repository::profile::{ProfileVersion, TaxProfileRepository};
pub use repository::snapshot::{SnapshotRepository, StoredSnapshot};
