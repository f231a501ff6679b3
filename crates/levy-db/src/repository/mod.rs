//! # Repository Module
//!
//! Database repository implementations for the tax engine.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern                                   │
//! │                                                                         │
//! │  OrderCloser / admin tooling                                            │
//! │       │                                                                 │
//! │       │  db.profiles().get_active(tenant_id)                            │
//! │       ▼                                                                 │
//! │  TaxProfileRepository                                                   │
//! │  ├── create_version(&self, tenant_id, profile)                          │
//! │  ├── activate(&self, tenant_id, profile_id)                             │
//! │  └── get_active(&self, tenant_id)                                       │
//! │       │                                                                 │
//! │       │  SQL Query                                                      │
//! │       ▼                                                                 │
//! │  SQLite Database                                                        │
//! │                                                                         │
//! │  SQL lives only in this module; callers see levy-core types.            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`TaxProfileRepository`](profile::TaxProfileRepository) - Profile versions and the active pointer
//! - [`InvoiceRepository`](invoice::InvoiceRepository) - Counters and issued numbers
//! - [`SnapshotRepository`](snapshot::SnapshotRepository) - Frozen snapshots

pub mod invoice;
pub mod profile;
pub mod snapshot;
