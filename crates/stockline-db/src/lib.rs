//! # stockline-db: Persistence and Stock Engines for Stockline
//!
//! This crate owns everything that touches SQLite: the pool, migrations,
//! the unit of work, the stock store and ledger, and the engines that move
//! stock between locations and sell it.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Stockline Data Flow                              │
//! │                                                                         │
//! │  Request layer (HTTP, auth, UI)                                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  stockline-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   TransferEngine ──┐                     ReportAggregator      │   │
//! │  │   CheckoutEngine ──┼─► StockMutationRecorder     │ (reads)     │   │
//! │  │                    │        │                    │             │   │
//! │  │                    │        ├─► LocationStockStore ◄──┤         │   │
//! │  │                    │        └─► StockLedger ◄─────────┘         │   │
//! │  │                    │                                            │   │
//! │  │                    └─► all inside one UnitOfWork               │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  SQLite (WAL): stock_levels, stock_mutations, transactions     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool, `Database` handle
//! - [`config`] - Environment-driven configuration
//! - [`migrations`] - Embedded database migrations
//! - [`unit_of_work`] - Explicit atomic units
//! - [`repository`] - Registries, stock store, ledger, transactions
//! - [`engine`] - Recorder, transfers, checkout, reports
//! - [`error`] - Database error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use stockline_core::{Location, TransferRequest};
//! use stockline_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("stockline.db")).await?;
//!
//! let receipt = db
//!     .transfers()
//!     .assign_to_merchant("W-1", "M-1", &TransferRequest::new("P-1", 30, "alice"))
//!     .await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod engine;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod unit_of_work;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{ConfigError, LedgerConfig};
pub use error::{DbError, DbResult};
pub use pool::{CheckoutPolicy, Database, DbConfig};
pub use unit_of_work::UnitOfWork;

pub use engine::checkout::CheckoutEngine;
pub use engine::recorder::StockMutationRecorder;
pub use engine::report::ReportAggregator;
pub use engine::transfer::TransferEngine;

// Repository re-exports for convenience
pub use repository::catalog::{LocationRepository, ProductRepository};
pub use repository::ledger::StockLedger;
pub use repository::stock::LocationStockStore;
pub use repository::transaction::TransactionRepository;
