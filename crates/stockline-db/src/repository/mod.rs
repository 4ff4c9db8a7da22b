//! # Repository Module
//!
//! Storage-facing building blocks for the stock engines.
//!
//! ## Two Kinds of Methods
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Pool-scoped reads                 Unit-scoped reads/writes             │
//! │  ─────────────────                 ────────────────────────             │
//! │  repo.get(...)                     repo.get_within(&mut uow, ...)       │
//! │  repo.history(...)                 repo.compare_and_decrement(...)      │
//! │       │                            repo.append(&mut uow, ...)           │
//! │       ▼                                   │                             │
//! │  any pooled connection             the unit's own SQLite transaction    │
//! │                                                                         │
//! │  Every write to stock_levels, stock_mutations and transactions goes   │
//! │  through a UnitOfWork; there is no pool-scoped stock writer.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`ProductRepository`](catalog::ProductRepository) - Products and prices
//! - [`LocationRepository`](catalog::LocationRepository) - Warehouses and merchants
//! - [`LocationStockStore`](stock::LocationStockStore) - Current quantity per location
//! - [`StockLedger`](ledger::StockLedger) - Append-only mutation log
//! - [`TransactionRepository`](transaction::TransactionRepository) - Sales and lines

pub mod catalog;
pub mod ledger;
pub mod stock;
pub mod transaction;
