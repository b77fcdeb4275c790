//! # comanda-db: Database Layer for Comanda
//!
//! Persistence for the settlement engine: SQLite via sqlx, with every
//! concurrency guard the engine relies on expressed as a database
//! primitive rather than an in-process lock.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Comanda Data Flow                                 │
//! │                                                                         │
//! │  comanda-checkout (TabService, SettlementCoordinator)                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   comanda-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐    ┌──────────────┐ │   │
//! │  │   │   Database    │    │  Repositories  │    │  Migrations  │ │   │
//! │  │   │   (pool.rs)   │    │ orders, cash,  │    │  (embedded)  │ │   │
//! │  │   │               │    │ customers,     │    │              │ │   │
//! │  │   │ SqlitePool    │◄───│ tables,        │    │ 001_init.sql │ │   │
//! │  │   │ WAL + FK on   │    │ products       │    │              │ │   │
//! │  │   └───────────────┘    └────────────────┘    └──────────────┘ │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite database file (or :memory: in tests)                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Concurrency Guards
//!
//! There is no lock server; multiple terminals hit this store at once.
//! The guards are:
//!
//! - **one open order per table**: partial unique index, races resolve
//!   at insert time
//! - **order version token**: line-item mutations are guarded updates
//!   (`WHERE version = ?`); stale writers get [`DbError::Conflict`]
//! - **cash session singleton**: partial unique index on open status
//! - **settlement idempotency**: `(attempt_id, seq)` unique keys on debt
//!   entries and cash transactions make replays no-ops
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::cash::{CashRepository, RecordOutcome};
pub use repository::customer::CustomerRepository;
pub use repository::order::{OrderRepository, RemoveOutcome, SettleOutcome};
pub use repository::product::ProductRepository;
pub use repository::table::TableRepository;
