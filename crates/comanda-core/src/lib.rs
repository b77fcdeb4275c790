//! # comanda-core: Pure Business Logic for Comanda
//!
//! This crate is the **heart** of the settlement engine. It contains all
//! business logic as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Comanda Architecture                              │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 comanda-checkout (Flows)                        │   │
//! │  │    TabService ──► AllocationSet ──► SettlementCoordinator      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ comanda-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌────────────┐  ┌───────────┐ │   │
//! │  │   │   types   │  │   money   │  │ allocation │  │ validation│ │   │
//! │  │   │  Order    │  │   Money   │  │ Allocation │  │   rules   │ │   │
//! │  │   │  Table    │  │  centavos │  │    Set     │  │  checks   │ │   │
//! │  │   └───────────┘  └───────────┘  └────────────┘  └───────────┘ │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                  comanda-db (Database Layer)                    │   │
//! │  │           SQLite queries, migrations, repositories              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Order, DiningTable, CashSession, etc.)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`allocation`] - Split-payment staging and balance checks
//! - [`error`] - Domain error types
//! - [`validation`] - Business rule validation
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: Every function is deterministic - same input = same output
//! 2. **No I/O**: Database, network, file system access is FORBIDDEN here
//! 3. **Integer Money**: All monetary values are centavos (i64) to avoid float errors
//! 4. **Explicit Errors**: All errors are typed, never strings or panics

// =============================================================================
// Module Declarations
// =============================================================================

pub mod allocation;
pub mod error;
pub mod money;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use comanda_core::Money` instead of
// `use comanda_core::money::Money`

pub use allocation::{primary_label, validate_allocations, AllocationSet};
pub use error::{CoreError, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Tolerance, in centavos, when comparing an allocation sum to an order total.
///
/// ## Why an epsilon at all?
/// Money is integer centavos so sums are exact, but external callers may
/// stage amounts rounded from display values. One centavo of slack absorbs
/// that without ever letting a visibly short payment through.
pub const ALLOCATION_EPSILON_CENTS: i64 = 1;

/// Maximum quantity of a single product on one order line.
///
/// ## Business Reason
/// Prevents accidental over-ordering (e.g., a stuck repeat-add) from
/// producing absurd tabs. Configurable per venue in future versions.
pub const MAX_LINE_QUANTITY: i64 = 999;

/// Maximum number of distinct line items on one order.
pub const MAX_ORDER_LINES: usize = 100;

/// How many times the Settlement Coordinator replays one attempt id before
/// escalating a partial failure to the caller.
pub const MAX_SETTLEMENT_RETRIES: u32 = 3;
