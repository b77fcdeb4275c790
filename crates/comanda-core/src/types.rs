//! # Domain Types
//!
//! Core domain types for the settlement engine.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌──────────────────┐      │
//! │  │   DiningTable   │   │      Order      │   │  OrderLineItem   │      │
//! │  │  ─────────────  │   │  ─────────────  │   │  ──────────────  │      │
//! │  │  id (UUID)      │◄──│  table_id (FK)  │◄──│  order_id (FK)   │      │
//! │  │  number         │   │  status         │   │  qty, snapshot   │      │
//! │  │  status         │   │  total_cents    │   │  total_cents     │      │
//! │  └─────────────────┘   └─────────────────┘   └──────────────────┘      │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌──────────────────┐      │
//! │  │   CashSession   │   │ CashTransaction │   │    DebtEntry     │      │
//! │  │  ─────────────  │   │  ─────────────  │   │  ──────────────  │      │
//! │  │  opening float  │◄──│  session (FK)   │   │  customer (FK)   │      │
//! │  │  Open | Closed  │   │  Sale/In/Out    │   │  order (FK)      │      │
//! │  └─────────────────┘   └─────────────────┘   └──────────────────┘      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every entity has a UUID v4 `id` (immutable, used for relations) and,
//! where one exists, a human-facing business key (table number).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;

// =============================================================================
// Table
// =============================================================================

/// Occupancy status of a physical table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    /// No open order references this table.
    Free,
    /// An open order is running on this table.
    Occupied,
}

/// A physical seating unit.
///
/// Invariant: at most one *open* [`Order`] may reference a table at a time
/// (enforced by the database layer). Tables are created at provisioning
/// time and never destroyed while historical orders reference them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct DiningTable {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Numeric label painted on the actual table.
    pub number: i64,

    pub status: TableStatus,

    /// Optional guest name noted when the table was occupied.
    pub guest_name: Option<String>,

    /// When the current occupancy started (None while free).
    pub opened_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Order Status
// =============================================================================

/// Lifecycle status of an order (one tab).
///
/// Legal transitions: `Open → Settled` and `Open → Voided`, both terminal.
/// An empty open order is *deleted* (abandoned), which is neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Items are being added; the table is occupied.
    Open,
    /// Fully paid and closed.
    Settled,
    /// Cancelled by staff override.
    Voided,
}

impl Default for OrderStatus {
    fn default() -> Self {
        OrderStatus::Open
    }
}

// =============================================================================
// Order
// =============================================================================

/// One tab: the running bill for one occupied table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Order {
    pub id: String,

    /// The table this tab runs on.
    pub table_id: String,

    /// Linked customer. Set during settlement only when exactly one
    /// customer received a deferred-credit posting; stays None otherwise.
    pub customer_id: Option<String>,

    pub status: OrderStatus,

    /// Derived, never authoritative: always recomputed from line items.
    pub total_cents: i64,

    /// Instrument kind carrying the largest share of the settlement,
    /// recorded for reporting (e.g. "cash", "deferred_credit").
    pub payment_label: Option<String>,

    /// Attempt identifier of the settlement that closed this order.
    /// Lets a retried attempt recognize its own completed work.
    pub settle_attempt_id: Option<String>,

    /// Optimistic concurrency token. Incremented on every line-item
    /// mutation; stale writers are rejected.
    pub version: i64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Returns the derived total as Money.
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

// =============================================================================
// Order Line Item
// =============================================================================

/// A line item in an order.
/// Uses the snapshot pattern to freeze product data at time of first add.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct OrderLineItem {
    pub id: String,
    pub order_id: String,
    pub product_id: String,

    /// Product name at time of add (frozen).
    pub name_snapshot: String,

    /// Unit price in centavos at time of add (frozen). Later catalog price
    /// changes never touch an open tab.
    pub unit_price_cents: i64,

    /// Quantity ordered (always positive; the row is deleted at zero).
    pub quantity: i64,

    /// Extended price = unit price × quantity. Recomputed on every
    /// mutation, never edited independently.
    pub total_cents: i64,

    pub created_at: DateTime<Utc>,
}

impl OrderLineItem {
    /// Returns the frozen unit price as Money.
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    /// Returns the extended price as Money.
    #[inline]
    pub fn extended_price(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

// =============================================================================
// Payment Instruments
// =============================================================================

/// A payment instrument declared during settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum PaymentKind {
    /// Physical cash into the drawer.
    Cash,
    /// Card on an external terminal.
    Card,
    /// Instant bank transfer (Pix-style).
    InstantTransfer,
    /// Store tab: collection deferred to the customer's debt ledger.
    DeferredCredit,
}

impl PaymentKind {
    /// Stable lowercase label used for reporting on settled orders.
    pub fn label(&self) -> &'static str {
        match self {
            PaymentKind::Cash => "cash",
            PaymentKind::Card => "card",
            PaymentKind::InstantTransfer => "instant_transfer",
            PaymentKind::DeferredCredit => "deferred_credit",
        }
    }

    /// Whether this instrument produces a cash-drawer movement.
    ///
    /// Everything except deferred credit is cash-equivalent for daily
    /// reconciliation purposes: it was collected during the shift.
    #[inline]
    pub fn is_cash_equivalent(&self) -> bool {
        !matches!(self, PaymentKind::DeferredCredit)
    }
}

/// One declared payment within a settlement attempt.
///
/// Allocations live only in the in-memory working set until the
/// Settlement Coordinator commits; an abandoned checkout discards them
/// with no durable effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentAllocation {
    pub kind: PaymentKind,

    /// Amount in centavos (positive, ≤ remaining balance at declaration).
    pub amount_cents: i64,

    /// Required for `DeferredCredit`, meaningless otherwise.
    pub customer_id: Option<String>,
}

impl PaymentAllocation {
    /// Convenience constructor for cash-equivalent instruments.
    pub fn immediate(kind: PaymentKind, amount_cents: i64) -> Self {
        PaymentAllocation {
            kind,
            amount_cents,
            customer_id: None,
        }
    }

    /// Convenience constructor for a store-tab allocation.
    pub fn deferred(amount_cents: i64, customer_id: impl Into<String>) -> Self {
        PaymentAllocation {
            kind: PaymentKind::DeferredCredit,
            amount_cents,
            customer_id: Some(customer_id.into()),
        }
    }

    /// Returns the amount as Money.
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

// =============================================================================
// Catalog & Customers (external collaborator shapes)
// =============================================================================

/// A product as seen by the Line-Item Ledger.
///
/// The catalog itself is an external collaborator; this is the read shape
/// used to snapshot prices onto order lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Product {
    pub id: String,
    pub name: String,
    pub price_cents: i64,
    /// Inactive products cannot be added to tabs (soft delete).
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Product {
    /// Returns the current catalog price as Money.
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }
}

/// A customer record with their running debt balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub phone: Option<String>,

    /// Advisory ceiling shown to staff. Never a hard gate: refusing a
    /// regular mid-transaction is a business decision, not a system one.
    pub credit_limit_cents: i64,

    /// Running debt balance, increased by deferred-credit settlements.
    pub balance_cents: i64,

    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Customer {
    /// Returns the running balance as Money.
    #[inline]
    pub fn balance(&self) -> Money {
        Money::from_cents(self.balance_cents)
    }

    /// True when a further posting of `amount` would exceed the advisory
    /// limit. Informational only.
    pub fn would_exceed_limit(&self, amount: Money) -> bool {
        self.credit_limit_cents > 0
            && self.balance_cents + amount.cents() > self.credit_limit_cents
    }
}

/// One posted deferred-credit amount: customer, order, and the settlement
/// attempt that produced it. Append-only; the audit trail behind the
/// running balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct DebtEntry {
    pub id: String,
    pub customer_id: String,
    pub order_id: String,
    pub amount_cents: i64,

    /// Settlement attempt that wrote this entry.
    pub attempt_id: String,
    /// Position of the allocation within its attempt.
    pub seq: i64,

    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Cash Drawer
// =============================================================================

/// Status of a cash drawer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum CashSessionStatus {
    Open,
    Closed,
}

/// One shift's register.
///
/// Invariant: at most one `Open` session system-wide; once `Closed`,
/// immutable and no further transactions may reference it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct CashSession {
    pub id: String,

    /// Staff member who opened the drawer.
    pub opened_by: String,
    /// Staff member who closed it (None while open).
    pub closed_by: Option<String>,

    /// Manually counted float placed in the drawer at open.
    pub opening_float_cents: i64,

    /// Expected balance snapshotted at close (None while open):
    /// opening float + Σ Sale + Σ ManualInflow − Σ ManualOutflow.
    pub closing_balance_cents: Option<i64>,

    pub status: CashSessionStatus,

    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

/// Kind of movement within a cash session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum CashTransactionKind {
    /// Cash-equivalent payment collected for a settled order.
    Sale,
    /// Money added to the drawer outside a sale (extra change, etc.).
    ManualInflow,
    /// Money removed from the drawer (supplier payment, skim to safe).
    ManualOutflow,
}

/// One immutable movement within a cash session.
///
/// Only ever appended, never edited or deleted: the session's expected
/// balance is re-derived by summation so a crash mid-write can never
/// corrupt a running total.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct CashTransaction {
    pub id: String,
    pub session_id: String,
    pub kind: CashTransactionKind,

    /// Amount in centavos (always positive; direction comes from `kind`).
    pub amount_cents: i64,

    pub description: String,

    /// Staff member who caused the movement.
    pub actor_id: String,

    /// For `Sale` entries: the settled order this movement belongs to.
    pub order_id: Option<String>,

    /// Settlement idempotency tags (None for manual movements).
    pub attempt_id: Option<String>,
    pub seq: Option<i64>,

    pub created_at: DateTime<Utc>,
}

impl CashTransaction {
    /// Returns the movement amount as Money.
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }

    /// Signed contribution of this movement to the expected balance.
    pub fn signed_cents(&self) -> i64 {
        match self.kind {
            CashTransactionKind::Sale | CashTransactionKind::ManualInflow => self.amount_cents,
            CashTransactionKind::ManualOutflow => -self.amount_cents,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
