//! # comanda-checkout: Tab & Settlement Orchestration
//!
//! The flow layer of the settlement engine: everything between "a waiter
//! taps a product" and "the table is free and every ledger agrees".
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  comanda-checkout (THIS CRATE)                          │
//! │                                                                         │
//! │   ┌─────────────┐     ┌───────────────────────┐     ┌──────────────┐  │
//! │   │  TabService │     │ SettlementCoordinator │     │   Notifier   │  │
//! │   │  (tab.rs)   │     │    (settlement.rs)    │────►│  (notify.rs) │  │
//! │   │             │     │                       │     │              │  │
//! │   │ add_unit    │     │ validate → post debts │     │ DebtNotice   │  │
//! │   │ remove_unit │     │ → cash log → settle   │     │ LogNotifier  │  │
//! │   │ abandon     │     │ → free table → notify │     │              │  │
//! │   └──────┬──────┘     └───────────┬───────────┘     └──────────────┘  │
//! │          │                        │                                    │
//! │          └──────────┬─────────────┘                                    │
//! │                     ▼                                                  │
//! │               comanda-db (repositories, CAS, idempotency keys)         │
//! │                     ▼                                                  │
//! │               comanda-core (Money, AllocationSet, validation)          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## The Consistency Story
//!
//! Orders, the debt ledger, and the cash log share no transaction, so the
//! coordinator cannot rely on atomicity across them. Instead every
//! settlement write is idempotent under a per-attempt `(attempt_id, seq)`
//! key, and the attempt is simply replayed until it completes. See
//! [`settlement`] for the full commit sequence.
//!
//! ## Modules
//!
//! - [`tab`] - Line-item ledger flow (add/remove one unit, abandon, void)
//! - [`drawer`] - Shift session open/close and manual movements
//! - [`settlement`] - The Settlement Coordinator and its outcome types
//! - [`notify`] - Debt notification boundary
//! - [`error`] - Checkout error types

pub mod drawer;
pub mod error;
pub mod notify;
pub mod settlement;
pub mod tab;

pub use drawer::DrawerService;
pub use error::{CheckoutError, CheckoutResult};
pub use notify::{DebtNotice, LogNotifier, Notifier};
pub use settlement::{CashLedger, DebtPosting, SettlementCoordinator, SettlementOutcome};
pub use tab::TabService;
