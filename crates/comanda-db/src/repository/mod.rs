//! # Repository Module
//!
//! Database repository implementations for the settlement engine.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern Explained                         │
//! │                                                                         │
//! │  The Repository pattern abstracts database access behind a clean API.  │
//! │                                                                         │
//! │  SettlementCoordinator                                                 │
//! │       │                                                                 │
//! │       │  db.customers().post_debt(...)                                 │
//! │       ▼                                                                 │
//! │  CustomerRepository                                                    │
//! │  ├── get_by_id(&self, id)                                              │
//! │  ├── post_debt(&self, ...)  ← idempotent, transactional               │
//! │  └── balance(&self, id)                                                │
//! │       │                                                                 │
//! │       │  SQL Query                                                      │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! │                                                                         │
//! │  Benefits:                                                              │
//! │  • SQL (and every CAS guard) isolated in one place                     │
//! │  • Clean separation of concerns                                        │
//! │  • Easy to test against an in-memory database                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`table::TableRepository`] - Table occupancy transitions
//! - [`order::OrderRepository`] - Orders, line items, settle CAS
//! - [`customer::CustomerRepository`] - Customers and the debt ledger
//! - [`cash::CashRepository`] - Drawer sessions and the movement log
//! - [`product::ProductRepository`] - Catalog boundary

pub mod cash;
pub mod customer;
pub mod order;
pub mod product;
pub mod table;
