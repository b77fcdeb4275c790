//! # Tab Service
//!
//! The Line-Item Ledger flow: one unit added or removed per call, the way
//! staff actually work a table.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  add_unit(table, product)                                               │
//! │    ├── no open order → open order (CAS) + occupy table                  │
//! │    └── open order    → fold into existing line / append new line        │
//! │                         total republished as Σ(qty × snapshot price)    │
//! │                                                                         │
//! │  remove_unit(table, product)                                            │
//! │    ├── qty > 1           → decrement                                    │
//! │    ├── qty = 1           → delete line                                  │
//! │    ├── last line deleted → ABANDON: delete order, free table            │
//! │    └── no such line      → no-op                                        │
//! │                                                                         │
//! │  Every mutation carries the order version it read; a stale version is   │
//! │  re-fetched and retried here, bounded, so two waiters on one table      │
//! │  both land without either clobbering the other.                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use tracing::{debug, warn};

use comanda_core::{CoreError, Order, OrderLineItem, MAX_LINE_QUANTITY, MAX_ORDER_LINES};
use comanda_db::{Database, DbError, RemoveOutcome};

use crate::error::{CheckoutError, CheckoutResult};

/// How many times a lost version CAS is retried before giving up.
const MAX_MUTATION_RETRIES: u32 = 5;

/// Tab (running bill) lifecycle service.
#[derive(Debug, Clone)]
pub struct TabService {
    db: Database,
}

impl TabService {
    /// Creates a new TabService.
    pub fn new(db: Database) -> Self {
        TabService { db }
    }

    /// Returns the open order and its items for a table, if any.
    pub async fn tab(&self, table_id: &str) -> CheckoutResult<Option<(Order, Vec<OrderLineItem>)>> {
        match self.db.orders().get_open_by_table(table_id).await? {
            None => Ok(None),
            Some(order) => {
                let items = self.db.orders().items(&order.id).await?;
                Ok(Some((order, items)))
            }
        }
    }

    /// Adds one unit of a product to a table's tab.
    ///
    /// First add on a free table opens the order and occupies the table,
    /// noting `guest_name` if given. Returns the order with its
    /// republished total.
    pub async fn add_unit(
        &self,
        table_id: &str,
        product_id: &str,
        guest_name: Option<&str>,
    ) -> CheckoutResult<Order> {
        // Price and name are snapshotted from the catalog as of this call
        let product = self.db.products().get_active(product_id).await?;

        for attempt in 0..MAX_MUTATION_RETRIES {
            let order = match self.db.orders().get_open_by_table(table_id).await? {
                Some(order) => order,
                None => match self.open_tab(table_id, guest_name).await {
                    Ok(order) => order,
                    // Lost the open race to another terminal; their order
                    // is the one to add to.
                    Err(CheckoutError::Db(DbError::Conflict { .. })) => continue,
                    Err(e) => return Err(e),
                },
            };

            self.check_line_caps(&order, product_id).await?;

            match self
                .db
                .orders()
                .add_unit(&order.id, &product, order.version)
                .await
            {
                Ok(updated) => return Ok(updated),
                Err(DbError::Conflict { .. }) => {
                    debug!(
                        table_id = %table_id,
                        order_id = %order.id,
                        attempt,
                        "add_unit lost version CAS, retrying"
                    );
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(CheckoutError::ContentionExhausted {
            entity: "Order",
            attempts: MAX_MUTATION_RETRIES,
        })
    }

    /// Removes one unit of a product from a table's tab.
    ///
    /// Returns the updated order, or `None` when the tab no longer exists:
    /// either there was nothing open on the table, or the last unit was
    /// removed and the order was abandoned (deleted, table freed).
    pub async fn remove_unit(
        &self,
        table_id: &str,
        product_id: &str,
    ) -> CheckoutResult<Option<Order>> {
        for attempt in 0..MAX_MUTATION_RETRIES {
            let order = match self.db.orders().get_open_by_table(table_id).await? {
                // Nothing open: removing from nothing is a no-op
                None => return Ok(None),
                Some(order) => order,
            };

            match self
                .db
                .orders()
                .remove_unit(&order.id, product_id, order.version)
                .await
            {
                Ok(RemoveOutcome::Removed) => {
                    return Ok(Some(self.db.orders().get_by_id(&order.id).await?));
                }
                Ok(RemoveOutcome::NoLineItem) => {
                    return Ok(Some(order));
                }
                Ok(RemoveOutcome::OrderEmptied) => {
                    self.abandon(&order).await?;
                    return Ok(None);
                }
                Err(DbError::Conflict { .. }) => {
                    debug!(
                        table_id = %table_id,
                        order_id = %order.id,
                        attempt,
                        "remove_unit lost version CAS, retrying"
                    );
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(CheckoutError::ContentionExhausted {
            entity: "Order",
            attempts: MAX_MUTATION_RETRIES,
        })
    }

    /// Voids a table's open tab (staff override) and frees the table.
    ///
    /// Nothing is collected; the order and its lines stay on record as
    /// `Voided`. Returns the voided order id, or `None` when the table had
    /// no open tab.
    pub async fn void_tab(&self, table_id: &str) -> CheckoutResult<Option<String>> {
        let order = match self.db.orders().get_open_by_table(table_id).await? {
            None => return Ok(None),
            Some(order) => order,
        };

        self.db.orders().mark_voided(&order.id).await?;
        self.db.tables().release(table_id).await?;
        warn!(table_id = %table_id, order_id = %order.id, "Tab voided by staff override");
        Ok(Some(order.id))
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Opens a fresh order on a table and marks the table occupied.
    async fn open_tab(&self, table_id: &str, guest_name: Option<&str>) -> CheckoutResult<Order> {
        let order = self.db.orders().open_order(table_id).await?;

        // The order insert is the authoritative CAS; a table already
        // marked occupied (say, by a crashed earlier open) is tolerated.
        if let Err(e) = self.db.tables().occupy(table_id, guest_name).await {
            match e {
                DbError::Conflict { .. } => {
                    warn!(table_id = %table_id, "Table already occupied at order open");
                }
                e => return Err(e.into()),
            }
        }

        debug!(table_id = %table_id, order_id = %order.id, "Tab opened");
        Ok(order)
    }

    /// Deletes an emptied order and frees its table.
    async fn abandon(&self, order: &Order) -> CheckoutResult<()> {
        self.db.orders().delete_order(&order.id).await?;
        self.db.tables().release(&order.table_id).await?;
        debug!(order_id = %order.id, table_id = %order.table_id, "Empty tab abandoned");
        Ok(())
    }

    /// Enforces the per-line quantity cap and the distinct-line cap.
    async fn check_line_caps(&self, order: &Order, product_id: &str) -> CheckoutResult<()> {
        let items = self.db.orders().items(&order.id).await?;

        match items.iter().find(|i| i.product_id == product_id) {
            Some(line) if line.quantity >= MAX_LINE_QUANTITY => {
                Err(CoreError::QuantityTooLarge {
                    requested: line.quantity + 1,
                    max: MAX_LINE_QUANTITY,
                }
                .into())
            }
            Some(_) => Ok(()),
            None if items.len() >= MAX_ORDER_LINES => {
                Err(CoreError::TooManyLines {
                    max: MAX_ORDER_LINES,
                }
                .into())
            }
            None => Ok(()),
        }
    }
}
