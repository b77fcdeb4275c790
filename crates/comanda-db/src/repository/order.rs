//! # Order Repository
//!
//! Orders (tabs), their line items, and the settle compare-and-swap.
//!
//! ## Concurrency Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Three guards protect every order:                                      │
//! │                                                                         │
//! │  1. Partial unique index on orders(table_id) WHERE status='open'        │
//! │     → at most one open tab per table; racing opens lose cleanly         │
//! │                                                                         │
//! │  2. Optimistic `version` column                                         │
//! │     → every line-item mutation carries the version it read;             │
//! │       UPDATE ... WHERE version = ? rejects stale writers                │
//! │                                                                         │
//! │  3. Settle guard: UPDATE ... WHERE status='open'                        │
//! │     → exactly one settlement attempt flips Open → Settled; a replay     │
//! │       of the same attempt_id is recognized and reported as such         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The order total is derived: after every line-item write the same
//! transaction recomputes it as `SUM(order_line_items.total_cents)`.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use comanda_core::{Order, OrderLineItem, Product};

/// Outcome of removing one unit from an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// One unit removed; the order still has line items.
    Removed,
    /// The last unit of the last line item was removed; the order is now
    /// empty and should be abandoned by the caller.
    OrderEmptied,
    /// No line item for that product existed. Not an error: the state the
    /// caller wanted (product absent) already holds.
    NoLineItem,
}

/// Outcome of the settle compare-and-swap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettleOutcome {
    /// This call flipped the order from Open to Settled.
    Applied,
    /// The order was already settled by this same attempt (crash replay).
    AlreadyApplied,
}

/// Repository for orders and line items.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    /// Creates a new OrderRepository.
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Gets an order by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Order> {
        let order: Option<Order> = sqlx::query_as(
            r#"
            SELECT id, table_id, customer_id, status, total_cents, payment_label,
                   settle_attempt_id, version, created_at, updated_at, settled_at
            FROM orders
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        order.ok_or_else(|| DbError::not_found("Order", id))
    }

    /// Gets the open order for a table, if one exists.
    pub async fn get_open_by_table(&self, table_id: &str) -> DbResult<Option<Order>> {
        let order: Option<Order> = sqlx::query_as(
            r#"
            SELECT id, table_id, customer_id, status, total_cents, payment_label,
                   settle_attempt_id, version, created_at, updated_at, settled_at
            FROM orders
            WHERE table_id = ? AND status = 'open'
            "#,
        )
        .bind(table_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(order)
    }

    /// Lists the line items of an order, oldest first.
    pub async fn items(&self, order_id: &str) -> DbResult<Vec<OrderLineItem>> {
        let items: Vec<OrderLineItem> = sqlx::query_as(
            r#"
            SELECT id, order_id, product_id, name_snapshot, unit_price_cents,
                   quantity, total_cents, created_at
            FROM order_line_items
            WHERE order_id = ?
            ORDER BY created_at, id
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    // =========================================================================
    // Order Lifecycle
    // =========================================================================

    /// Opens a new empty order on a table.
    ///
    /// Relies on the partial unique index: if the table already carries an
    /// open order the insert fails and is surfaced as a Conflict.
    pub async fn open_order(&self, table_id: &str) -> DbResult<Order> {
        let now = Utc::now();
        let order = Order {
            id: Uuid::new_v4().to_string(),
            table_id: table_id.to_string(),
            customer_id: None,
            status: comanda_core::OrderStatus::Open,
            total_cents: 0,
            payment_label: None,
            settle_attempt_id: None,
            version: 0,
            created_at: now,
            updated_at: now,
            settled_at: None,
        };

        let result = sqlx::query(
            r#"
            INSERT INTO orders (id, table_id, status, total_cents, version, created_at, updated_at)
            VALUES (?, ?, 'open', 0, 0, ?, ?)
            "#,
        )
        .bind(&order.id)
        .bind(&order.table_id)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!(order_id = %order.id, table_id = %table_id, "Order opened");
                Ok(order)
            }
            Err(sqlx::Error::Database(db_err))
                if db_err.message().contains("UNIQUE constraint failed") =>
            {
                Err(DbError::conflict(
                    "Order",
                    table_id,
                    "table already has an open order",
                ))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Voids an open order (staff override, e.g. a walked-out table).
    ///
    /// Terminal like Settled, but nothing is collected and the line items
    /// are kept for review.
    pub async fn mark_voided(&self, order_id: &str) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = 'voided', updated_at = ?
            WHERE id = ? AND status = 'open'
            "#,
        )
        .bind(Utc::now())
        .bind(order_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::conflict("Order", order_id, "order is not open"));
        }

        debug!(order_id = %order_id, "Order voided");
        Ok(())
    }

    /// Deletes an order and (via cascade) its line items.
    ///
    /// Only open orders may be deleted: abandonment applies to empty tabs,
    /// never to settled history.
    pub async fn delete_order(&self, order_id: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM orders WHERE id = ? AND status = 'open'")
            .bind(order_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::conflict("Order", order_id, "order is not open"));
        }

        debug!(order_id = %order_id, "Order abandoned");
        Ok(())
    }

    // =========================================================================
    // Line-Item Mutations
    // =========================================================================

    /// Adds one unit of a product to an open order.
    ///
    /// `expected_version` is the version the caller read. A stale version
    /// loses the CAS and yields a Conflict; the caller should re-fetch and
    /// retry. On success returns the order with its recomputed total.
    pub async fn add_unit(
        &self,
        order_id: &str,
        product: &Product,
        expected_version: i64,
    ) -> DbResult<Order> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        // Version bump doubles as the open+version guard
        let bumped = sqlx::query(
            r#"
            UPDATE orders
            SET version = version + 1, updated_at = ?
            WHERE id = ? AND status = 'open' AND version = ?
            "#,
        )
        .bind(now)
        .bind(order_id)
        .bind(expected_version)
        .execute(&mut *tx)
        .await?;

        if bumped.rows_affected() == 0 {
            drop(tx);
            return Err(self.mutation_conflict(order_id).await);
        }

        // Same product folds into the existing line; otherwise a new line
        // is created with the name and price frozen from the catalog now.
        let updated = sqlx::query(
            r#"
            UPDATE order_line_items
            SET quantity = quantity + 1,
                total_cents = unit_price_cents * (quantity + 1)
            WHERE order_id = ? AND product_id = ?
            "#,
        )
        .bind(order_id)
        .bind(&product.id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            sqlx::query(
                r#"
                INSERT INTO order_line_items
                    (id, order_id, product_id, name_snapshot, unit_price_cents,
                     quantity, total_cents, created_at)
                VALUES (?, ?, ?, ?, ?, 1, ?, ?)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(order_id)
            .bind(&product.id)
            .bind(&product.name)
            .bind(product.price_cents)
            .bind(product.price_cents)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        self.recompute_total(&mut tx, order_id).await?;
        tx.commit().await?;

        debug!(order_id = %order_id, product_id = %product.id, "Unit added");
        self.get_by_id(order_id).await
    }

    /// Removes one unit of a product from an open order.
    ///
    /// Quantity 1 deletes the line; if that was the last line the outcome
    /// is [`RemoveOutcome::OrderEmptied`] and the caller is expected to
    /// abandon the order. A missing line item rolls the version bump back
    /// and reports [`RemoveOutcome::NoLineItem`].
    pub async fn remove_unit(
        &self,
        order_id: &str,
        product_id: &str,
        expected_version: i64,
    ) -> DbResult<RemoveOutcome> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let bumped = sqlx::query(
            r#"
            UPDATE orders
            SET version = version + 1, updated_at = ?
            WHERE id = ? AND status = 'open' AND version = ?
            "#,
        )
        .bind(now)
        .bind(order_id)
        .bind(expected_version)
        .execute(&mut *tx)
        .await?;

        if bumped.rows_affected() == 0 {
            drop(tx);
            return Err(self.mutation_conflict(order_id).await);
        }

        let quantity: Option<i64> = sqlx::query_scalar(
            "SELECT quantity FROM order_line_items WHERE order_id = ? AND product_id = ?",
        )
        .bind(order_id)
        .bind(product_id)
        .fetch_optional(&mut *tx)
        .await?;

        let quantity = match quantity {
            // Dropping the tx rolls back the version bump
            None => return Ok(RemoveOutcome::NoLineItem),
            Some(q) => q,
        };

        if quantity > 1 {
            sqlx::query(
                r#"
                UPDATE order_line_items
                SET quantity = quantity - 1,
                    total_cents = unit_price_cents * (quantity - 1)
                WHERE order_id = ? AND product_id = ?
                "#,
            )
            .bind(order_id)
            .bind(product_id)
            .execute(&mut *tx)
            .await?;
        } else {
            sqlx::query("DELETE FROM order_line_items WHERE order_id = ? AND product_id = ?")
                .bind(order_id)
                .bind(product_id)
                .execute(&mut *tx)
                .await?;
        }

        self.recompute_total(&mut tx, order_id).await?;

        let remaining: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM order_line_items WHERE order_id = ?")
                .bind(order_id)
                .fetch_one(&mut *tx)
                .await?;

        tx.commit().await?;

        debug!(order_id = %order_id, product_id = %product_id, remaining, "Unit removed");

        if remaining == 0 {
            Ok(RemoveOutcome::OrderEmptied)
        } else {
            Ok(RemoveOutcome::Removed)
        }
    }

    // =========================================================================
    // Settlement CAS
    // =========================================================================

    /// Flips an order from Open to Settled, recording the attempt that did
    /// it.
    ///
    /// ## Replay Behavior
    /// If the guard matches zero rows because the order was already settled
    /// *by the same attempt_id*, this is a crash replay and the call reports
    /// [`SettleOutcome::AlreadyApplied`] instead of failing. Any other
    /// mismatch is a genuine Conflict.
    pub async fn mark_settled(
        &self,
        order_id: &str,
        attempt_id: &str,
        customer_id: Option<&str>,
        payment_label: &str,
    ) -> DbResult<SettleOutcome> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = 'settled',
                settled_at = ?,
                updated_at = ?,
                customer_id = ?,
                payment_label = ?,
                settle_attempt_id = ?
            WHERE id = ? AND status = 'open'
            "#,
        )
        .bind(Utc::now())
        .bind(Utc::now())
        .bind(customer_id)
        .bind(payment_label)
        .bind(attempt_id)
        .bind(order_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            debug!(order_id = %order_id, attempt_id = %attempt_id, "Order settled");
            return Ok(SettleOutcome::Applied);
        }

        let order = self.get_by_id(order_id).await?;
        if order.settle_attempt_id.as_deref() == Some(attempt_id) {
            debug!(order_id = %order_id, attempt_id = %attempt_id, "Settle replay recognized");
            Ok(SettleOutcome::AlreadyApplied)
        } else {
            Err(DbError::conflict(
                "Order",
                order_id,
                format!("order is {:?}, not open", order.status),
            ))
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Recomputes the derived order total from its line items.
    async fn recompute_total(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        order_id: &str,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE orders
            SET total_cents = (
                SELECT COALESCE(SUM(total_cents), 0)
                FROM order_line_items
                WHERE order_id = ?
            )
            WHERE id = ?
            "#,
        )
        .bind(order_id)
        .bind(order_id)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Classifies a lost mutation CAS: missing order, closed order, or
    /// stale version.
    async fn mutation_conflict(&self, order_id: &str) -> DbError {
        match self.get_by_id(order_id).await {
            Err(e) => e,
            Ok(order) if order.status != comanda_core::OrderStatus::Open => {
                DbError::conflict("Order", order_id, "order is no longer open")
            }
            Ok(_) => DbError::conflict("Order", order_id, "stale order version"),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::{RemoveOutcome, SettleOutcome};
    use crate::pool::{Database, DbConfig};
    use comanda_core::{OrderStatus, Product};

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    async fn seed(db: &Database) -> (String, Product, Product) {
        let table = db.tables().insert(1).await.unwrap();
        let beer = db.products().insert("Chopp 300ml", 650).await.unwrap();
        let fries = db.products().insert("Porção de fritas", 2400).await.unwrap();
        (table.id, beer, fries)
    }

    #[tokio::test]
    async fn test_one_open_order_per_table() {
        let db = test_db().await;
        let (table_id, _, _) = seed(&db).await;

        db.orders().open_order(&table_id).await.unwrap();
        let err = db.orders().open_order(&table_id).await.unwrap_err();
        assert!(matches!(err, crate::DbError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_add_unit_folds_and_totals() {
        let db = test_db().await;
        let (table_id, beer, fries) = seed(&db).await;
        let order = db.orders().open_order(&table_id).await.unwrap();

        let order = db.orders().add_unit(&order.id, &beer, 0).await.unwrap();
        let order = db
            .orders()
            .add_unit(&order.id, &beer, order.version)
            .await
            .unwrap();
        let order = db
            .orders()
            .add_unit(&order.id, &fries, order.version)
            .await
            .unwrap();

        assert_eq!(order.total_cents, 650 * 2 + 2400);

        let items = db.orders().items(&order.id).await.unwrap();
        assert_eq!(items.len(), 2);
        let beer_line = items.iter().find(|i| i.product_id == beer.id).unwrap();
        assert_eq!(beer_line.quantity, 2);
        assert_eq!(beer_line.total_cents, 1300);
    }

    #[tokio::test]
    async fn test_stale_version_is_rejected() {
        let db = test_db().await;
        let (table_id, beer, _) = seed(&db).await;
        let order = db.orders().open_order(&table_id).await.unwrap();

        db.orders().add_unit(&order.id, &beer, 0).await.unwrap();

        // Replaying with the old version loses the CAS
        let err = db.orders().add_unit(&order.id, &beer, 0).await.unwrap_err();
        assert!(matches!(err, crate::DbError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_remove_unit_outcomes() {
        let db = test_db().await;
        let (table_id, beer, _) = seed(&db).await;
        let order = db.orders().open_order(&table_id).await.unwrap();

        let order = db.orders().add_unit(&order.id, &beer, 0).await.unwrap();
        let order = db
            .orders()
            .add_unit(&order.id, &beer, order.version)
            .await
            .unwrap();

        let outcome = db
            .orders()
            .remove_unit(&order.id, &beer.id, order.version)
            .await
            .unwrap();
        assert_eq!(outcome, RemoveOutcome::Removed);

        let order = db.orders().get_by_id(&order.id).await.unwrap();
        assert_eq!(order.total_cents, 650);

        let outcome = db
            .orders()
            .remove_unit(&order.id, &beer.id, order.version)
            .await
            .unwrap();
        assert_eq!(outcome, RemoveOutcome::OrderEmptied);

        let order = db.orders().get_by_id(&order.id).await.unwrap();
        assert_eq!(order.total_cents, 0);
    }

    #[tokio::test]
    async fn test_remove_missing_product_is_noop() {
        let db = test_db().await;
        let (table_id, beer, fries) = seed(&db).await;
        let order = db.orders().open_order(&table_id).await.unwrap();
        let order = db.orders().add_unit(&order.id, &beer, 0).await.unwrap();

        let outcome = db
            .orders()
            .remove_unit(&order.id, &fries.id, order.version)
            .await
            .unwrap();
        assert_eq!(outcome, RemoveOutcome::NoLineItem);

        // Version bump was rolled back with the transaction
        let after = db.orders().get_by_id(&order.id).await.unwrap();
        assert_eq!(after.version, order.version);
        assert_eq!(after.total_cents, 650);
    }

    #[tokio::test]
    async fn test_settle_cas_and_replay() {
        let db = test_db().await;
        let (table_id, beer, _) = seed(&db).await;
        let order = db.orders().open_order(&table_id).await.unwrap();
        db.orders().add_unit(&order.id, &beer, 0).await.unwrap();

        let outcome = db
            .orders()
            .mark_settled(&order.id, "attempt-1", None, "cash")
            .await
            .unwrap();
        assert_eq!(outcome, SettleOutcome::Applied);

        // Same attempt replaying after a crash is recognized
        let outcome = db
            .orders()
            .mark_settled(&order.id, "attempt-1", None, "cash")
            .await
            .unwrap();
        assert_eq!(outcome, SettleOutcome::AlreadyApplied);

        // A different attempt is a genuine conflict
        let err = db
            .orders()
            .mark_settled(&order.id, "attempt-2", None, "cash")
            .await
            .unwrap_err();
        assert!(matches!(err, crate::DbError::Conflict { .. }));

        let settled = db.orders().get_by_id(&order.id).await.unwrap();
        assert_eq!(settled.status, OrderStatus::Settled);
        assert_eq!(settled.payment_label.as_deref(), Some("cash"));
        assert!(settled.settled_at.is_some());
    }

    #[tokio::test]
    async fn test_void_is_terminal() {
        let db = test_db().await;
        let (table_id, beer, _) = seed(&db).await;
        let order = db.orders().open_order(&table_id).await.unwrap();
        db.orders().add_unit(&order.id, &beer, 0).await.unwrap();

        db.orders().mark_voided(&order.id).await.unwrap();

        let voided = db.orders().get_by_id(&order.id).await.unwrap();
        assert_eq!(voided.status, OrderStatus::Voided);
        // Line items survive for review
        assert_eq!(db.orders().items(&order.id).await.unwrap().len(), 1);

        // No transition out of Voided
        let err = db
            .orders()
            .mark_settled(&order.id, "a1", None, "cash")
            .await
            .unwrap_err();
        assert!(matches!(err, crate::DbError::Conflict { .. }));
        assert!(db.orders().mark_voided(&order.id).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_order_requires_open() {
        let db = test_db().await;
        let (table_id, beer, _) = seed(&db).await;
        let order = db.orders().open_order(&table_id).await.unwrap();
        db.orders().add_unit(&order.id, &beer, 0).await.unwrap();
        db.orders()
            .mark_settled(&order.id, "a1", None, "cash")
            .await
            .unwrap();

        let err = db.orders().delete_order(&order.id).await.unwrap_err();
        assert!(matches!(err, crate::DbError::Conflict { .. }));
    }
}
