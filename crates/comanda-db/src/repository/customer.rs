//! # Customer Repository
//!
//! Customers and the append-only debt ledger behind their balances.
//!
//! ## Debt Posting
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  post_debt(customer, order, amount, attempt_id, seq)                    │
//! │                                                                         │
//! │  BEGIN                                                                  │
//! │    INSERT INTO debt_entries ... ON CONFLICT(attempt_id, seq) DO NOTHING │
//! │    ├── inserted → UPDATE customers SET balance += amount                │
//! │    └── skipped  → replay of a committed attempt; balance untouched      │
//! │  COMMIT                                                                 │
//! │                                                                         │
//! │  Entry and balance bump share one transaction, so the running balance   │
//! │  can never drift from the sum of the ledger.                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use comanda_core::{Customer, DebtEntry};

/// Repository for customers and the debt ledger.
#[derive(Debug, Clone)]
pub struct CustomerRepository {
    pool: SqlitePool,
}

impl CustomerRepository {
    /// Creates a new CustomerRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CustomerRepository { pool }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Gets a customer by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Customer> {
        let customer: Option<Customer> = sqlx::query_as(
            r#"
            SELECT id, name, phone, credit_limit_cents, balance_cents, notes, created_at
            FROM customers
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        customer.ok_or_else(|| DbError::not_found("Customer", id))
    }

    /// Lists all customers ordered by name.
    pub async fn list(&self) -> DbResult<Vec<Customer>> {
        let customers: Vec<Customer> = sqlx::query_as(
            r#"
            SELECT id, name, phone, credit_limit_cents, balance_cents, notes, created_at
            FROM customers
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(customers)
    }

    /// Returns a customer's running debt balance in centavos.
    pub async fn balance(&self, id: &str) -> DbResult<i64> {
        let balance: Option<i64> =
            sqlx::query_scalar("SELECT balance_cents FROM customers WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        balance.ok_or_else(|| DbError::not_found("Customer", id))
    }

    /// Lists a customer's debt entries, newest first.
    pub async fn debt_entries(&self, customer_id: &str) -> DbResult<Vec<DebtEntry>> {
        let entries: Vec<DebtEntry> = sqlx::query_as(
            r#"
            SELECT id, customer_id, order_id, amount_cents, attempt_id, seq, created_at
            FROM debt_entries
            WHERE customer_id = ?
            ORDER BY created_at DESC, id
            "#,
        )
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Inserts a customer.
    pub async fn insert(
        &self,
        name: &str,
        phone: Option<&str>,
        credit_limit_cents: i64,
    ) -> DbResult<Customer> {
        let customer = Customer {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            phone: phone.map(String::from),
            credit_limit_cents,
            balance_cents: 0,
            notes: None,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO customers (id, name, phone, credit_limit_cents, balance_cents, created_at)
            VALUES (?, ?, ?, ?, 0, ?)
            "#,
        )
        .bind(&customer.id)
        .bind(&customer.name)
        .bind(&customer.phone)
        .bind(customer.credit_limit_cents)
        .bind(customer.created_at)
        .execute(&self.pool)
        .await?;

        Ok(customer)
    }

    /// Posts a deferred-credit amount to a customer's ledger.
    ///
    /// Idempotent on `(attempt_id, seq)`: a replayed settlement attempt
    /// skips both the entry and the balance bump. Returns the customer's
    /// balance after the call either way.
    pub async fn post_debt(
        &self,
        customer_id: &str,
        order_id: &str,
        amount_cents: i64,
        attempt_id: &str,
        seq: i64,
    ) -> DbResult<i64> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO debt_entries
                (id, customer_id, order_id, amount_cents, attempt_id, seq, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (attempt_id, seq) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(customer_id)
        .bind(order_id)
        .bind(amount_cents)
        .bind(attempt_id)
        .bind(seq)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() > 0 {
            let bumped =
                sqlx::query("UPDATE customers SET balance_cents = balance_cents + ? WHERE id = ?")
                    .bind(amount_cents)
                    .bind(customer_id)
                    .execute(&mut *tx)
                    .await?;

            if bumped.rows_affected() == 0 {
                drop(tx);
                return Err(DbError::not_found("Customer", customer_id));
            }

            debug!(
                customer_id = %customer_id,
                order_id = %order_id,
                amount_cents,
                attempt_id = %attempt_id,
                seq,
                "Debt posted"
            );
        } else {
            debug!(
                customer_id = %customer_id,
                attempt_id = %attempt_id,
                seq,
                "Debt posting replay skipped"
            );
        }

        let balance: i64 = sqlx::query_scalar("SELECT balance_cents FROM customers WHERE id = ?")
            .bind(customer_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(balance)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::pool::{Database, DbConfig};

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    /// Debt entries reference an order, so tests need a settled-ish tab.
    async fn seed_order(db: &Database) -> String {
        let table = db.tables().insert(1).await.unwrap();
        let beer = db.products().insert("Chopp 300ml", 650).await.unwrap();
        let order = db.orders().open_order(&table.id).await.unwrap();
        db.orders().add_unit(&order.id, &beer, 0).await.unwrap();
        order.id
    }

    #[tokio::test]
    async fn test_post_debt_bumps_balance() {
        let db = test_db().await;
        let order_id = seed_order(&db).await;
        let customer = db.customers().insert("Maria", None, 0).await.unwrap();

        let balance = db
            .customers()
            .post_debt(&customer.id, &order_id, 650, "attempt-1", 0)
            .await
            .unwrap();
        assert_eq!(balance, 650);

        let entries = db.customers().debt_entries(&customer.id).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].amount_cents, 650);
        assert_eq!(entries[0].attempt_id, "attempt-1");
    }

    #[tokio::test]
    async fn test_post_debt_replay_is_skipped() {
        let db = test_db().await;
        let order_id = seed_order(&db).await;
        let customer = db.customers().insert("Maria", None, 0).await.unwrap();

        db.customers()
            .post_debt(&customer.id, &order_id, 650, "attempt-1", 0)
            .await
            .unwrap();

        // Crash replay of the same (attempt, seq): no double posting
        let balance = db
            .customers()
            .post_debt(&customer.id, &order_id, 650, "attempt-1", 0)
            .await
            .unwrap();
        assert_eq!(balance, 650);
        assert_eq!(
            db.customers()
                .debt_entries(&customer.id)
                .await
                .unwrap()
                .len(),
            1
        );

        // A different seq in the same attempt is a distinct posting
        let balance = db
            .customers()
            .post_debt(&customer.id, &order_id, 350, "attempt-1", 1)
            .await
            .unwrap();
        assert_eq!(balance, 1000);
    }

    #[tokio::test]
    async fn test_post_debt_unknown_customer() {
        let db = test_db().await;
        let order_id = seed_order(&db).await;

        let err = db
            .customers()
            .post_debt("nobody", &order_id, 100, "a1", 0)
            .await
            .unwrap_err();
        // FK on debt_entries fires before the balance bump
        assert!(matches!(
            err,
            crate::DbError::ForeignKeyViolation { .. } | crate::DbError::NotFound { .. }
        ));
    }
}
