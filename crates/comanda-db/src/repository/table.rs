//! # Table Repository
//!
//! Occupancy transitions for physical tables.
//!
//! ## Occupancy CAS
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  occupy(id):                                                            │
//! │    UPDATE tables SET status='occupied' WHERE id=? AND status='free'     │
//! │                                                                         │
//! │  Two terminals racing on the same table: exactly one UPDATE matches     │
//! │  the row, the other sees rows_affected == 0 and gets a Conflict.        │
//! │                                                                         │
//! │  release(id) is deliberately NOT guarded: releasing a free table is a   │
//! │  harmless no-op, which is what makes settlement retry safe.             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use comanda_core::{DiningTable, TableStatus};

/// Repository for table occupancy.
#[derive(Debug, Clone)]
pub struct TableRepository {
    pool: SqlitePool,
}

impl TableRepository {
    /// Creates a new TableRepository.
    pub fn new(pool: SqlitePool) -> Self {
        TableRepository { pool }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Gets a table by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<DiningTable> {
        let table: Option<DiningTable> = sqlx::query_as(
            r#"
            SELECT id, number, status, guest_name, opened_at, created_at
            FROM tables
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        table.ok_or_else(|| DbError::not_found("Table", id))
    }

    /// Lists all tables ordered by number (the floor map view).
    pub async fn list(&self) -> DbResult<Vec<DiningTable>> {
        let tables: Vec<DiningTable> = sqlx::query_as(
            r#"
            SELECT id, number, status, guest_name, opened_at, created_at
            FROM tables
            ORDER BY number
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(tables)
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Inserts a table (provisioning).
    pub async fn insert(&self, number: i64) -> DbResult<DiningTable> {
        let table = DiningTable {
            id: Uuid::new_v4().to_string(),
            number,
            status: TableStatus::Free,
            guest_name: None,
            opened_at: None,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO tables (id, number, status, guest_name, opened_at, created_at)
            VALUES (?, ?, 'free', NULL, NULL, ?)
            "#,
        )
        .bind(&table.id)
        .bind(table.number)
        .bind(table.created_at)
        .execute(&self.pool)
        .await?;

        Ok(table)
    }

    /// Marks a table occupied.
    ///
    /// Guarded transition: only succeeds when the table is currently free.
    /// Losing the race yields [`DbError::Conflict`].
    pub async fn occupy(&self, id: &str, guest_name: Option<&str>) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE tables
            SET status = 'occupied', guest_name = ?, opened_at = ?
            WHERE id = ? AND status = 'free'
            "#,
        )
        .bind(guest_name)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Distinguish "already occupied" from "no such table"
            let _ = self.get_by_id(id).await?;
            return Err(DbError::conflict("Table", id, "table is not free"));
        }

        debug!(table_id = %id, "Table occupied");
        Ok(())
    }

    /// Returns a table to free, clearing the occupancy metadata.
    ///
    /// Idempotent: releasing an already-free table succeeds silently.
    pub async fn release(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE tables
            SET status = 'free', guest_name = NULL, opened_at = NULL
            WHERE id = ?
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Table", id));
        }

        debug!(table_id = %id, "Table released");
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
