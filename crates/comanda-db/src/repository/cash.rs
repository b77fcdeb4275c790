//! # Cash Repository
//!
//! Drawer sessions and their append-only movement log.
//!
//! ## Session Singleton
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  CREATE UNIQUE INDEX idx_cash_sessions_singleton_open                   │
//! │      ON cash_sessions(status) WHERE status = 'open';                    │
//! │                                                                         │
//! │  The partial index admits at most one row with status='open', so two    │
//! │  staff members racing to open the drawer resolve at the storage layer:  │
//! │  one insert lands, the other gets a unique violation → Conflict.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Movements are never edited or deleted. The expected balance is always
//! re-derived by summation over the log, so a crash mid-settlement can
//! never leave a corrupt running total.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use comanda_core::{CashSession, CashTransaction, CashTransactionKind};

/// Whether a movement insert landed or was recognized as a replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// The movement row was appended.
    Applied,
    /// A row with the same (attempt_id, seq) already existed.
    AlreadyApplied,
}

/// Repository for cash drawer sessions and movements.
#[derive(Debug, Clone)]
pub struct CashRepository {
    pool: SqlitePool,
}

impl CashRepository {
    /// Creates a new CashRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CashRepository { pool }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Gets a session by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<CashSession> {
        let session: Option<CashSession> = sqlx::query_as(
            r#"
            SELECT id, opened_by, closed_by, opening_float_cents, closing_balance_cents,
                   status, opened_at, closed_at
            FROM cash_sessions
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        session.ok_or_else(|| DbError::not_found("CashSession", id))
    }

    /// Returns the currently open session, if any.
    pub async fn current_open(&self) -> DbResult<Option<CashSession>> {
        let session: Option<CashSession> = sqlx::query_as(
            r#"
            SELECT id, opened_by, closed_by, opening_float_cents, closing_balance_cents,
                   status, opened_at, closed_at
            FROM cash_sessions
            WHERE status = 'open'
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    /// Lists a session's movements, oldest first.
    pub async fn transactions(&self, session_id: &str) -> DbResult<Vec<CashTransaction>> {
        let transactions: Vec<CashTransaction> = sqlx::query_as(
            r#"
            SELECT id, session_id, kind, amount_cents, description, actor_id,
                   order_id, attempt_id, seq, created_at
            FROM cash_transactions
            WHERE session_id = ?
            ORDER BY created_at, id
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(transactions)
    }

    /// Computes a session's expected balance by summation:
    /// opening float + Σ Sale + Σ ManualInflow − Σ ManualOutflow.
    pub async fn expected_balance(&self, session_id: &str) -> DbResult<i64> {
        let opening: Option<i64> =
            sqlx::query_scalar("SELECT opening_float_cents FROM cash_sessions WHERE id = ?")
                .bind(session_id)
                .fetch_optional(&self.pool)
                .await?;

        let opening = opening.ok_or_else(|| DbError::not_found("CashSession", session_id))?;

        let movements: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(
                CASE kind
                    WHEN 'manual_outflow' THEN -amount_cents
                    ELSE amount_cents
                END
            ), 0)
            FROM cash_transactions
            WHERE session_id = ?
            "#,
        )
        .bind(session_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(opening + movements)
    }

    // =========================================================================
    // Session Lifecycle
    // =========================================================================

    /// Opens a new drawer session with a manually counted float.
    ///
    /// Relies on the singleton partial index: if a session is already open
    /// the insert fails and is surfaced as a Conflict.
    pub async fn open_session(&self, opening_float_cents: i64, opened_by: &str) -> DbResult<CashSession> {
        let session = CashSession {
            id: Uuid::new_v4().to_string(),
            opened_by: opened_by.to_string(),
            closed_by: None,
            opening_float_cents,
            closing_balance_cents: None,
            status: comanda_core::CashSessionStatus::Open,
            opened_at: Utc::now(),
            closed_at: None,
        };

        let result = sqlx::query(
            r#"
            INSERT INTO cash_sessions (id, opened_by, opening_float_cents, status, opened_at)
            VALUES (?, ?, ?, 'open', ?)
            "#,
        )
        .bind(&session.id)
        .bind(&session.opened_by)
        .bind(session.opening_float_cents)
        .bind(session.opened_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!(session_id = %session.id, opening_float_cents, "Cash session opened");
                Ok(session)
            }
            Err(sqlx::Error::Database(db_err))
                if db_err.message().contains("UNIQUE constraint failed") =>
            {
                Err(DbError::conflict(
                    "CashSession",
                    "singleton",
                    "a session is already open",
                ))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Closes the given session, snapshotting its expected balance.
    ///
    /// Guarded transition: closing an already-closed session is a Conflict.
    /// The snapshot is computed inside the same statement as the status
    /// flip, so a movement racing in from another terminal is either in
    /// the snapshot or rejected by the record guard, never lost between
    /// the two. Once closed the session is immutable.
    pub async fn close_session(&self, session_id: &str, closed_by: &str) -> DbResult<CashSession> {
        let result = sqlx::query(
            r#"
            UPDATE cash_sessions
            SET status = 'closed',
                closed_by = ?,
                closed_at = ?,
                closing_balance_cents = opening_float_cents + (
                    SELECT COALESCE(SUM(
                        CASE kind
                            WHEN 'manual_outflow' THEN -amount_cents
                            ELSE amount_cents
                        END
                    ), 0)
                    FROM cash_transactions
                    WHERE session_id = cash_sessions.id
                )
            WHERE id = ? AND status = 'open'
            "#,
        )
        .bind(closed_by)
        .bind(Utc::now())
        .bind(session_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let _ = self.get_by_id(session_id).await?;
            return Err(DbError::conflict(
                "CashSession",
                session_id,
                "session is not open",
            ));
        }

        let session = self.get_by_id(session_id).await?;
        debug!(
            session_id = %session_id,
            expected = session.closing_balance_cents,
            "Cash session closed"
        );
        Ok(session)
    }

    // =========================================================================
    // Movement Log
    // =========================================================================

    /// Appends a movement to an open session's log.
    ///
    /// The insert only matches while the session is still open, so a
    /// movement can never land on a closed session. Attempt-tagged rows
    /// (`Sale` movements written by settlement) are idempotent on
    /// `(attempt_id, seq)`; a replay reports
    /// [`RecordOutcome::AlreadyApplied`].
    #[allow(clippy::too_many_arguments)]
    pub async fn record(
        &self,
        session_id: &str,
        kind: CashTransactionKind,
        amount_cents: i64,
        description: &str,
        actor_id: &str,
        order_id: Option<&str>,
        attempt: Option<(&str, i64)>,
    ) -> DbResult<RecordOutcome> {
        let (attempt_id, seq) = match attempt {
            Some((id, seq)) => (Some(id), Some(seq)),
            None => (None, None),
        };

        let result = sqlx::query(
            r#"
            INSERT INTO cash_transactions
                (id, session_id, kind, amount_cents, description, actor_id,
                 order_id, attempt_id, seq, created_at)
            SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
            WHERE EXISTS (
                SELECT 1 FROM cash_sessions WHERE id = ? AND status = 'open'
            )
            ON CONFLICT (attempt_id, seq) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(session_id)
        .bind(kind)
        .bind(amount_cents)
        .bind(description)
        .bind(actor_id)
        .bind(order_id)
        .bind(attempt_id)
        .bind(seq)
        .bind(Utc::now())
        .bind(session_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            debug!(session_id = %session_id, ?kind, amount_cents, "Movement recorded");
            return Ok(RecordOutcome::Applied);
        }

        // Zero rows: either the idempotency key already exists (replay) or
        // the session is not open.
        if let Some((attempt_id, seq)) = attempt {
            let exists: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM cash_transactions WHERE attempt_id = ? AND seq = ?",
            )
            .bind(attempt_id)
            .bind(seq)
            .fetch_one(&self.pool)
            .await?;

            if exists > 0 {
                debug!(session_id = %session_id, attempt_id = %attempt_id, seq, "Movement replay skipped");
                return Ok(RecordOutcome::AlreadyApplied);
            }
        }

        Err(DbError::conflict(
            "CashSession",
            session_id,
            "session is not open",
        ))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::RecordOutcome;
    use crate::pool::{Database, DbConfig};
    use comanda_core::{CashSessionStatus, CashTransactionKind};

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_session_singleton() {
        let db = test_db().await;
        let cash = db.cash();

        let session = cash.open_session(10_000, "ana").await.unwrap();
        assert_eq!(session.status, CashSessionStatus::Open);

        let err = cash.open_session(5_000, "bruno").await.unwrap_err();
        assert!(matches!(err, crate::DbError::Conflict { .. }));

        // Closing frees the singleton slot
        cash.close_session(&session.id, "ana").await.unwrap();
        cash.open_session(5_000, "bruno").await.unwrap();
    }

    #[tokio::test]
    async fn test_expected_balance_by_summation() {
        let db = test_db().await;
        let cash = db.cash();
        let session = cash.open_session(10_000, "ana").await.unwrap();

        cash.record(
            &session.id,
            CashTransactionKind::Sale,
            3_750,
            "table 4 settlement",
            "ana",
            None,
            None,
        )
        .await
        .unwrap();
        cash.record(
            &session.id,
            CashTransactionKind::ManualInflow,
            2_000,
            "extra change from safe",
            "ana",
            None,
            None,
        )
        .await
        .unwrap();
        cash.record(
            &session.id,
            CashTransactionKind::ManualOutflow,
            1_500,
            "paid the ice delivery",
            "ana",
            None,
            None,
        )
        .await
        .unwrap();

        assert_eq!(
            cash.expected_balance(&session.id).await.unwrap(),
            10_000 + 3_750 + 2_000 - 1_500
        );

        let closed = cash.close_session(&session.id, "ana").await.unwrap();
        assert_eq!(closed.closing_balance_cents, Some(14_250));
        assert_eq!(closed.closed_by.as_deref(), Some("ana"));
        assert!(closed.closed_at.is_some());
    }

    #[tokio::test]
    async fn test_record_on_closed_session_conflicts() {
        let db = test_db().await;
        let cash = db.cash();
        let session = cash.open_session(0, "ana").await.unwrap();
        cash.close_session(&session.id, "ana").await.unwrap();

        let err = cash
            .record(
                &session.id,
                CashTransactionKind::ManualInflow,
                100,
                "too late",
                "ana",
                None,
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, crate::DbError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_attempt_tagged_record_is_idempotent() {
        let db = test_db().await;
        let cash = db.cash();
        let session = cash.open_session(0, "ana").await.unwrap();

        let outcome = cash
            .record(
                &session.id,
                CashTransactionKind::Sale,
                2_000,
                "settlement",
                "ana",
                None,
                Some(("attempt-1", 0)),
            )
            .await
            .unwrap();
        assert_eq!(outcome, RecordOutcome::Applied);

        let outcome = cash
            .record(
                &session.id,
                CashTransactionKind::Sale,
                2_000,
                "settlement",
                "ana",
                None,
                Some(("attempt-1", 0)),
            )
            .await
            .unwrap();
        assert_eq!(outcome, RecordOutcome::AlreadyApplied);

        assert_eq!(cash.transactions(&session.id).await.unwrap().len(), 1);
        assert_eq!(cash.expected_balance(&session.id).await.unwrap(), 2_000);
    }

    #[tokio::test]
    async fn test_close_snapshot_matches_rederived_balance() {
        let db = test_db().await;
        let cash = db.cash();
        let session = cash.open_session(2_500, "ana").await.unwrap();

        cash.record(
            &session.id,
            CashTransactionKind::Sale,
            4_000,
            "settlement",
            "ana",
            None,
            Some(("attempt-1", 0)),
        )
        .await
        .unwrap();
        cash.record(
            &session.id,
            CashTransactionKind::ManualOutflow,
            500,
            "skim to safe",
            "ana",
            None,
            None,
        )
        .await
        .unwrap();

        let closed = cash.close_session(&session.id, "ana").await.unwrap();

        // The snapshot and the summation over the log must always agree
        let rederived = cash.expected_balance(&session.id).await.unwrap();
        assert_eq!(closed.closing_balance_cents, Some(rederived));
        assert_eq!(rederived, 2_500 + 4_000 - 500);
    }

    #[tokio::test]
    async fn test_untagged_movements_never_collide() {
        let db = test_db().await;
        let cash = db.cash();
        let session = cash.open_session(0, "ana").await.unwrap();

        // Manual movements carry NULL idempotency tags; NULLs compare
        // distinct, so identical-looking rows all land.
        for _ in 0..3 {
            let outcome = cash
                .record(
                    &session.id,
                    CashTransactionKind::ManualInflow,
                    1_000,
                    "extra change",
                    "ana",
                    None,
                    None,
                )
                .await
                .unwrap();
            assert_eq!(outcome, RecordOutcome::Applied);
        }

        assert_eq!(cash.transactions(&session.id).await.unwrap().len(), 3);
        assert_eq!(cash.expected_balance(&session.id).await.unwrap(), 3_000);
    }

    #[tokio::test]
    async fn test_close_twice_conflicts() {
        let db = test_db().await;
        let cash = db.cash();
        let session = cash.open_session(0, "ana").await.unwrap();
        cash.close_session(&session.id, "ana").await.unwrap();

        let err = cash.close_session(&session.id, "ana").await.unwrap_err();
        assert!(matches!(err, crate::DbError::Conflict { .. }));
    }
}
