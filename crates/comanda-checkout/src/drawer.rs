//! # Drawer Service
//!
//! Register-side flows: opening and closing the shift session and logging
//! manual movements. Validation runs here, before the repository; the
//! database constraints behind it are the backstop, not the message.

use tracing::{debug, info};

use comanda_core::{
    validation::{validate_amount_cents, validate_movement_description, validate_opening_float},
    CashSession, CashTransactionKind, CoreError,
};
use comanda_db::{Database, DbError};

use crate::error::CheckoutResult;

/// Cash drawer session service.
#[derive(Debug, Clone)]
pub struct DrawerService {
    db: Database,
}

impl DrawerService {
    /// Creates a new DrawerService.
    pub fn new(db: Database) -> Self {
        DrawerService { db }
    }

    /// Opens the shift session with a counted float.
    pub async fn open(&self, opening_float_cents: i64, actor_id: &str) -> CheckoutResult<CashSession> {
        validate_opening_float(opening_float_cents).map_err(CoreError::from)?;
        let session = self
            .db
            .cash()
            .open_session(opening_float_cents, actor_id)
            .await?;
        info!(session_id = %session.id, opened_by = %actor_id, "Drawer opened");
        Ok(session)
    }

    /// Closes the current session, snapshotting its expected balance.
    pub async fn close(&self, actor_id: &str) -> CheckoutResult<CashSession> {
        let session = self
            .db
            .cash()
            .current_open()
            .await?
            .ok_or_else(|| DbError::not_found("CashSession", "open"))?;

        let closed = self.db.cash().close_session(&session.id, actor_id).await?;
        info!(
            session_id = %closed.id,
            closed_by = %actor_id,
            expected_cents = closed.closing_balance_cents,
            "Drawer closed"
        );
        Ok(closed)
    }

    /// The currently open session, if any.
    pub async fn current(&self) -> CheckoutResult<Option<CashSession>> {
        Ok(self.db.cash().current_open().await?)
    }

    /// Logs a manual movement (inflow or outflow) on the open session.
    ///
    /// Manual movements require a description so the closing count can be
    /// disputed line by line. `Sale` entries are the coordinator's alone
    /// and cannot be logged through here.
    pub async fn record_manual(
        &self,
        kind: CashTransactionKind,
        amount_cents: i64,
        description: &str,
        actor_id: &str,
    ) -> CheckoutResult<()> {
        if kind == CashTransactionKind::Sale {
            return Err(DbError::conflict(
                "CashTransaction",
                "manual",
                "sale movements are written by settlement only",
            )
            .into());
        }

        validate_amount_cents(amount_cents).map_err(CoreError::from)?;
        validate_movement_description(kind, description).map_err(CoreError::from)?;

        let session = self
            .db
            .cash()
            .current_open()
            .await?
            .ok_or_else(|| DbError::not_found("CashSession", "open"))?;

        self.db
            .cash()
            .record(
                &session.id,
                kind,
                amount_cents,
                description.trim(),
                actor_id,
                None,
                None,
            )
            .await?;

        debug!(session_id = %session.id, ?kind, amount_cents, "Manual movement logged");
        Ok(())
    }
}
