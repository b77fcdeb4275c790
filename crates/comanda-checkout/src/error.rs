//! # Checkout Error Types
//!
//! Errors surfaced by the orchestration layer, classified so callers can
//! tell "fix the input" from "re-fetch and retry" from "storage trouble".

use thiserror::Error;

use comanda_core::CoreError;
use comanda_db::DbError;

/// Errors from tab and settlement flows.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// A business rule rejected the request before any write.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The persistence layer rejected or failed the operation.
    #[error(transparent)]
    Db(#[from] DbError),

    /// A compare-and-swap kept losing after the bounded retry budget.
    ///
    /// The caller should re-read current state; the contention source is
    /// another terminal working the same table.
    #[error("gave up after {attempts} contended attempts on {entity}")]
    ContentionExhausted { entity: &'static str, attempts: u32 },

    /// A settlement attempt kept failing on retryable storage errors.
    ///
    /// Every write under the attempt id is idempotent, so the same attempt
    /// may be driven again once storage recovers.
    #[error("settlement attempt {attempt_id} failed after {attempts} tries: {source}")]
    SettlementExhausted {
        attempt_id: String,
        attempts: u32,
        source: DbError,
    },
}

impl CheckoutError {
    /// True when the failure is a lost compare-and-swap rather than a
    /// validation or storage problem.
    pub fn is_conflict(&self) -> bool {
        matches!(self, CheckoutError::Db(DbError::Conflict { .. }))
    }
}

/// Result type for checkout operations.
pub type CheckoutResult<T> = Result<T, CheckoutError>;
