//! # Settlement Coordinator
//!
//! Drives one checkout from a balanced allocation set to a fully settled
//! order across three stores that share no transaction.
//!
//! ## Commit Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  settle(order, allocations)                                             │
//! │                                                                         │
//! │  0. attempt_id = fresh UUID; every write below is tagged                │
//! │     (attempt_id, seq) and idempotent under that key                     │
//! │                                                                         │
//! │  1. VALIDATE (no writes yet)                                            │
//! │     reload order + items, recompute total from lines,                   │
//! │     reject empty orders and unbalanced allocation sets                  │
//! │                                                                         │
//! │  2. PER ALLOCATION, in declaration order (seq = index)                  │
//! │     DeferredCredit → debt entry + balance bump (one tx, idempotent)     │
//! │     cash-equiv     → Sale movement on the open drawer session,          │
//! │                      or CashLedger::NoOpenSession when none is open     │
//! │                                                                         │
//! │  3. CAS the order Open → Settled (replay by the same attempt is         │
//! │     recognized and reported, not failed)                                │
//! │                                                                         │
//! │  4. Free the table                                                      │
//! │                                                                         │
//! │  5. Emit debt notices (fire-and-forget)                                 │
//! │                                                                         │
//! │  A crash between any two steps re-runs the SAME attempt id: committed   │
//! │  steps recognize their keys and skip, uncommitted steps apply. The      │
//! │  end state is identical either way.                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use comanda_core::{
    primary_label, validate_allocations, CoreError, Money, Order, OrderLineItem,
    PaymentAllocation, PaymentKind, CashTransactionKind, MAX_SETTLEMENT_RETRIES,
};
use comanda_db::{Database, SettleOutcome};

use crate::error::{CheckoutError, CheckoutResult};
use crate::notify::{DebtNotice, Notifier};

// =============================================================================
// Outcome Types
// =============================================================================

/// What happened on the cash-drawer side of a settlement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CashLedger {
    /// Cash-equivalent movements were appended to the open session.
    Recorded { session_id: String },
    /// Cash-equivalent payments were taken but no session was open; the
    /// sale completed and the gap is the operator's to explain.
    NoOpenSession,
    /// The allocation set contained no cash-equivalent payments.
    NotApplicable,
}

/// One committed deferred-credit posting.
#[derive(Debug, Clone)]
pub struct DebtPosting {
    pub customer_id: String,
    pub amount_cents: i64,
    /// The customer's running balance after this settlement.
    pub new_balance_cents: i64,
}

/// The result of a completed settlement.
#[derive(Debug, Clone)]
pub struct SettlementOutcome {
    pub order: Order,
    pub attempt_id: String,
    /// Total actually settled, recomputed from line items at commit time.
    pub total: Money,
    /// Reporting label of the dominant instrument kind.
    pub payment_label: String,
    pub cash_ledger: CashLedger,
    pub debt_postings: Vec<DebtPosting>,
    /// True when the order had already been settled by this same attempt
    /// (the call replayed a crashed commit to its end state).
    pub replayed: bool,
}

// =============================================================================
// Coordinator
// =============================================================================

/// Coordinates settlement across orders, the debt ledger, the cash drawer,
/// and table occupancy.
pub struct SettlementCoordinator {
    db: Database,
    notifier: Arc<dyn Notifier>,
}

impl SettlementCoordinator {
    /// Creates a coordinator dispatching notices through `notifier`.
    pub fn new(db: Database, notifier: Arc<dyn Notifier>) -> Self {
        SettlementCoordinator { db, notifier }
    }

    /// Settles an open order with a balanced allocation set.
    ///
    /// Allocates one attempt id and drives it to completion, replaying on
    /// retryable storage failures up to [`MAX_SETTLEMENT_RETRIES`] times.
    /// Validation and conflict failures surface immediately without retry.
    pub async fn settle(
        &self,
        order_id: &str,
        allocations: Vec<PaymentAllocation>,
        actor_id: &str,
    ) -> CheckoutResult<SettlementOutcome> {
        let attempt_id = Uuid::new_v4().to_string();

        let mut tries = 0;
        loop {
            tries += 1;
            match self
                .settle_attempt(order_id, &allocations, actor_id, &attempt_id)
                .await
            {
                Ok(outcome) => return Ok(outcome),
                Err(CheckoutError::Db(e)) if e.is_retryable() && tries < MAX_SETTLEMENT_RETRIES => {
                    warn!(
                        order_id = %order_id,
                        attempt_id = %attempt_id,
                        tries,
                        error = %e,
                        "Retryable settlement failure, replaying attempt"
                    );
                }
                Err(CheckoutError::Db(e)) if e.is_retryable() => {
                    return Err(CheckoutError::SettlementExhausted {
                        attempt_id,
                        attempts: tries,
                        source: e,
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Runs one pass of the commit sequence under a fixed attempt id.
    ///
    /// Public so a caller holding a durable attempt id (crash journal) can
    /// resume it; [`settle`](Self::settle) is the normal entry point.
    pub async fn settle_attempt(
        &self,
        order_id: &str,
        allocations: &[PaymentAllocation],
        actor_id: &str,
        attempt_id: &str,
    ) -> CheckoutResult<SettlementOutcome> {
        // ---- Step 1: validate against fresh state, before any write ----
        let order = self.db.orders().get_by_id(order_id).await?;
        let items = self.db.orders().items(order_id).await?;

        // Only this attempt's own replay may proceed past a closed order;
        // anything else must fail here, before the first ledger write.
        if order.status != comanda_core::OrderStatus::Open
            && order.settle_attempt_id.as_deref() != Some(attempt_id)
        {
            return Err(comanda_db::DbError::conflict(
                "Order",
                order_id,
                format!("order is {:?}, not open", order.status),
            )
            .into());
        }

        if items.is_empty() {
            return Err(CoreError::EmptyOrder(order_id.to_string()).into());
        }

        // The staged set may have been built against a stale total; the
        // line items are the only authority.
        let total = Money::from_cents(items.iter().map(|i| i.total_cents).sum());
        validate_allocations(total, allocations)?;

        let label = primary_label(allocations)
            .unwrap_or_else(|| PaymentKind::Cash.label())
            .to_string();

        // ---- Step 2: ledger writes, one per allocation ----
        let session = self.db.cash().current_open().await?;
        let mut cash_ledger = CashLedger::NotApplicable;
        let mut debt_postings = Vec::new();

        for (seq, allocation) in allocations.iter().enumerate() {
            let seq = seq as i64;

            if allocation.kind == PaymentKind::DeferredCredit {
                // Presence validated above
                let customer_id = allocation
                    .customer_id
                    .as_deref()
                    .ok_or(CoreError::MissingDebtor)?;

                let new_balance = self
                    .db
                    .customers()
                    .post_debt(
                        customer_id,
                        order_id,
                        allocation.amount_cents,
                        attempt_id,
                        seq,
                    )
                    .await?;

                debt_postings.push(DebtPosting {
                    customer_id: customer_id.to_string(),
                    amount_cents: allocation.amount_cents,
                    new_balance_cents: new_balance,
                });
            } else {
                match &session {
                    Some(session) => {
                        self.db
                            .cash()
                            .record(
                                &session.id,
                                CashTransactionKind::Sale,
                                allocation.amount_cents,
                                &format!("settlement of order {order_id}"),
                                actor_id,
                                Some(order_id),
                                Some((attempt_id, seq)),
                            )
                            .await?;
                        cash_ledger = CashLedger::Recorded {
                            session_id: session.id.clone(),
                        };
                    }
                    None => {
                        warn!(
                            order_id = %order_id,
                            amount_cents = allocation.amount_cents,
                            "Cash-equivalent payment with no open drawer session"
                        );
                        cash_ledger = CashLedger::NoOpenSession;
                    }
                }
            }
        }

        // ---- Step 3: flip the order ----
        let linked_customer = Self::linked_customer(allocations);
        let settle = self
            .db
            .orders()
            .mark_settled(order_id, attempt_id, linked_customer.as_deref(), &label)
            .await?;
        let replayed = settle == SettleOutcome::AlreadyApplied;

        // ---- Step 4: free the table ----
        self.db.tables().release(&order.table_id).await?;

        // ---- Step 5: notices, after the ledgers are consistent ----
        self.emit_notices(&items, &debt_postings).await;

        let order = self.db.orders().get_by_id(order_id).await?;
        info!(
            order_id = %order_id,
            attempt_id = %attempt_id,
            total_cents = total.cents(),
            label = %label,
            replayed,
            "Order settled"
        );

        Ok(SettlementOutcome {
            order,
            attempt_id: attempt_id.to_string(),
            total,
            payment_label: label,
            cash_ledger,
            debt_postings,
            replayed,
        })
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// The customer the settled order links to: set only when exactly one
    /// distinct customer received a deferred-credit posting.
    fn linked_customer(allocations: &[PaymentAllocation]) -> Option<String> {
        let mut customers = allocations
            .iter()
            .filter(|a| a.kind == PaymentKind::DeferredCredit)
            .filter_map(|a| a.customer_id.as_deref());

        let first = customers.next()?;
        if customers.all(|c| c == first) {
            Some(first.to_string())
        } else {
            None
        }
    }

    /// Builds and dispatches one notice per debt posting. Failures inside
    /// the notifier are its own problem; lookups failing here only cost
    /// the notice, never the settlement.
    async fn emit_notices(&self, items: &[OrderLineItem], postings: &[DebtPosting]) {
        if postings.is_empty() {
            return;
        }

        let lines: Vec<String> = items
            .iter()
            .map(|i| format!("{}x {}", i.quantity, i.name_snapshot))
            .collect();

        for posting in postings {
            let customer = match self.db.customers().get_by_id(&posting.customer_id).await {
                Ok(c) => c,
                Err(e) => {
                    warn!(
                        customer_id = %posting.customer_id,
                        error = %e,
                        "Skipping debt notice, customer lookup failed"
                    );
                    continue;
                }
            };

            let notice = DebtNotice {
                customer_id: customer.id,
                customer_name: customer.name,
                phone: customer.phone,
                amount_cents: posting.amount_cents,
                new_balance_cents: posting.new_balance_cents,
                lines: lines.clone(),
            };

            debug!(customer_id = %notice.customer_id, "Dispatching debt notice");
            self.notifier.notify(&notice);
        }
    }
}
