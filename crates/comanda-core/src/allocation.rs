//! # Payment Allocation
//!
//! Split-payment staging for one checkout session.
//!
//! ## Why Stage Client-Side?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   Allocation Working Set                                │
//! │                                                                         │
//! │  Total to pay: 37.50                                                   │
//! │                                                                         │
//! │  propose(Cash 20.00)          ──► remaining 17.50                      │
//! │  propose(DeferredCredit 17.50)──► remaining 0.00 ──► is_complete()     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SettlementCoordinator::settle(order, allocations)                     │
//! │                                                                         │
//! │  Everything above the settle call is IN MEMORY ONLY. Staff may add    │
//! │  and withdraw proposals freely, or walk away entirely, and no ledger  │
//! │  is ever touched. Only a complete, balanced set is submitted.          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! This is what keeps an abandoned checkout from leaving partial,
//! inconsistent ledger writes behind.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{PaymentAllocation, PaymentKind};
use crate::ALLOCATION_EPSILON_CENTS;

// =============================================================================
// Allocation Set
// =============================================================================

/// The transient working set of payment declarations for one checkout.
///
/// ## Invariants
/// - Every staged allocation has a positive amount
/// - No allocation exceeds the remaining balance at its declaration time
///   by more than the epsilon
/// - `DeferredCredit` allocations always carry a customer reference
///
/// Scoped to a single checkout session; dropped on completion or
/// abandonment. Never serialized to durable storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationSet {
    total_cents: i64,
    allocations: Vec<PaymentAllocation>,
}

impl AllocationSet {
    /// Starts an empty working set against an order total.
    pub fn new(total: Money) -> Self {
        AllocationSet {
            total_cents: total.cents(),
            allocations: Vec::new(),
        }
    }

    /// The order total this set must cover.
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    /// Sum of all staged allocation amounts.
    pub fn allocated(&self) -> Money {
        Money::from_cents(self.allocations.iter().map(|a| a.amount_cents).sum())
    }

    /// What is still owed: total − allocated. Never below zero from the
    /// caller's point of view (overshoot within epsilon reads as zero).
    pub fn remaining(&self) -> Money {
        let rem = self.total_cents - self.allocated().cents();
        Money::from_cents(rem.max(0))
    }

    /// Stages one more payment declaration.
    ///
    /// ## Rejections (working set left untouched)
    /// - Non-positive amount
    /// - Amount exceeding the remaining balance by more than the epsilon
    /// - `DeferredCredit` without a customer reference
    pub fn propose(&mut self, allocation: PaymentAllocation) -> CoreResult<()> {
        if allocation.amount_cents <= 0 {
            return Err(CoreError::InvalidPaymentAmount {
                amount_cents: allocation.amount_cents,
            });
        }

        if allocation.kind == PaymentKind::DeferredCredit && allocation.customer_id.is_none() {
            return Err(CoreError::MissingDebtor);
        }

        let remaining = self.total_cents - self.allocated().cents();
        if allocation.amount_cents > remaining + ALLOCATION_EPSILON_CENTS {
            return Err(CoreError::AllocationExceedsRemaining {
                amount_cents: allocation.amount_cents,
                remaining_cents: remaining.max(0),
            });
        }

        self.allocations.push(allocation);
        Ok(())
    }

    /// Withdraws a previously staged allocation by index.
    ///
    /// Staff changing their mind mid-checkout is the normal case, not an
    /// error path.
    pub fn withdraw(&mut self, index: usize) -> CoreResult<PaymentAllocation> {
        if index >= self.allocations.len() {
            return Err(CoreError::NoSuchAllocation(index));
        }
        Ok(self.allocations.remove(index))
    }

    /// True iff the staged set covers the total within the epsilon.
    pub fn is_complete(&self) -> bool {
        self.allocated()
            .approx_eq(self.total(), ALLOCATION_EPSILON_CENTS)
    }

    /// The staged allocations in declaration order.
    pub fn allocations(&self) -> &[PaymentAllocation] {
        &self.allocations
    }

    /// Consumes the set, yielding the allocations for submission.
    ///
    /// Callers should check [`is_complete`](Self::is_complete) first; the
    /// coordinator re-validates against a fresh total regardless.
    pub fn into_allocations(self) -> Vec<PaymentAllocation> {
        self.allocations
    }

    /// Number of staged allocations.
    pub fn len(&self) -> usize {
        self.allocations.len()
    }

    /// True when nothing has been staged yet.
    pub fn is_empty(&self) -> bool {
        self.allocations.is_empty()
    }
}

// =============================================================================
// Commit-Time Validation
// =============================================================================

/// Validates a full allocation set against an order total.
///
/// Used by the Settlement Coordinator as its precondition check, after
/// re-deriving the total from current line items (the staged set may have
/// been built against a stale total during a long checkout).
///
/// ## Checks
/// 1. At least one allocation
/// 2. Every amount positive
/// 3. Every `DeferredCredit` carries a customer
/// 4. Σ amounts ≈ total within [`ALLOCATION_EPSILON_CENTS`]
pub fn validate_allocations(total: Money, allocations: &[PaymentAllocation]) -> CoreResult<()> {
    if allocations.is_empty() {
        return Err(CoreError::UnbalancedAllocations {
            allocated_cents: 0,
            total_cents: total.cents(),
        });
    }

    let mut sum = Money::zero();
    for allocation in allocations {
        if allocation.amount_cents <= 0 {
            return Err(CoreError::InvalidPaymentAmount {
                amount_cents: allocation.amount_cents,
            });
        }
        if allocation.kind == PaymentKind::DeferredCredit && allocation.customer_id.is_none() {
            return Err(CoreError::MissingDebtor);
        }
        sum += allocation.amount();
    }

    if !sum.approx_eq(total, ALLOCATION_EPSILON_CENTS) {
        return Err(CoreError::UnbalancedAllocations {
            allocated_cents: sum.cents(),
            total_cents: total.cents(),
        });
    }

    Ok(())
}

/// Picks the reporting label for a settlement: the instrument kind
/// carrying the largest summed amount.
///
/// Ties go to the earliest-declared kind, which matches how staff think
/// about "how was this table paid".
pub fn primary_label(allocations: &[PaymentAllocation]) -> Option<&'static str> {
    let mut totals: Vec<(PaymentKind, i64)> = Vec::new();

    for allocation in allocations {
        match totals.iter_mut().find(|(kind, _)| *kind == allocation.kind) {
            Some((_, sum)) => *sum += allocation.amount_cents,
            None => totals.push((allocation.kind, allocation.amount_cents)),
        }
    }

    // `totals` is in first-declaration order; only a strictly greater sum
    // displaces the current best, so ties keep the earliest kind.
    let mut best: Option<(PaymentKind, i64)> = None;
    for (kind, sum) in totals {
        match best {
            Some((_, best_sum)) if sum <= best_sum => {}
            _ => best = Some((kind, sum)),
        }
    }

    best.map(|(kind, _)| kind.label())
}

// =============================================================================
// Unit Tests
// =============================================================================
