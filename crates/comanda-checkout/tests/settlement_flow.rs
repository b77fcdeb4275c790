//! Integration tests for the Settlement Coordinator against an in-memory
//! database: split payments, idempotent replay, and failure atomicity.

use std::sync::{Arc, Mutex};

use comanda_core::{
    CoreError, Customer, OrderStatus, PaymentAllocation, PaymentKind, Product, TableStatus,
};
use comanda_db::{Database, DbConfig};

use comanda_checkout::{
    CashLedger, CheckoutError, DebtNotice, Notifier, SettlementCoordinator, TabService,
};

/// Notifier that records every notice for assertions.
#[derive(Default)]
struct CapturingNotifier {
    notices: Mutex<Vec<DebtNotice>>,
}

impl Notifier for CapturingNotifier {
    fn notify(&self, notice: &DebtNotice) {
        self.notices.lock().unwrap().push(notice.clone());
    }
}

struct Harness {
    db: Database,
    tabs: TabService,
    coordinator: SettlementCoordinator,
    notifier: Arc<CapturingNotifier>,
    table_id: String,
    beer: Product,
    fries: Product,
    maria: Customer,
    joao: Customer,
}

async fn setup() -> Harness {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    let table = db.tables().insert(4).await.unwrap();
    let beer = db.products().insert("Chopp 300ml", 650).await.unwrap();
    let fries = db.products().insert("Porção de fritas", 1800).await.unwrap();
    let maria = db
        .customers()
        .insert("Maria", Some("+55 11 91234-5678"), 0)
        .await
        .unwrap();
    let joao = db.customers().insert("João", None, 0).await.unwrap();

    let notifier = Arc::new(CapturingNotifier::default());
    Harness {
        tabs: TabService::new(db.clone()),
        coordinator: SettlementCoordinator::new(db.clone(), notifier.clone()),
        db,
        notifier,
        table_id: table.id,
        beer,
        fries,
        maria,
        joao,
    }
}

impl Harness {
    /// Builds the canonical 37.50 tab: 3 beers (19.50) + fries (18.00).
    async fn tab_3750(&self) -> String {
        for _ in 0..3 {
            self.tabs
                .add_unit(&self.table_id, &self.beer.id, None)
                .await
                .unwrap();
        }
        let order = self
            .tabs
            .add_unit(&self.table_id, &self.fries.id, None)
            .await
            .unwrap();
        assert_eq!(order.total_cents, 3750);
        order.id
    }

    async fn cash_tx_count(&self) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM cash_transactions")
            .fetch_one(self.db.pool())
            .await
            .unwrap()
    }

    async fn debt_entry_count(&self) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM debt_entries")
            .fetch_one(self.db.pool())
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn split_cash_and_deferred_settlement() {
    let h = setup().await;
    let order_id = h.tab_3750().await;
    let session = h.db.cash().open_session(10_000, "ana").await.unwrap();

    let outcome = h
        .coordinator
        .settle(
            &order_id,
            vec![
                PaymentAllocation::immediate(PaymentKind::Cash, 2_000),
                PaymentAllocation::deferred(1_750, h.maria.id.clone()),
            ],
            "ana",
        )
        .await
        .unwrap();

    assert_eq!(outcome.total.cents(), 3_750);
    assert_eq!(outcome.payment_label, "cash");
    assert!(!outcome.replayed);
    assert_eq!(
        outcome.cash_ledger,
        CashLedger::Recorded {
            session_id: session.id.clone()
        }
    );

    // Order closed and linked to the single deferred customer
    let order = h.db.orders().get_by_id(&order_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Settled);
    assert_eq!(order.customer_id.as_deref(), Some(h.maria.id.as_str()));
    assert_eq!(order.payment_label.as_deref(), Some("cash"));
    assert!(order.settled_at.is_some());

    // Drawer got exactly the cash part
    let txs = h.db.cash().transactions(&session.id).await.unwrap();
    assert_eq!(txs.len(), 1);
    assert_eq!(txs[0].amount_cents, 2_000);
    assert_eq!(txs[0].order_id.as_deref(), Some(order_id.as_str()));
    assert_eq!(
        h.db.cash().expected_balance(&session.id).await.unwrap(),
        12_000
    );

    // Debt ledger got exactly the deferred part
    assert_eq!(h.db.customers().balance(&h.maria.id).await.unwrap(), 1_750);
    let entries = h.db.customers().debt_entries(&h.maria.id).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].order_id, order_id);

    // Table freed
    let table = h.db.tables().get_by_id(&h.table_id).await.unwrap();
    assert_eq!(table.status, TableStatus::Free);

    // One notice for the one deferred posting
    let notices = h.notifier.notices.lock().unwrap();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].amount_cents, 1_750);
    assert_eq!(notices[0].new_balance_cents, 1_750);
    assert!(notices[0].lines.iter().any(|l| l == "3x Chopp 300ml"));
}

#[tokio::test]
async fn short_allocation_rejected_with_no_writes() {
    let h = setup().await;
    let order_id = h.tab_3750().await;
    h.db.cash().open_session(10_000, "ana").await.unwrap();

    // 37.00 against a 37.50 total
    let err = h
        .coordinator
        .settle(
            &order_id,
            vec![PaymentAllocation::immediate(PaymentKind::Cash, 3_700)],
            "ana",
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CheckoutError::Core(CoreError::UnbalancedAllocations {
            allocated_cents: 3_700,
            total_cents: 3_750,
        })
    ));

    // Nothing moved anywhere
    let order = h.db.orders().get_by_id(&order_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Open);
    assert_eq!(h.cash_tx_count().await, 0);
    assert_eq!(h.debt_entry_count().await, 0);
    let table = h.db.tables().get_by_id(&h.table_id).await.unwrap();
    assert_eq!(table.status, TableStatus::Occupied);
}

#[tokio::test]
async fn replaying_the_same_attempt_is_idempotent() {
    let h = setup().await;
    let order_id = h.tab_3750().await;
    h.db.cash().open_session(0, "ana").await.unwrap();

    let allocations = vec![
        PaymentAllocation::immediate(PaymentKind::Cash, 2_000),
        PaymentAllocation::deferred(1_750, h.maria.id.clone()),
    ];

    let first = h
        .coordinator
        .settle_attempt(&order_id, &allocations, "ana", "attempt-fixed")
        .await
        .unwrap();
    assert!(!first.replayed);

    // Crash-and-resume: the same attempt id runs the whole sequence again
    let second = h
        .coordinator
        .settle_attempt(&order_id, &allocations, "ana", "attempt-fixed")
        .await
        .unwrap();
    assert!(second.replayed);

    // Every ledger applied exactly once
    assert_eq!(h.cash_tx_count().await, 1);
    assert_eq!(h.debt_entry_count().await, 1);
    assert_eq!(h.db.customers().balance(&h.maria.id).await.unwrap(), 1_750);

    // A different attempt against the settled order is a conflict
    let err = h
        .coordinator
        .settle_attempt(&order_id, &allocations, "ana", "attempt-other")
        .await
        .unwrap_err();
    assert!(err.is_conflict());
}

#[tokio::test]
async fn empty_order_cannot_settle() {
    let h = setup().await;
    // An empty open order can only exist below the tab service
    let order = h.db.orders().open_order(&h.table_id).await.unwrap();

    let err = h
        .coordinator
        .settle(
            &order.id,
            vec![PaymentAllocation::immediate(PaymentKind::Cash, 100)],
            "ana",
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::Core(CoreError::EmptyOrder(_))));
}

#[tokio::test]
async fn deferred_only_settlement_touches_no_drawer() {
    let h = setup().await;
    let order_id = h.tab_3750().await;
    let session = h.db.cash().open_session(5_000, "ana").await.unwrap();

    let outcome = h
        .coordinator
        .settle(
            &order_id,
            vec![PaymentAllocation::deferred(3_750, h.maria.id.clone())],
            "ana",
        )
        .await
        .unwrap();

    assert_eq!(outcome.payment_label, "deferred_credit");
    assert_eq!(outcome.cash_ledger, CashLedger::NotApplicable);
    assert_eq!(h.cash_tx_count().await, 0);
    assert_eq!(
        h.db.cash().expected_balance(&session.id).await.unwrap(),
        5_000
    );
    assert_eq!(h.db.customers().balance(&h.maria.id).await.unwrap(), 3_750);
}

#[tokio::test]
async fn cash_sale_without_open_session_still_settles() {
    let h = setup().await;
    let order_id = h.tab_3750().await;

    let outcome = h
        .coordinator
        .settle(
            &order_id,
            vec![PaymentAllocation::immediate(PaymentKind::Cash, 3_750)],
            "ana",
        )
        .await
        .unwrap();

    assert_eq!(outcome.cash_ledger, CashLedger::NoOpenSession);
    assert_eq!(h.cash_tx_count().await, 0);

    let order = h.db.orders().get_by_id(&order_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Settled);
    let table = h.db.tables().get_by_id(&h.table_id).await.unwrap();
    assert_eq!(table.status, TableStatus::Free);
}

#[tokio::test]
async fn two_deferred_customers_leave_order_unlinked() {
    let h = setup().await;
    let order_id = h.tab_3750().await;

    let outcome = h
        .coordinator
        .settle(
            &order_id,
            vec![
                PaymentAllocation::deferred(2_000, h.maria.id.clone()),
                PaymentAllocation::deferred(1_750, h.joao.id.clone()),
            ],
            "ana",
        )
        .await
        .unwrap();

    assert_eq!(outcome.debt_postings.len(), 2);

    let order = h.db.orders().get_by_id(&order_id).await.unwrap();
    assert!(order.customer_id.is_none());
    assert_eq!(h.db.customers().balance(&h.maria.id).await.unwrap(), 2_000);
    assert_eq!(h.db.customers().balance(&h.joao.id).await.unwrap(), 1_750);

    // One notice per posting, each with its own balance
    let notices = h.notifier.notices.lock().unwrap();
    assert_eq!(notices.len(), 2);
}

#[tokio::test]
async fn stale_staged_total_is_caught_at_commit() {
    let h = setup().await;
    let order_id = h.tab_3750().await;

    // Another waiter adds a beer after the checkout screen was opened
    h.tabs
        .add_unit(&h.table_id, &h.beer.id, None)
        .await
        .unwrap();

    // Allocations built against the stale 37.50 total
    let err = h
        .coordinator
        .settle(
            &order_id,
            vec![PaymentAllocation::immediate(PaymentKind::Cash, 3_750)],
            "ana",
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CheckoutError::Core(CoreError::UnbalancedAllocations { .. })
    ));

    let order = h.db.orders().get_by_id(&order_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Open);
}
