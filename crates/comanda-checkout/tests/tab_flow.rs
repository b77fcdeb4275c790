//! Integration tests for the tab (line-item ledger) flow against an
//! in-memory database.

use comanda_core::{Product, TableStatus};
use comanda_db::{Database, DbConfig};

use comanda_checkout::TabService;

async fn setup() -> (Database, TabService, String, Product, Product) {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    let table = db.tables().insert(4).await.unwrap();
    let beer = db.products().insert("Chopp 300ml", 650).await.unwrap();
    let fries = db.products().insert("Porção de fritas", 1800).await.unwrap();
    let tabs = TabService::new(db.clone());
    (db, tabs, table.id, beer, fries)
}

#[tokio::test]
async fn first_add_opens_order_and_occupies_table() {
    let (db, tabs, table_id, beer, _) = setup().await;

    let order = tabs
        .add_unit(&table_id, &beer.id, Some("Carlos"))
        .await
        .unwrap();
    assert_eq!(order.total_cents, 650);

    let table = db.tables().get_by_id(&table_id).await.unwrap();
    assert_eq!(table.status, TableStatus::Occupied);
    assert_eq!(table.guest_name.as_deref(), Some("Carlos"));
    assert!(table.opened_at.is_some());
}

#[tokio::test]
async fn total_is_sum_of_lines_under_mutation() {
    let (_, tabs, table_id, beer, fries) = setup().await;

    tabs.add_unit(&table_id, &beer.id, None).await.unwrap();
    tabs.add_unit(&table_id, &beer.id, None).await.unwrap();
    tabs.add_unit(&table_id, &fries.id, None).await.unwrap();
    let order = tabs.add_unit(&table_id, &beer.id, None).await.unwrap();
    assert_eq!(order.total_cents, 650 * 3 + 1800);

    let order = tabs
        .remove_unit(&table_id, &beer.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.total_cents, 650 * 2 + 1800);

    let (_, items) = tabs.tab(&table_id).await.unwrap().unwrap();
    let derived: i64 = items.iter().map(|i| i.total_cents).sum();
    assert_eq!(order.total_cents, derived);
}

#[tokio::test]
async fn price_snapshot_survives_catalog_change() {
    let (db, tabs, table_id, beer, _) = setup().await;

    tabs.add_unit(&table_id, &beer.id, None).await.unwrap();

    // Catalog price changes mid-service
    sqlx::query("UPDATE products SET price_cents = 900 WHERE id = ?")
        .bind(&beer.id)
        .execute(db.pool())
        .await
        .unwrap();

    let order = tabs.add_unit(&table_id, &beer.id, None).await.unwrap();

    // Both units still at the frozen 6.50
    assert_eq!(order.total_cents, 1300);
}

#[tokio::test]
async fn removing_last_item_abandons_order_and_frees_table() {
    let (db, tabs, table_id, beer, _) = setup().await;

    let order = tabs.add_unit(&table_id, &beer.id, None).await.unwrap();

    let result = tabs.remove_unit(&table_id, &beer.id).await.unwrap();
    assert!(result.is_none());

    // The order is gone, not voided or settled
    assert!(db.orders().get_by_id(&order.id).await.is_err());

    let table = db.tables().get_by_id(&table_id).await.unwrap();
    assert_eq!(table.status, TableStatus::Free);
    assert!(table.guest_name.is_none());

    // And a fresh tab can open on the same table
    tabs.add_unit(&table_id, &beer.id, None).await.unwrap();
}

#[tokio::test]
async fn remove_without_open_order_is_noop() {
    let (_, tabs, table_id, beer, _) = setup().await;

    let result = tabs.remove_unit(&table_id, &beer.id).await.unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn remove_of_absent_product_is_noop() {
    let (_, tabs, table_id, beer, fries) = setup().await;

    tabs.add_unit(&table_id, &beer.id, None).await.unwrap();

    let order = tabs
        .remove_unit(&table_id, &fries.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.total_cents, 650);
}

#[tokio::test]
async fn void_keeps_order_on_record_and_frees_table() {
    let (db, tabs, table_id, beer, _) = setup().await;

    tabs.add_unit(&table_id, &beer.id, None).await.unwrap();
    let voided_id = tabs.void_tab(&table_id).await.unwrap().unwrap();

    let order = db.orders().get_by_id(&voided_id).await.unwrap();
    assert_eq!(order.status, comanda_core::OrderStatus::Voided);

    let table = db.tables().get_by_id(&table_id).await.unwrap();
    assert_eq!(table.status, TableStatus::Free);

    // Voiding a free table is a no-op
    assert!(tabs.void_tab(&table_id).await.unwrap().is_none());
}

#[tokio::test]
async fn inactive_product_cannot_be_added() {
    let (db, tabs, table_id, beer, _) = setup().await;

    sqlx::query("UPDATE products SET is_active = 0 WHERE id = ?")
        .bind(&beer.id)
        .execute(db.pool())
        .await
        .unwrap();

    assert!(tabs.add_unit(&table_id, &beer.id, None).await.is_err());
}
