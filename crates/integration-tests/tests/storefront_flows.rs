//! Multi-step shopping and inventory scenarios against the in-memory shop.
//!
//! Run with: cargo test -p sweetshop-integration-tests --test storefront_flows

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use rust_decimal::Decimal;
use secrecy::SecretString;
use sweetshop_core::{SearchFilter, SweetId, SweetUpdate};
use sweetshop_integration_tests::{
    DEMO_PASSWORD, open_shop, open_shop_with, seeded_backend, signed_in, widget,
};
use sweetshop_storefront::api::Operation;
use sweetshop_storefront::cart::CartError;
use sweetshop_storefront::AppError;
use sweetshop_storefront::checkout::{CheckoutError, SimulatedPayment, SimulatedWidget};
use sweetshop_storefront::persist::{FileStore, MemoryStore, StateStore, keys};

const GUMMY_BEARS: SweetId = SweetId::new(3);

// ============================================================================
// Cart and Stock
// ============================================================================

#[tokio::test]
async fn test_cart_follows_stock_changes() {
    let backend = seeded_backend();
    let mut shopper = signed_in(backend.clone(), "demo@example.com").await;
    let mut admin = signed_in(backend.clone(), "admin@example.com").await;

    let bears = shopper.find_sweet(GUMMY_BEARS).await.unwrap();
    shopper.add_to_cart(&bears, 5).await.unwrap();

    admin.set_stock(GUMMY_BEARS, 2).await.unwrap();
    shopper
        .browse(&SearchFilter::all().with_category("Candies"))
        .await
        .unwrap();
    assert_eq!(shopper.cart().line(GUMMY_BEARS).unwrap().quantity, 2);

    admin.set_stock(GUMMY_BEARS, 0).await.unwrap();
    shopper
        .browse(&SearchFilter::all().with_query("gummy"))
        .await
        .unwrap();
    assert!(shopper.cart().line(GUMMY_BEARS).is_none());
}

#[tokio::test]
async fn test_cannot_add_more_than_stock() {
    let mut shop = open_shop(seeded_backend()).await;
    let fudge = shop.find_sweet(SweetId::new(1)).await.unwrap();

    shop.add_to_cart(&fudge, 10).await.unwrap();
    let err = shop.add_to_cart(&fudge, 10).await.unwrap_err();

    assert!(matches!(
        err,
        AppError::Cart(CartError::ExceedsStock { requested: 20, available: 15, .. })
    ));
    assert_eq!(shop.cart().line(fudge.id).unwrap().quantity, 10);
}

#[tokio::test]
async fn test_sold_out_item_cannot_be_added() {
    let mut shop = open_shop(seeded_backend()).await;
    let popcorn = shop.find_sweet(SweetId::new(10)).await.unwrap();

    let err = shop.add_to_cart(&popcorn, 1).await.unwrap_err();

    assert!(matches!(err, AppError::Cart(CartError::OutOfStock { .. })));
    assert!(shop.cart().is_empty());
}

// ============================================================================
// Checkout
// ============================================================================

#[tokio::test]
async fn test_stale_price_refuses_order() {
    let backend = seeded_backend();
    let shopper_widget = widget(SimulatedPayment::Approve);
    let mut shopper = open_shop_with(
        backend.clone(),
        shopper_widget.clone(),
        Arc::new(MemoryStore::new()),
    )
    .await;
    shopper.login("demo@example.com", DEMO_PASSWORD).await.unwrap();
    let mut admin = signed_in(backend.clone(), "admin@example.com").await;

    let fudge = shopper.find_sweet(SweetId::new(1)).await.unwrap();
    shopper.add_to_cart(&fudge, 1).await.unwrap();
    admin
        .update_item(
            fudge.id,
            &SweetUpdate {
                price: Some(Decimal::new(2999, 2)),
                ..SweetUpdate::default()
            },
        )
        .await
        .unwrap();

    let err = shopper.checkout(fudge.id).await.unwrap_err();

    assert!(matches!(
        err,
        AppError::Checkout(CheckoutError::OrderCreation(_))
    ));
    assert_eq!(err.user_message(), "Could not initiate payment. Please try again.");
    assert!(shopper_widget.requests().is_empty());
    assert_eq!(shopper.cart().line(fudge.id).unwrap().quantity, 1);
}

#[tokio::test]
async fn test_forged_payment_fails_verification() {
    let backend = seeded_backend();
    let forger = Arc::new(SimulatedWidget::new(
        SecretString::from("not-the-gateway-secret"),
        SimulatedPayment::Approve,
    ));
    let mut shop = open_shop_with(backend.clone(), forger, Arc::new(MemoryStore::new())).await;
    shop.login("demo@example.com", DEMO_PASSWORD).await.unwrap();

    let bears = shop.find_sweet(GUMMY_BEARS).await.unwrap();
    shop.add_to_cart(&bears, 3).await.unwrap();
    let err = shop.checkout(GUMMY_BEARS).await.unwrap_err();

    assert!(matches!(
        err,
        AppError::Checkout(CheckoutError::Verification(_))
    ));
    assert_eq!(
        err.user_message(),
        "Payment verification failed. Please contact support."
    );
    assert_eq!(backend.sweet(GUMMY_BEARS).unwrap().quantity, 120);
    assert!(backend.purchases().is_empty());
    assert_eq!(shop.cart().line(GUMMY_BEARS).unwrap().quantity, 3);
}

#[tokio::test]
async fn test_declined_payment_reports_gateway_reason() {
    let backend = seeded_backend();
    let mut shop = open_shop_with(
        backend.clone(),
        widget(SimulatedPayment::Decline("Card declined".to_string())),
        Arc::new(MemoryStore::new()),
    )
    .await;
    shop.login("user@example.com", DEMO_PASSWORD).await.unwrap();

    let bears = shop.find_sweet(GUMMY_BEARS).await.unwrap();
    shop.add_to_cart(&bears, 1).await.unwrap();
    let err = shop.checkout(GUMMY_BEARS).await.unwrap_err();

    assert_eq!(err.user_message(), "Payment failed: Card declined");
    assert_eq!(backend.call_count(Operation::VerifyPayment), 0);
    assert!(shop.cart().line(GUMMY_BEARS).is_some());
}

#[tokio::test]
async fn test_new_account_can_buy() {
    let backend = seeded_backend();
    let mut shop = open_shop(backend.clone()).await;

    let user = shop
        .register("Candy Fan", "fan@example.com", "sugar-rush")
        .await
        .unwrap();
    assert!(!user.is_admin());

    let lollipops = shop.find_sweet(SweetId::new(7)).await.unwrap();
    shop.add_to_cart(&lollipops, 10).await.unwrap();
    let bears = shop.find_sweet(GUMMY_BEARS).await.unwrap();
    shop.add_to_cart(&bears, 2).await.unwrap();

    let receipt = shop.checkout(lollipops.id).await.unwrap();

    assert_eq!(receipt.user_id, user.id);
    assert_eq!(receipt.total_price, Decimal::new(1500, 2));
    assert_eq!(backend.sweet(lollipops.id).unwrap().quantity, 190);
    // Only the paid line leaves the cart.
    assert_eq!(shop.cart().lines().len(), 1);
    assert!(shop.cart().line(GUMMY_BEARS).is_some());
}

// ============================================================================
// Admin
// ============================================================================

#[tokio::test]
async fn test_set_stock_is_visible_after_confirmation() {
    let backend = seeded_backend();
    let mut admin = signed_in(backend.clone(), "admin@example.com").await;
    admin.browse(&SearchFilter::all()).await.unwrap();

    let updated = admin.set_stock(SweetId::new(1), 3).await.unwrap();
    assert_eq!(updated.quantity, 3);

    let items = admin.browse(&SearchFilter::all()).await.unwrap();
    let fudge = items.iter().find(|s| s.id == SweetId::new(1)).unwrap();
    assert_eq!(fudge.quantity, 3);
    assert_eq!(backend.call_count(Operation::ListSweets), 2);
}

#[tokio::test]
async fn test_inventory_stats_over_seeded_catalog() {
    let mut admin = signed_in(seeded_backend(), "admin@example.com").await;

    let stats = admin.stats(&SearchFilter::all()).await.unwrap();

    assert_eq!(stats.total_sweets, 10);
    assert_eq!(stats.categories, 4);
    assert_eq!(stats.low_stock_items, 1);
    assert_eq!(stats.total_value, Decimal::new(222_085, 2));
    assert_eq!(stats.average_price, Decimal::new(665, 2));
}

#[tokio::test]
async fn test_restock_zero_is_rejected_locally() {
    let backend = seeded_backend();
    let mut admin = signed_in(backend.clone(), "admin@example.com").await;

    let err = admin.restock(SweetId::new(10), 0).await.unwrap_err();

    let AppError::Validation(errors) = err else {
        panic!("expected validation error");
    };
    assert_eq!(
        errors.message_for("quantityToAdd"),
        Some("Must add at least 1 unit")
    );
    assert_eq!(backend.call_count(Operation::Restock), 0);
}

// ============================================================================
// Persistence
// ============================================================================

#[tokio::test]
async fn test_state_survives_restart_on_disk() {
    let backend = seeded_backend();
    let dir = tempfile::tempdir().unwrap();

    {
        let mut shop = open_shop_with(
            backend.clone(),
            widget(SimulatedPayment::Approve),
            Arc::new(FileStore::new(dir.path())),
        )
        .await;
        shop.login("demo@example.com", DEMO_PASSWORD).await.unwrap();
        let bears = shop.find_sweet(GUMMY_BEARS).await.unwrap();
        shop.add_to_cart(&bears, 4).await.unwrap();
    }

    let mut shop = open_shop_with(
        backend.clone(),
        widget(SimulatedPayment::Approve),
        Arc::new(FileStore::new(dir.path())),
    )
    .await;
    assert_eq!(shop.user().unwrap().username, "Demo User");
    assert_eq!(shop.cart().total_items(), 4);

    let receipt = shop.checkout(GUMMY_BEARS).await.unwrap();
    assert_eq!(receipt.quantity, 4);
}

#[tokio::test]
async fn test_unreadable_state_starts_fresh() {
    let store = Arc::new(MemoryStore::new());
    store.save(keys::CART, "{not json").await.unwrap();
    store.save(keys::SESSION, "[]").await.unwrap();

    let shop = open_shop_with(
        seeded_backend(),
        widget(SimulatedPayment::Approve),
        store,
    )
    .await;

    assert!(shop.cart().is_empty());
    assert!(!shop.session().is_authenticated());
}
