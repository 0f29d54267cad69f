//! The HTTP client against a local fake API.
//!
//! Run with: cargo test -p sweetshop-integration-tests --test http_backend

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde_json::json;
use sweetshop_core::{SearchFilter, SweetId, SweetUpdate};
use sweetshop_integration_tests::fake_api::{FakeApi, serve};
use sweetshop_integration_tests::{DEMO_PASSWORD, approving_widget, seeded_backend};
use sweetshop_storefront::api::{ApiError, Credentials, HttpBackend, Registration, ShopBackend};
use sweetshop_storefront::persist::{FileStore, keys};
use sweetshop_storefront::{AppError, Storefront, StorefrontOptions};

async fn token_for(client: &HttpBackend, email: &str) -> SecretString {
    let response = client
        .login(&Credentials {
            email: email.to_string(),
            password: DEMO_PASSWORD.to_string(),
        })
        .await
        .unwrap();
    SecretString::from(response.token)
}

// ============================================================================
// Auth
// ============================================================================

#[tokio::test]
async fn test_login_unwraps_envelope() {
    let api = FakeApi::start(seeded_backend()).await;

    let response = api
        .client()
        .login(&Credentials {
            email: "demo@example.com".to_string(),
            password: DEMO_PASSWORD.to_string(),
        })
        .await
        .unwrap();

    assert_eq!(response.user.username, "Demo User");
    assert!(!response.token.is_empty());
}

#[tokio::test]
async fn test_wrong_password_is_unauthorized() {
    let api = FakeApi::start(seeded_backend()).await;

    let result = api
        .client()
        .login(&Credentials {
            email: "demo@example.com".to_string(),
            password: "wrong-password".to_string(),
        })
        .await;

    assert!(matches!(result, Err(ApiError::Unauthorized(_))));
}

#[tokio::test]
async fn test_duplicate_registration_is_conflict() {
    let api = FakeApi::start(seeded_backend()).await;

    let result = api
        .client()
        .register(&Registration {
            username: "Someone".to_string(),
            email: "admin@example.com".to_string(),
            password: "secret123".to_string(),
        })
        .await;

    match result {
        Err(ApiError::Conflict(message)) => {
            assert_eq!(message, "This email is already registered.");
        }
        other => panic!("expected conflict, got {other:?}"),
    }
}

// ============================================================================
// Catalog
// ============================================================================

#[tokio::test]
async fn test_filter_sent_as_query_parameters() {
    let api = FakeApi::start(seeded_backend()).await;
    let filter = SearchFilter::all()
        .with_category("Candies")
        .with_price_range(Decimal::new(150, 2), Decimal::new(500, 2));

    let items = api.client().list_sweets(&filter).await.unwrap();

    let names: Vec<&str> = items.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["Gummy Bears", "Lollipops"]);

    let request = api.requests().pop().unwrap();
    assert_eq!(request.method, "GET");
    assert_eq!(request.path, "/api/sweets");
    let params = request.query_pairs();
    assert_eq!(params.get("category").map(String::as_str), Some("Candies"));
    assert_eq!(params.get("min_price").map(String::as_str), Some("1.50"));
    assert_eq!(params.get("max_price").map(String::as_str), Some("5.00"));
    assert!(!params.contains_key("query"));
}

#[tokio::test]
async fn test_unfiltered_list_has_no_query_string() {
    let api = FakeApi::start(seeded_backend()).await;

    let items = api.client().list_sweets(&SearchFilter::all()).await.unwrap();

    assert_eq!(items.len(), 10);
    assert_eq!(api.requests().pop().unwrap().query, None);
}

// ============================================================================
// Admin
// ============================================================================

#[tokio::test]
async fn test_admin_calls_carry_bearer_token() {
    let api = FakeApi::start(seeded_backend()).await;
    let client = api.client();
    let token = token_for(&client, "admin@example.com").await;

    let restocked = client.restock(&token, SweetId::new(10), 12).await.unwrap();
    assert_eq!(restocked.quantity, 12);

    let request = api.requests().pop().unwrap();
    assert_eq!(request.path, "/api/sweets/10/restock");
    assert!(request.bearer.is_some());
}

#[tokio::test]
async fn test_partial_update_keeps_other_fields() {
    let api = FakeApi::start(seeded_backend()).await;
    let client = api.client();
    let token = token_for(&client, "admin@example.com").await;

    let update = SweetUpdate {
        price: Some(Decimal::new(2799, 2)),
        ..SweetUpdate::default()
    };
    let updated = client
        .update_sweet(&token, SweetId::new(1), &update)
        .await
        .unwrap();

    assert_eq!(updated.price, Decimal::new(2799, 2));
    assert_eq!(updated.name, "Chocolate Fudge Cake");
    assert_eq!(updated.quantity, 15);
}

#[tokio::test]
async fn test_non_admin_is_forbidden() {
    let api = FakeApi::start(seeded_backend()).await;
    let client = api.client();
    let token = token_for(&client, "user@example.com").await;

    let result = client.delete_sweet(&token, SweetId::new(1)).await;

    assert!(matches!(result, Err(ApiError::Forbidden(_))));
    assert!(api.backend().sweet(SweetId::new(1)).is_some());
}

#[tokio::test]
async fn test_delete_with_empty_body() {
    let api = FakeApi::start(seeded_backend()).await;
    let client = api.client();
    let token = token_for(&client, "admin@example.com").await;

    client.delete_sweet(&token, SweetId::new(2)).await.unwrap();

    assert!(api.backend().sweet(SweetId::new(2)).is_none());
}

#[tokio::test]
async fn test_unknown_token_is_unauthorized() {
    let api = FakeApi::start(seeded_backend()).await;

    let result = api
        .client()
        .set_quantity(&SecretString::from("stale-token"), SweetId::new(1), 3)
        .await;

    assert!(matches!(result, Err(ApiError::Unauthorized(_))));
}

// ============================================================================
// Response Shapes
// ============================================================================

#[tokio::test]
async fn test_failure_envelope_is_rejected() {
    let router = Router::new().route(
        "/api/sweets/{id}/restock",
        post(|| async { Json(json!({ "success": false, "message": "Warehouse closed" })) }),
    );
    let (base_url, _server) = serve(router).await;
    let client = HttpBackend::new(base_url, Duration::from_secs(5)).unwrap();

    let result = client
        .restock(&SecretString::from("t"), SweetId::new(1), 1)
        .await;

    match result {
        Err(ApiError::Rejected(message)) => assert_eq!(message, "Warehouse closed"),
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn test_rate_limit_reads_retry_after() {
    let router = Router::new().route(
        "/api/sweets",
        get(|| async {
            (StatusCode::TOO_MANY_REQUESTS, [(header::RETRY_AFTER, "7")]).into_response()
        }),
    );
    let (base_url, _server) = serve(router).await;
    let client = HttpBackend::new(base_url, Duration::from_secs(5)).unwrap();

    let result = client.list_sweets(&SearchFilter::all()).await;

    assert!(matches!(result, Err(ApiError::RateLimited(7))));
}

#[tokio::test]
async fn test_server_error_keeps_status_and_detail() {
    let router = Router::new().route(
        "/api/sweets",
        get(|| async {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "detail": "Database is down" })),
            )
        }),
    );
    let (base_url, _server) = serve(router).await;
    let client = HttpBackend::new(base_url, Duration::from_secs(5)).unwrap();

    let err = client.list_sweets(&SearchFilter::all()).await.unwrap_err();

    assert!(err.is_server_class());
    match err {
        ApiError::Server { status, message } => {
            assert_eq!(status, 503);
            assert_eq!(message, "Database is down");
        }
        other => panic!("expected server error, got {other:?}"),
    }
}

// ============================================================================
// Storefront over HTTP
// ============================================================================

#[tokio::test]
async fn test_checkout_over_http_with_file_store() {
    let api = FakeApi::start(seeded_backend()).await;
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::new(dir.path()));

    let mut shop = Storefront::open(
        Arc::new(api.client()),
        approving_widget(),
        store.clone(),
        StorefrontOptions::default(),
    )
    .await
    .unwrap();
    shop.login("demo@example.com", DEMO_PASSWORD).await.unwrap();

    let croissants = shop.find_sweet(SweetId::new(6)).await.unwrap();
    shop.add_to_cart(&croissants, 4).await.unwrap();
    let receipt = shop.checkout(croissants.id).await.unwrap();

    assert_eq!(receipt.total_price, Decimal::new(1200, 2));
    assert_eq!(api.backend().sweet(croissants.id).unwrap().quantity, 36);
    assert!(shop.cart().is_empty());

    let paths: Vec<String> = api.requests().into_iter().map(|r| r.path).collect();
    assert!(paths.contains(&"/api/payments/create-order".to_string()));
    assert!(paths.contains(&"/api/payments/verify".to_string()));

    assert!(dir.path().join(format!("{}.json", keys::CART)).exists());
    assert!(dir.path().join(format!("{}.json", keys::SESSION)).exists());
}

#[tokio::test]
async fn test_expired_token_signs_out_over_http() {
    let api = FakeApi::start(seeded_backend()).await;
    let mut shop = Storefront::open(
        Arc::new(api.client()),
        approving_widget(),
        Arc::new(sweetshop_storefront::persist::MemoryStore::new()),
        StorefrontOptions::default(),
    )
    .await
    .unwrap();
    shop.login("admin@example.com", DEMO_PASSWORD).await.unwrap();

    api.backend()
        .fail_next(
            sweetshop_storefront::api::Operation::Restock,
            ApiError::Unauthorized("Token expired".to_string()),
        );
    let err = shop.restock(SweetId::new(1), 5).await.unwrap_err();

    assert!(matches!(err, AppError::Authentication(_)));
    assert!(!shop.session().is_authenticated());
}
