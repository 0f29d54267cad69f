//! Integration tests for the Sweet Shop storefront.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p sweetshop-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `http_backend` - The HTTP client against a local fake API
//! - `storefront_flows` - Multi-step shopping and admin scenarios
//!
//! Nothing here needs network access: the fake API listens on a loopback
//! port and is backed by the same in-memory shop the unit tests use.

pub mod fake_api;

use std::sync::Arc;

use secrecy::SecretString;
use sweetshop_storefront::api::{InMemoryBackend, ShopBackend};
use sweetshop_storefront::checkout::{SimulatedPayment, SimulatedWidget};
use sweetshop_storefront::persist::{MemoryStore, StateStore};
use sweetshop_storefront::{Storefront, StorefrontOptions};

/// Gateway secret shared by the test backend and the simulated widget.
pub const PAYMENT_SECRET: &str = "integration-signing-secret";

/// Password of every seeded account.
pub const DEMO_PASSWORD: &str = "password";

/// A seeded backend.
#[must_use]
pub fn seeded_backend() -> Arc<InMemoryBackend> {
    Arc::new(InMemoryBackend::seeded(SecretString::from(PAYMENT_SECRET)))
}

/// A widget that approves payments with the shared secret.
#[must_use]
pub fn approving_widget() -> Arc<SimulatedWidget> {
    widget(SimulatedPayment::Approve)
}

#[must_use]
pub fn widget(behaviour: SimulatedPayment) -> Arc<SimulatedWidget> {
    Arc::new(SimulatedWidget::new(
        SecretString::from(PAYMENT_SECRET),
        behaviour,
    ))
}

/// Open a storefront on `backend` with a fresh in-memory state store.
///
/// # Panics
///
/// Panics if the storefront cannot be opened.
pub async fn open_shop(backend: Arc<dyn ShopBackend>) -> Storefront {
    open_shop_with(backend, approving_widget(), Arc::new(MemoryStore::new())).await
}

/// Open a storefront with explicit collaborators.
///
/// # Panics
///
/// Panics if the storefront cannot be opened.
pub async fn open_shop_with(
    backend: Arc<dyn ShopBackend>,
    widget: Arc<SimulatedWidget>,
    store: Arc<dyn StateStore>,
) -> Storefront {
    Storefront::open(backend, widget, store, StorefrontOptions::default())
        .await
        .expect("Failed to open storefront")
}

/// Open a storefront and sign in as `email`.
///
/// # Panics
///
/// Panics if the storefront cannot be opened or sign-in fails.
pub async fn signed_in(backend: Arc<dyn ShopBackend>, email: &str) -> Storefront {
    let mut shop = open_shop(backend).await;
    shop.login(email, DEMO_PASSWORD)
        .await
        .expect("Failed to sign in");
    shop
}
