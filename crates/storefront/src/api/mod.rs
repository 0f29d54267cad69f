//! Remote inventory and order API.
//!
//! # Architecture
//!
//! - [`ShopBackend`] has one method per remote endpoint
//! - [`HttpBackend`] talks to the real JSON API with `reqwest`
//! - [`InMemoryBackend`] implements the same contract in-process, seeded
//!   with the demo catalog and demo accounts, for offline use and tests
//!
//! # Endpoints
//!
//! | Operation | HTTP |
//! |---|---|
//! | [`ShopBackend::login`] | `POST /auth/login` |
//! | [`ShopBackend::register`] | `POST /auth/register` |
//! | [`ShopBackend::list_sweets`] | `GET /sweets?query=&category=&min_price=&max_price=` |
//! | [`ShopBackend::create_sweet`] | `POST /sweets` |
//! | [`ShopBackend::update_sweet`] | `PUT /sweets/{id}` |
//! | [`ShopBackend::set_quantity`] | `PATCH /sweets/{id}` |
//! | [`ShopBackend::delete_sweet`] | `DELETE /sweets/{id}` |
//! | [`ShopBackend::restock`] | `POST /sweets/{id}/restock` |
//! | [`ShopBackend::create_payment_order`] | `POST /payments/create-order` |
//! | [`ShopBackend::verify_payment`] | `POST /payments/verify` |

mod http;
mod memory;

pub use http::HttpBackend;
pub use memory::{InMemoryBackend, Operation};

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use sweetshop_core::{
    NewSweet, PaymentOrder, PaymentProof, PurchaseReceipt, SearchFilter, Sweet, SweetId,
    SweetUpdate, UserProfile,
};
use thiserror::Error;

/// Errors that can occur when talking to the inventory API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP request failed before a response arrived.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend could not be reached.
    #[error("Network error: {0}")]
    Network(String),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Endpoint URL could not be built.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Credentials missing, wrong, or expired (401).
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not allowed (403).
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Resource not found (404).
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request conflicts with existing state, e.g. a taken email (409).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Request refused by the server, e.g. not enough stock (400, 422).
    #[error("Rejected: {0}")]
    Rejected(String),

    /// Rate limited by the API.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Any other non-success status.
    #[error("Server error ({status}): {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Message from the response body, if any.
        message: String,
    },
}

impl ApiError {
    /// Whether the server rejected the bearer credential.
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }

    /// Whether this is a transport or server-side failure rather than a
    /// refusal of the request itself.
    #[must_use]
    pub const fn is_server_class(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::Network(_) | Self::Parse(_) | Self::Url(_) | Self::Server { .. }
        )
    }
}

// =============================================================================
// Request / Response Bodies
// =============================================================================

/// Body of `POST /auth/login`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Body of `POST /auth/register`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Successful login or registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user: UserProfile,
    #[serde(alias = "access_token")]
    pub token: String,
}

/// Body of `POST /payments/create-order`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub sweet_id: SweetId,
    pub quantity: u32,
    /// Expected total in minor units (paise).
    pub amount: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct QuantityBody {
    pub quantity: u32,
}

// =============================================================================
// ShopBackend
// =============================================================================

/// One method per remote endpoint.
///
/// Operations that need a signed-in account take the bearer token; the
/// backend decides whether the account may perform them.
#[async_trait]
pub trait ShopBackend: Send + Sync {
    /// Exchange email and password for a session.
    async fn login(&self, credentials: &Credentials) -> Result<AuthResponse, ApiError>;

    /// Create an account and sign it in.
    async fn register(&self, registration: &Registration) -> Result<AuthResponse, ApiError>;

    /// Items matching the filter.
    async fn list_sweets(&self, filter: &SearchFilter) -> Result<Vec<Sweet>, ApiError>;

    /// Add a new item to the catalog (admin).
    async fn create_sweet(&self, token: &SecretString, sweet: &NewSweet)
    -> Result<Sweet, ApiError>;

    /// Edit an existing item (admin).
    async fn update_sweet(
        &self,
        token: &SecretString,
        id: SweetId,
        update: &SweetUpdate,
    ) -> Result<Sweet, ApiError>;

    /// Overwrite an item's available quantity (admin).
    async fn set_quantity(
        &self,
        token: &SecretString,
        id: SweetId,
        quantity: u32,
    ) -> Result<Sweet, ApiError>;

    /// Remove an item from the catalog (admin).
    async fn delete_sweet(&self, token: &SecretString, id: SweetId) -> Result<(), ApiError>;

    /// Add stock to an item (admin).
    async fn restock(
        &self,
        token: &SecretString,
        id: SweetId,
        quantity: u32,
    ) -> Result<Sweet, ApiError>;

    /// Ask the gateway for a payment order.
    async fn create_payment_order(
        &self,
        token: &SecretString,
        request: &OrderRequest,
    ) -> Result<PaymentOrder, ApiError>;

    /// Verify the widget's proof and finalize the purchase.
    async fn verify_payment(
        &self,
        token: &SecretString,
        proof: &PaymentProof,
    ) -> Result<PurchaseReceipt, ApiError>;
}
