//! HTTP JSON implementation of [`ShopBackend`].
//!
//! Responses may arrive bare or wrapped in `{"success": true, "data": ...}`;
//! both shapes are accepted. Error bodies carry a `message` (or `detail`)
//! string that is passed through to the caller.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::Value;
use sweetshop_core::{
    NewSweet, PaymentOrder, PaymentProof, PurchaseReceipt, SearchFilter, Sweet, SweetId,
    SweetUpdate,
};
use tracing::instrument;
use url::Url;

use super::{
    ApiError, AuthResponse, Credentials, OrderRequest, QuantityBody, Registration, ShopBackend,
};

const LOG_BODY_LIMIT: usize = 500;

/// Client for the remote inventory API.
///
/// Cheap to clone; clones share one connection pool.
#[derive(Clone)]
pub struct HttpBackend {
    inner: Arc<HttpBackendInner>,
}

struct HttpBackendInner {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpBackend {
    /// Create a client for the API rooted at `base_url`.
    ///
    /// `base_url` should end with `/` so that endpoint paths are joined
    /// under it rather than replacing its last segment.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            inner: Arc::new(HttpBackendInner { client, base_url }),
        })
    }

    /// The API root this client talks to.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.inner.base_url.join(path)?)
    }

    /// `GET /sweets` with the filter's fields as query parameters.
    fn sweets_url(&self, filter: &SearchFilter) -> Result<Url, ApiError> {
        let mut url = self.endpoint("sweets")?;

        let mut pairs: Vec<(&str, String)> = Vec::new();
        if let Some(query) = &filter.query {
            pairs.push(("query", query.clone()));
        }
        if let Some(category) = &filter.category {
            pairs.push(("category", category.clone()));
        }
        if let Some(range) = filter.price {
            pairs.push(("min_price", range.min.to_string()));
            pairs.push(("max_price", range.max.to_string()));
        }
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }

        Ok(url)
    }

    /// Send a request and decode the (possibly enveloped) JSON body.
    async fn execute<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ApiError> {
        let response = request
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();

        // Check for rate limiting
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(ApiError::RateLimited(retry_after));
        }

        // Get response body as text first for better error diagnostics
        let response_text = response.text().await?;

        if !status.is_success() {
            if status.is_server_error() {
                tracing::error!(
                    status = %status,
                    body = %truncate(&response_text, LOG_BODY_LIMIT),
                    "API returned server error"
                );
            } else {
                tracing::debug!(status = %status, "API refused request");
            }
            let message = error_message(&response_text).unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("Unexpected response")
                    .to_string()
            });
            return Err(status_error(status, message));
        }

        unwrap_envelope(&response_text).inspect_err(|e| {
            tracing::error!(
                error = %e,
                body = %truncate(&response_text, LOG_BODY_LIMIT),
                "Failed to parse API response"
            );
        })
    }

    fn authorized(
        &self,
        request: reqwest::RequestBuilder,
        token: &SecretString,
    ) -> reqwest::RequestBuilder {
        request.bearer_auth(token.expose_secret())
    }
}

#[async_trait]
impl ShopBackend for HttpBackend {
    #[instrument(skip(self, credentials), fields(email = %credentials.email))]
    async fn login(&self, credentials: &Credentials) -> Result<AuthResponse, ApiError> {
        let url = self.endpoint("auth/login")?;
        self.execute(self.inner.client.post(url).json(credentials))
            .await
    }

    #[instrument(skip(self, registration), fields(email = %registration.email))]
    async fn register(&self, registration: &Registration) -> Result<AuthResponse, ApiError> {
        let url = self.endpoint("auth/register")?;
        self.execute(self.inner.client.post(url).json(registration))
            .await
    }

    #[instrument(skip(self))]
    async fn list_sweets(&self, filter: &SearchFilter) -> Result<Vec<Sweet>, ApiError> {
        let url = self.sweets_url(filter)?;
        self.execute(self.inner.client.get(url)).await
    }

    #[instrument(skip(self, token, sweet), fields(name = %sweet.name))]
    async fn create_sweet(
        &self,
        token: &SecretString,
        sweet: &NewSweet,
    ) -> Result<Sweet, ApiError> {
        let url = self.endpoint("sweets")?;
        let request = self.authorized(self.inner.client.post(url), token).json(sweet);
        self.execute(request).await
    }

    #[instrument(skip(self, token, update), fields(sweet_id = %id))]
    async fn update_sweet(
        &self,
        token: &SecretString,
        id: SweetId,
        update: &SweetUpdate,
    ) -> Result<Sweet, ApiError> {
        let url = self.endpoint(&format!("sweets/{id}"))?;
        let request = self.authorized(self.inner.client.put(url), token).json(update);
        self.execute(request).await
    }

    #[instrument(skip(self, token), fields(sweet_id = %id))]
    async fn set_quantity(
        &self,
        token: &SecretString,
        id: SweetId,
        quantity: u32,
    ) -> Result<Sweet, ApiError> {
        let url = self.endpoint(&format!("sweets/{id}"))?;
        let request = self
            .authorized(self.inner.client.patch(url), token)
            .json(&QuantityBody { quantity });
        self.execute(request).await
    }

    #[instrument(skip(self, token), fields(sweet_id = %id))]
    async fn delete_sweet(&self, token: &SecretString, id: SweetId) -> Result<(), ApiError> {
        let url = self.endpoint(&format!("sweets/{id}"))?;
        let request = self.authorized(self.inner.client.delete(url), token);
        // Body shape varies (empty, message, or envelope); only the status matters.
        self.execute::<Value>(request).await?;
        Ok(())
    }

    #[instrument(skip(self, token), fields(sweet_id = %id))]
    async fn restock(
        &self,
        token: &SecretString,
        id: SweetId,
        quantity: u32,
    ) -> Result<Sweet, ApiError> {
        let url = self.endpoint(&format!("sweets/{id}/restock"))?;
        let request = self
            .authorized(self.inner.client.post(url), token)
            .json(&QuantityBody { quantity });
        self.execute(request).await
    }

    #[instrument(skip(self, token), fields(sweet_id = %request.sweet_id, amount = request.amount))]
    async fn create_payment_order(
        &self,
        token: &SecretString,
        request: &OrderRequest,
    ) -> Result<PaymentOrder, ApiError> {
        let url = self.endpoint("payments/create-order")?;
        let request = self.authorized(self.inner.client.post(url), token).json(request);
        self.execute(request).await
    }

    #[instrument(skip(self, token, proof), fields(order_id = %proof.order_id))]
    async fn verify_payment(
        &self,
        token: &SecretString,
        proof: &PaymentProof,
    ) -> Result<PurchaseReceipt, ApiError> {
        let url = self.endpoint("payments/verify")?;
        let request = self.authorized(self.inner.client.post(url), token).json(proof);
        self.execute(request).await
    }
}

// =============================================================================
// Response Helpers
// =============================================================================

/// Map a non-success status to the error taxonomy.
fn status_error(status: StatusCode, message: String) -> ApiError {
    match status.as_u16() {
        401 => ApiError::Unauthorized(message),
        403 => ApiError::Forbidden(message),
        404 => ApiError::NotFound(message),
        409 => ApiError::Conflict(message),
        400 | 422 => ApiError::Rejected(message),
        code => ApiError::Server {
            status: code,
            message,
        },
    }
}

/// Pull a human-readable message out of an error body.
fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["message", "detail", "error"]
        .iter()
        .find_map(|key| value.get(key).and_then(Value::as_str))
        .map(str::to_string)
}

/// Decode a success body, unwrapping `{"success": ..., "data": ...}`.
fn unwrap_envelope<T: DeserializeOwned>(body: &str) -> Result<T, ApiError> {
    let value: Value = if body.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(body)?
    };

    let payload = match value {
        Value::Object(mut map) if map.get("success").is_some_and(Value::is_boolean) => {
            if map.get("success") == Some(&Value::Bool(false)) {
                let message = map
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("Request failed")
                    .to_string();
                return Err(ApiError::Rejected(message));
            }
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    };

    Ok(serde_json::from_value(payload)?)
}

fn truncate(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}
