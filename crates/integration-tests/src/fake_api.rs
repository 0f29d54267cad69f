//! A local HTTP server speaking the inventory API.
//!
//! Requests are served by an [`InMemoryBackend`], so the HTTP client can be
//! exercised end to end against the same rules the in-memory tests use.
//! Mutations answer with a `{"success": true, "data": ...}` envelope; the
//! list endpoint answers with a bare array, like the real service.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::extract::{Path, Query, Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sweetshop_core::{
    NewSweet, PaymentProof, SearchFilter, Sweet, SweetId, SweetUpdate,
};
use sweetshop_storefront::api::{
    ApiError, Credentials, HttpBackend, InMemoryBackend, OrderRequest, Registration, ShopBackend,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use url::Url;

/// One request as the server saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub bearer: Option<String>,
}

impl RecordedRequest {
    /// Decoded query parameters.
    #[must_use]
    pub fn query_pairs(&self) -> HashMap<String, String> {
        self.query
            .as_deref()
            .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default()
    }
}

type RequestLog = Arc<Mutex<Vec<RecordedRequest>>>;

/// Running fake API. The server stops when this is dropped.
pub struct FakeApi {
    backend: Arc<InMemoryBackend>,
    base_url: Url,
    log: RequestLog,
    handle: JoinHandle<()>,
}

impl FakeApi {
    /// Serve `backend` on a loopback port.
    ///
    /// # Panics
    ///
    /// Panics if no port can be bound.
    pub async fn start(backend: Arc<InMemoryBackend>) -> Self {
        let log = RequestLog::default();
        let (base_url, handle) = serve(router(backend.clone(), log.clone())).await;
        Self {
            backend,
            base_url,
            log,
            handle,
        }
    }

    /// API root, ending in `/api/`.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The backend behind the server.
    #[must_use]
    pub const fn backend(&self) -> &Arc<InMemoryBackend> {
        &self.backend
    }

    /// An HTTP client for this server.
    ///
    /// # Panics
    ///
    /// Panics if the client cannot be built.
    #[must_use]
    pub fn client(&self) -> HttpBackend {
        HttpBackend::new(self.base_url.clone(), Duration::from_secs(5))
            .expect("Failed to build HTTP client")
    }

    /// Every request received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Drop for FakeApi {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Serve any router on a loopback port, returning its `/api/` root.
///
/// # Panics
///
/// Panics if no port can be bound.
pub async fn serve(router: Router) -> (Url, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind loopback port");
    let addr = listener.local_addr().expect("Listener has no address");
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    let base_url = Url::parse(&format!("http://{addr}/api/")).expect("Invalid server URL");
    (base_url, handle)
}

fn router(backend: Arc<InMemoryBackend>, log: RequestLog) -> Router {
    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/register", post(register))
        .route("/api/sweets", get(list_sweets).post(create_sweet))
        .route(
            "/api/sweets/{id}",
            put(update_sweet).patch(set_quantity).delete(delete_sweet),
        )
        .route("/api/sweets/{id}/restock", post(restock))
        .route("/api/payments/create-order", post(create_order))
        .route("/api/payments/verify", post(verify_payment))
        .layer(middleware::from_fn_with_state(log, record))
        .with_state(backend)
}

async fn record(State(log): State<RequestLog>, request: Request, next: Next) -> Response {
    let bearer = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string);
    let entry = RecordedRequest {
        method: request.method().to_string(),
        path: request.uri().path().to_string(),
        query: request.uri().query().map(str::to_string),
        bearer,
    };
    log.lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(entry);
    next.run(request).await
}

// =============================================================================
// Responses
// =============================================================================

/// An [`ApiError`] rendered the way the service reports failures.
struct Failure(ApiError);

impl From<ApiError> for Failure {
    fn from(err: ApiError) -> Self {
        Self(err)
    }
}

impl IntoResponse for Failure {
    fn into_response(self) -> Response {
        let (status, message) = match self.0 {
            ApiError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, m),
            ApiError::Forbidden(m) => (StatusCode::FORBIDDEN, m),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::Conflict(m) => (StatusCode::CONFLICT, m),
            ApiError::Rejected(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::RateLimited(secs) => {
                return (
                    StatusCode::TOO_MANY_REQUESTS,
                    [(header::RETRY_AFTER, secs.to_string())],
                )
                    .into_response();
            }
            other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        };
        (status, Json(json!({ "success": false, "message": message }))).into_response()
    }
}

type Reply = Result<Json<Value>, Failure>;

fn envelope<T: Serialize>(data: &T) -> Reply {
    let data = serde_json::to_value(data).map_err(|e| Failure(ApiError::Parse(e)))?;
    Ok(Json(json!({ "success": true, "data": data })))
}

fn bearer(headers: &HeaderMap) -> SecretString {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or_default();
    SecretString::from(token.to_string())
}

#[derive(Deserialize)]
struct QuantityBody {
    quantity: u32,
}

// =============================================================================
// Handlers
// =============================================================================

type Shop = State<Arc<InMemoryBackend>>;

async fn login(State(shop): Shop, Json(credentials): Json<Credentials>) -> Reply {
    envelope(&shop.login(&credentials).await?)
}

async fn register(State(shop): Shop, Json(registration): Json<Registration>) -> Reply {
    envelope(&shop.register(&registration).await?)
}

async fn list_sweets(
    State(shop): Shop,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<Sweet>>, Failure> {
    let mut filter = SearchFilter::all();
    if let Some(query) = params.get("query") {
        filter = filter.with_query(query.as_str());
    }
    if let Some(category) = params.get("category") {
        filter = filter.with_category(category.as_str());
    }
    let price = |key: &str| params.get(key).and_then(|v| Decimal::from_str(v).ok());
    if let (Some(min), Some(max)) = (price("min_price"), price("max_price")) {
        filter = filter.with_price_range(min, max);
    }
    Ok(Json(shop.list_sweets(&filter).await?))
}

async fn create_sweet(State(shop): Shop, headers: HeaderMap, Json(sweet): Json<NewSweet>) -> Reply {
    envelope(&shop.create_sweet(&bearer(&headers), &sweet).await?)
}

async fn update_sweet(
    State(shop): Shop,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(update): Json<SweetUpdate>,
) -> Reply {
    envelope(
        &shop
            .update_sweet(&bearer(&headers), SweetId::new(id), &update)
            .await?,
    )
}

async fn set_quantity(
    State(shop): Shop,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(body): Json<QuantityBody>,
) -> Reply {
    envelope(
        &shop
            .set_quantity(&bearer(&headers), SweetId::new(id), body.quantity)
            .await?,
    )
}

async fn delete_sweet(
    State(shop): Shop,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<StatusCode, Failure> {
    shop.delete_sweet(&bearer(&headers), SweetId::new(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn restock(
    State(shop): Shop,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(body): Json<QuantityBody>,
) -> Reply {
    envelope(
        &shop
            .restock(&bearer(&headers), SweetId::new(id), body.quantity)
            .await?,
    )
}

async fn create_order(
    State(shop): Shop,
    headers: HeaderMap,
    Json(request): Json<OrderRequest>,
) -> Reply {
    envelope(&shop.create_payment_order(&bearer(&headers), &request).await?)
}

async fn verify_payment(
    State(shop): Shop,
    headers: HeaderMap,
    Json(proof): Json<PaymentProof>,
) -> Reply {
    envelope(&shop.verify_payment(&bearer(&headers), &proof).await?)
}
