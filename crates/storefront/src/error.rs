//! Unified error handling with Sentry integration.
//!
//! Every storefront operation returns `Result<T, AppError>`. Each variant
//! has a shopper-facing message via [`AppError::user_message`]; transport,
//! server, and storage failures are also captured to Sentry.

use sweetshop_core::ValidationErrors;
use thiserror::Error;

use crate::api::ApiError;
use crate::cart::CartError;
use crate::checkout::CheckoutError;
use crate::config::ConfigError;
use crate::persist::StoreError;

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// One or more form fields are invalid.
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    /// Not signed in, bad credentials, or the session was rejected.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Signed in but not allowed.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Conflicts with existing state, optionally tied to a form field.
    #[error("Conflict: {message}")]
    Conflict {
        field: Option<String>,
        message: String,
    },

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The server refused the request.
    #[error("Rejected: {0}")]
    Rejected(String),

    /// Cart rule violated.
    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    /// Payment handshake failed.
    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    /// A monetary amount is too large to compute.
    #[error("Amount out of range: {0}")]
    OutOfRange(String),

    /// Rate limited.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Network or server failure.
    #[error("API error: {0}")]
    Api(ApiError),

    /// Local state could not be read or written.
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    /// Configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl From<ApiError> for AppError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Unauthorized(message) => Self::Authentication(message),
            ApiError::Forbidden(message) => Self::Forbidden(message),
            ApiError::NotFound(message) => Self::NotFound(message),
            ApiError::Conflict(message) => Self::Conflict {
                field: None,
                message,
            },
            ApiError::Rejected(message) => Self::Rejected(message),
            ApiError::RateLimited(secs) => Self::RateLimited(secs),
            other => Self::Api(other),
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}

impl AppError {
    /// Whether this is our fault (or the network's) rather than the shopper's.
    #[must_use]
    pub fn is_server_class(&self) -> bool {
        match self {
            Self::Api(_) | Self::Storage(_) => true,
            Self::Checkout(err) => err.api_error().is_some_and(ApiError::is_server_class),
            _ => false,
        }
    }

    /// Whether the session was rejected and torn down.
    #[must_use]
    pub fn is_authentication(&self) -> bool {
        match self {
            Self::Authentication(_) | Self::Checkout(CheckoutError::NotAuthenticated) => true,
            Self::Checkout(err) => err.api_error().is_some_and(ApiError::is_unauthorized),
            _ => false,
        }
    }

    /// Message for the shopper.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(errors) => errors.to_string(),
            Self::Authentication(message)
            | Self::NotFound(message)
            | Self::Rejected(message)
            | Self::OutOfRange(message) => message.clone(),
            Self::Forbidden(_) => "Access denied. Administrator privileges required.".to_string(),
            Self::Conflict { message, .. } => message.clone(),
            Self::Cart(err) => err.to_string(),
            Self::Checkout(err) => err.user_message(),
            Self::RateLimited(secs) => {
                format!("Too many requests. Please try again in {secs} seconds.")
            }
            Self::Api(_) => "Could not reach the shop. Please try again.".to_string(),
            Self::Storage(_) => "Could not save your cart or session on this device.".to_string(),
            Self::Config(err) => err.to_string(),
        }
    }

    /// Capture server-class errors to Sentry. Returns `self` for chaining.
    #[must_use]
    pub fn report(self) -> Self {
        if self.is_server_class() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Storefront error"
            );
        }
        self
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of user actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Added item", Some(&[("sweet_id", "3")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}
