//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required (online mode)
//! - `SWEETSHOP_API_URL` - Base URL of the inventory API (e.g., `http://localhost:8000/api/`)
//!
//! ## Optional
//! - `SWEETSHOP_STATE_DIR` - Directory for the persisted cart and session (default: .sweetshop)
//! - `SWEETSHOP_PAYMENT_KEY_ID` - Public key id handed to the payment widget (default: `rzp_test_sweetshop`)
//! - `SWEETSHOP_PAYMENT_SECRET` - Payment signing secret, used only by the offline backend
//! - `SWEETSHOP_CACHE_TTL_SECS` - Catalog cache time-to-live (default: 300)
//! - `SWEETSHOP_HTTP_TIMEOUT_SECS` - Per-request timeout for API calls (default: 15)
//! - `SENTRY_DSN` - Sentry error tracking DSN

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

const DEFAULT_STATE_DIR: &str = ".sweetshop";
const DEFAULT_PAYMENT_KEY_ID: &str = "rzp_test_sweetshop";
const MIN_PAYMENT_SECRET_LENGTH: usize = 16;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Storefront client configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// Base URL of the inventory API. Only needed when talking to a real server.
    pub api_url: Option<Url>,
    /// Directory holding `cart-storage.json` and `auth-storage.json`
    pub state_dir: PathBuf,
    /// Payment widget configuration
    pub payment: PaymentConfig,
    /// Catalog cache time-to-live
    pub cache_ttl: Duration,
    /// Per-request timeout for API calls
    pub http_timeout: Duration,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
}

/// Payment gateway configuration.
///
/// Implements `Debug` manually to redact the signing secret.
#[derive(Clone)]
pub struct PaymentConfig {
    /// Public key id shown to the payment widget
    pub key_id: String,
    /// Signing secret shared with the gateway. Never sent to the API.
    pub secret: Option<SecretString>,
}

impl std::fmt::Debug for PaymentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentConfig")
            .field("key_id", &self.key_id)
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but invalid, or if the
    /// payment secret fails validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let api_url = get_optional_env("SWEETSHOP_API_URL")
            .map(|raw| parse_base_url("SWEETSHOP_API_URL", &raw))
            .transpose()?;
        let state_dir = PathBuf::from(get_env_or_default("SWEETSHOP_STATE_DIR", DEFAULT_STATE_DIR));
        let cache_ttl = get_duration_secs("SWEETSHOP_CACHE_TTL_SECS", 300)?;
        let http_timeout = get_duration_secs("SWEETSHOP_HTTP_TIMEOUT_SECS", 15)?;

        let payment = PaymentConfig::from_env()?;
        let sentry_dsn = get_optional_env("SENTRY_DSN");

        Ok(Self {
            api_url,
            state_dir,
            payment,
            cache_ttl,
            http_timeout,
            sentry_dsn,
        })
    }

    /// The API base URL, required when running against a real server.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if `SWEETSHOP_API_URL` is unset.
    pub fn require_api_url(&self) -> Result<&Url, ConfigError> {
        self.api_url
            .as_ref()
            .ok_or_else(|| ConfigError::MissingEnvVar("SWEETSHOP_API_URL".to_string()))
    }
}

impl Default for StorefrontConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
            payment: PaymentConfig {
                key_id: DEFAULT_PAYMENT_KEY_ID.to_string(),
                secret: None,
            },
            cache_ttl: Duration::from_secs(300),
            http_timeout: Duration::from_secs(15),
            sentry_dsn: None,
        }
    }
}

impl PaymentConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let secret = match get_optional_env("SWEETSHOP_PAYMENT_SECRET") {
            Some(value) => Some(validate_payment_secret(value, "SWEETSHOP_PAYMENT_SECRET")?),
            None => None,
        };
        Ok(Self {
            key_id: get_env_or_default("SWEETSHOP_PAYMENT_KEY_ID", DEFAULT_PAYMENT_KEY_ID),
            secret,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

/// Get a whole number of seconds with a default.
fn get_duration_secs(key: &str, default: u64) -> Result<Duration, ConfigError> {
    get_optional_env(key).map_or(Ok(Duration::from_secs(default)), |raw| {
        raw.trim()
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    })
}

/// Parse the API base URL, forcing a trailing slash so relative joins keep
/// the path prefix (`/api/` + `sweets` = `/api/sweets`).
fn parse_base_url(key: &str, raw: &str) -> Result<Url, ConfigError> {
    let mut normalized = raw.trim().to_string();
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    let url = Url::parse(&normalized)
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }
    Ok(url)
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Check length and strength, then wrap the value as a secret.
fn validate_payment_secret(value: String, var_name: &str) -> Result<SecretString, ConfigError> {
    if value.len() < MIN_PAYMENT_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_PAYMENT_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    validate_secret_strength(&value, var_name)?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_two_chars() {
        // "ab" has entropy of 1 bit per char (50% a, 50% b)
        let entropy = shannon_entropy("ab");
        assert!((entropy - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let result = validate_secret_strength("your-payment-key", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaa", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_payment_secret() {
        assert!(validate_payment_secret("aB3$xY9!".to_string(), "TEST_VAR").is_err());
        assert!(validate_payment_secret("aB3$xY9!mK2@nL5#pQ7&".to_string(), "TEST_VAR").is_ok());
    }

    #[test]
    fn test_parse_base_url_adds_trailing_slash() {
        let url = parse_base_url("TEST_URL", "http://localhost:8000/api").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/api/");
        assert_eq!(url.join("sweets").unwrap().path(), "/api/sweets");
    }

    #[test]
    fn test_parse_base_url_rejects_other_schemes() {
        assert!(parse_base_url("TEST_URL", "ftp://example.com").is_err());
        assert!(parse_base_url("TEST_URL", "not a url").is_err());
    }

    #[test]
    fn test_require_api_url() {
        let config = StorefrontConfig::default();
        assert!(matches!(
            config.require_api_url(),
            Err(ConfigError::MissingEnvVar(_))
        ));
    }

    #[test]
    fn test_payment_config_debug_redacts_secret() {
        let config = PaymentConfig {
            key_id: "rzp_test_public".to_string(),
            secret: Some(SecretString::from("super_secret_signing_key")),
        };

        let debug_output = format!("{config:?}");

        assert!(debug_output.contains("rzp_test_public"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_signing_key"));
    }
}
