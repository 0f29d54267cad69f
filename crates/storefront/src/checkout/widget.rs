//! The external payment widget.
//!
//! The widget is an opaque overlay: it is opened with an order and the
//! buyer's details and eventually reports success (with a signed proof),
//! cancellation, or failure.

use std::sync::Mutex;
use std::sync::PoisonError;

use async_trait::async_trait;
use secrecy::SecretString;
use sweetshop_core::{PaymentOrder, PaymentProof, UserProfile};
use tracing::debug;

use super::signature::{random_token, sign_payment};

pub const DEFAULT_MERCHANT_NAME: &str = "Sweet Shop";
pub const DEFAULT_ORDER_DESCRIPTION: &str = "Your Delicious Order";

/// Merchant-side widget configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetSettings {
    /// Public key id identifying the merchant to the gateway.
    pub key_id: String,
    pub merchant_name: String,
    pub description: String,
}

impl WidgetSettings {
    #[must_use]
    pub fn new(key_id: impl Into<String>) -> Self {
        Self {
            key_id: key_id.into(),
            merchant_name: DEFAULT_MERCHANT_NAME.to_string(),
            description: DEFAULT_ORDER_DESCRIPTION.to_string(),
        }
    }
}

/// Buyer details shown pre-filled in the widget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuyerPrefill {
    pub name: String,
    pub email: String,
}

impl From<&UserProfile> for BuyerPrefill {
    fn from(user: &UserProfile) -> Self {
        Self {
            name: user.username.clone(),
            email: user.email.to_string(),
        }
    }
}

/// Everything the widget is opened with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetRequest {
    pub settings: WidgetSettings,
    pub order: PaymentOrder,
    pub prefill: BuyerPrefill,
}

/// How the widget closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WidgetOutcome {
    /// The buyer paid; the proof goes to the backend for verification.
    Paid(PaymentProof),
    /// The buyer dismissed the widget.
    Cancelled,
    /// The gateway declined the payment.
    Failed { description: String },
}

/// Opens the payment overlay and waits for it to close.
#[async_trait]
pub trait PaymentWidget: Send + Sync {
    async fn open(&self, request: &WidgetRequest) -> WidgetOutcome;
}

/// What a [`SimulatedWidget`] does when opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulatedPayment {
    Approve,
    Cancel,
    Decline(String),
}

/// Widget that settles payments locally, signing approvals with the
/// gateway secret the in-memory backend verifies against.
pub struct SimulatedWidget {
    secret: SecretString,
    behaviour: SimulatedPayment,
    requests: Mutex<Vec<WidgetRequest>>,
}

impl SimulatedWidget {
    #[must_use]
    pub fn new(secret: SecretString, behaviour: SimulatedPayment) -> Self {
        Self {
            secret,
            behaviour,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Requests the widget has been opened with.
    #[must_use]
    pub fn requests(&self) -> Vec<WidgetRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl PaymentWidget for SimulatedWidget {
    async fn open(&self, request: &WidgetRequest) -> WidgetOutcome {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        debug!(order_id = %request.order.id, behaviour = ?self.behaviour, "Simulated widget opened");

        match &self.behaviour {
            SimulatedPayment::Approve => {
                let payment_id = format!("pay_{}", random_token(14));
                match sign_payment(&self.secret, &request.order.id, &payment_id) {
                    Some(signature) => WidgetOutcome::Paid(PaymentProof {
                        order_id: request.order.id.clone(),
                        payment_id,
                        signature,
                    }),
                    None => WidgetOutcome::Failed {
                        description: "Could not sign payment".to_string(),
                    },
                }
            }
            SimulatedPayment::Cancel => WidgetOutcome::Cancelled,
            SimulatedPayment::Decline(description) => WidgetOutcome::Failed {
                description: description.clone(),
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use sweetshop_core::CurrencyCode;

    use super::*;
    use crate::checkout::signature::verify_signature;

    fn request() -> WidgetRequest {
        WidgetRequest {
            settings: WidgetSettings::new("rzp_test_key"),
            order: PaymentOrder {
                id: "order_abc".to_string(),
                amount: 5198,
                currency: CurrencyCode::INR,
                receipt: "receipt_1".to_string(),
            },
            prefill: BuyerPrefill {
                name: "Demo User".to_string(),
                email: "demo@example.com".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_simulated_approval_is_verifiable() {
        let secret = SecretString::from("test-signing-secret");
        let widget = SimulatedWidget::new(secret.clone(), SimulatedPayment::Approve);

        let WidgetOutcome::Paid(proof) = widget.open(&request()).await else {
            panic!("expected payment");
        };
        assert_eq!(proof.order_id, "order_abc");
        assert!(proof.payment_id.starts_with("pay_"));
        assert!(verify_signature(&secret, &proof));
        assert_eq!(widget.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_simulated_decline() {
        let widget = SimulatedWidget::new(
            SecretString::from("test-signing-secret"),
            SimulatedPayment::Decline("Card declined".to_string()),
        );
        assert_eq!(
            widget.open(&request()).await,
            WidgetOutcome::Failed {
                description: "Card declined".to_string()
            }
        );
    }

    #[test]
    fn test_settings_defaults() {
        let settings = WidgetSettings::new("rzp_test_key");
        assert_eq!(settings.merchant_name, "Sweet Shop");
        assert_eq!(settings.description, "Your Delicious Order");
    }
}
