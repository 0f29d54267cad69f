//! The three-step payment handshake.
//!
//! 1. Ask the backend for a payment order covering the cart line.
//! 2. Open the payment widget, pre-filled with the buyer's details.
//! 3. Send the widget's proof back to the backend, which verifies it and
//!    finalizes the purchase.
//!
//! Each step advances a [`CheckoutState`]. A failure at any step ends the
//! checkout with a distinct [`CheckoutError`]; nothing is retried.

mod machine;
pub mod signature;
mod widget;

pub use machine::{CheckoutEvent, CheckoutFailure, CheckoutState, InvalidTransition};
pub use widget::{
    BuyerPrefill, PaymentWidget, SimulatedPayment, SimulatedWidget, WidgetOutcome,
    WidgetRequest, WidgetSettings,
};

use sweetshop_core::{Price, PurchaseReceipt, SweetId};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::api::{ApiError, OrderRequest, ShopBackend};
use crate::cart::CartLine;
use crate::session::Session;

/// Errors that end a checkout.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("Please log in to proceed with the payment.")]
    NotAuthenticated,

    #[error("Item {0} is not in the cart")]
    NotInCart(SweetId),

    #[error("Order total is out of range")]
    AmountOutOfRange,

    #[error("Could not initiate payment: {0}")]
    OrderCreation(#[source] ApiError),

    #[error("Payment was cancelled")]
    Cancelled,

    #[error("Payment failed: {0}")]
    PaymentFailed(String),

    #[error("Payment does not match the order")]
    OrderMismatch,

    #[error("Payment verification failed: {0}")]
    Verification(#[source] ApiError),

    #[error("Checkout out of sequence: {0}")]
    InvalidTransition(#[from] InvalidTransition),
}

impl CheckoutError {
    /// The backend error behind this failure, if any.
    #[must_use]
    pub const fn api_error(&self) -> Option<&ApiError> {
        match self {
            Self::OrderCreation(e) | Self::Verification(e) => Some(e),
            _ => None,
        }
    }

    /// Message for the shopper.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::OrderCreation(_) => "Could not initiate payment. Please try again.".to_string(),
            Self::Cancelled => "Payment was cancelled. Your cart is unchanged.".to_string(),
            Self::Verification(_) | Self::OrderMismatch => {
                "Payment verification failed. Please contact support.".to_string()
            }
            Self::InvalidTransition(_) | Self::AmountOutOfRange => {
                "Something went wrong during checkout.".to_string()
            }
            other => other.to_string(),
        }
    }
}

/// One checkout attempt for one cart line.
#[derive(Debug)]
pub struct CheckoutFlow {
    state: CheckoutState,
    trail: Vec<&'static str>,
}

impl Default for CheckoutFlow {
    fn default() -> Self {
        Self::new()
    }
}

impl CheckoutFlow {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: CheckoutState::Idle,
            trail: vec![CheckoutState::Idle.name()],
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> &CheckoutState {
        &self.state
    }

    /// Names of every state visited, in order.
    #[must_use]
    pub fn trail(&self) -> &[&'static str] {
        &self.trail
    }

    fn advance(&mut self, event: CheckoutEvent) -> Result<(), InvalidTransition> {
        self.state = self.state.next(event)?;
        self.trail.push(self.state.name());
        Ok(())
    }

    /// Run the handshake for `line` on behalf of `session`.
    ///
    /// # Errors
    ///
    /// Returns a [`CheckoutError`] naming the step that failed. A cancelled
    /// or failed payment never reaches verification.
    #[instrument(skip_all, fields(sweet_id = %line.item.id, quantity = line.quantity))]
    pub async fn run(
        &mut self,
        backend: &dyn ShopBackend,
        widget: &dyn PaymentWidget,
        settings: &WidgetSettings,
        session: &Session,
        line: &CartLine,
    ) -> Result<PurchaseReceipt, CheckoutError> {
        let amount = line
            .subtotal()
            .and_then(Price::to_minor_units)
            .ok_or(CheckoutError::AmountOutOfRange)?;
        let request = OrderRequest {
            sweet_id: line.item.id,
            quantity: line.quantity,
            amount,
        };

        let order = match backend.create_payment_order(session.token(), &request).await {
            Ok(order) => {
                self.advance(CheckoutEvent::OrderGranted(order.clone()))?;
                order
            }
            Err(e) => {
                warn!(error = %e, "Payment order refused");
                self.advance(CheckoutEvent::OrderRefused(e.to_string()))?;
                return Err(CheckoutError::OrderCreation(e));
            }
        };

        self.advance(CheckoutEvent::WidgetOpened)?;
        let widget_request = WidgetRequest {
            settings: settings.clone(),
            order,
            prefill: BuyerPrefill::from(session.user()),
        };

        let proof = match widget.open(&widget_request).await {
            WidgetOutcome::Paid(proof) => {
                self.advance(CheckoutEvent::PaymentSucceeded(proof.clone()))?;
                if !matches!(self.state, CheckoutState::Verifying { .. }) {
                    return Err(CheckoutError::OrderMismatch);
                }
                proof
            }
            WidgetOutcome::Cancelled => {
                info!("Payment cancelled by buyer");
                self.advance(CheckoutEvent::PaymentCancelled)?;
                return Err(CheckoutError::Cancelled);
            }
            WidgetOutcome::Failed { description } => {
                warn!(%description, "Payment failed");
                self.advance(CheckoutEvent::PaymentFailed(description.clone()))?;
                return Err(CheckoutError::PaymentFailed(description));
            }
        };

        match backend.verify_payment(session.token(), &proof).await {
            Ok(receipt) => {
                self.advance(CheckoutEvent::Verified(receipt.clone()))?;
                info!(purchase_id = %receipt.id, order_id = %receipt.order_id, "Purchase completed");
                Ok(receipt)
            }
            Err(e) => {
                warn!(error = %e, "Payment verification refused");
                self.advance(CheckoutEvent::VerificationRefused(e.to_string()))?;
                Err(CheckoutError::Verification(e))
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;

    use super::*;
    use crate::api::{Credentials, InMemoryBackend, Operation};
    use crate::cart::CartStore;

    const SECRET: &str = "test-signing-secret";

    async fn setup(quantity: u32) -> (InMemoryBackend, Session, CartLine) {
        let backend = InMemoryBackend::seeded(SecretString::from(SECRET));
        let auth = backend
            .login(&Credentials {
                email: "demo@example.com".to_string(),
                password: "password".to_string(),
            })
            .await
            .unwrap();
        let session = Session::new(auth.user, SecretString::from(auth.token));

        let item = backend.sweet(SweetId::new(1)).unwrap();
        let mut cart = CartStore::new();
        cart.add_item(&item, quantity).unwrap();
        let line = cart.line(item.id).unwrap().clone();
        (backend, session, line)
    }

    fn widget(behaviour: SimulatedPayment) -> SimulatedWidget {
        SimulatedWidget::new(SecretString::from(SECRET), behaviour)
    }

    #[tokio::test]
    async fn test_completed_checkout() {
        let (backend, session, line) = setup(2).await;
        let widget = widget(SimulatedPayment::Approve);
        let mut flow = CheckoutFlow::new();

        let receipt = flow
            .run(&backend, &widget, &WidgetSettings::new("rzp_test"), &session, &line)
            .await
            .unwrap();

        assert_eq!(receipt.quantity, 2);
        assert_eq!(
            flow.trail(),
            &["idle", "order_created", "awaiting_widget", "verifying", "completed"]
        );
        let opened = widget.requests();
        assert_eq!(opened.first().unwrap().order.amount, 5198);
        assert_eq!(opened.first().unwrap().prefill.name, "Demo User");
        assert_eq!(opened.first().unwrap().prefill.email, "demo@example.com");
    }

    #[tokio::test]
    async fn test_cancelled_checkout_skips_verification() {
        let (backend, session, line) = setup(1).await;
        let mut flow = CheckoutFlow::new();

        let result = flow
            .run(
                &backend,
                &widget(SimulatedPayment::Cancel),
                &WidgetSettings::new("rzp_test"),
                &session,
                &line,
            )
            .await;

        assert!(matches!(result, Err(CheckoutError::Cancelled)));
        assert_eq!(backend.call_count(Operation::VerifyPayment), 0);
        assert_eq!(backend.sweet(SweetId::new(1)).unwrap().quantity, 15);
    }

    #[tokio::test]
    async fn test_order_refusal() {
        let (backend, session, line) = setup(1).await;
        backend.fail_next(
            Operation::CreatePaymentOrder,
            ApiError::Server {
                status: 503,
                message: "unavailable".to_string(),
            },
        );
        let widget = widget(SimulatedPayment::Approve);
        let mut flow = CheckoutFlow::new();

        let result = flow
            .run(&backend, &widget, &WidgetSettings::new("rzp_test"), &session, &line)
            .await;

        assert!(matches!(result, Err(CheckoutError::OrderCreation(_))));
        assert!(widget.requests().is_empty());
        assert!(matches!(
            flow.state(),
            CheckoutState::Failed {
                failure: CheckoutFailure::OrderRefused(_)
            }
        ));
    }

    #[tokio::test]
    async fn test_declined_payment() {
        let (backend, session, line) = setup(1).await;
        let mut flow = CheckoutFlow::new();

        let result = flow
            .run(
                &backend,
                &widget(SimulatedPayment::Decline("Card declined".to_string())),
                &WidgetSettings::new("rzp_test"),
                &session,
                &line,
            )
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.user_message(), "Payment failed: Card declined");
        assert_eq!(backend.call_count(Operation::VerifyPayment), 0);
    }

    #[tokio::test]
    async fn test_wrong_secret_fails_verification() {
        let (backend, session, line) = setup(1).await;
        let forged = SimulatedWidget::new(SecretString::from("wrong"), SimulatedPayment::Approve);
        let mut flow = CheckoutFlow::new();

        let result = flow
            .run(&backend, &forged, &WidgetSettings::new("rzp_test"), &session, &line)
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err, CheckoutError::Verification(ApiError::Rejected(_))));
        assert_eq!(
            err.user_message(),
            "Payment verification failed. Please contact support."
        );
        assert_eq!(backend.sweet(SweetId::new(1)).unwrap().quantity, 15);
    }

    #[tokio::test]
    async fn test_overflowing_total_never_reaches_backend() {
        let (backend, session, mut line) = setup(1).await;
        line.item.price = rust_decimal::Decimal::from_i128_with_scale(10_i128.pow(25), 0);
        line.quantity = 100_000;
        let widget = widget(SimulatedPayment::Approve);
        let mut flow = CheckoutFlow::new();

        let result = flow
            .run(&backend, &widget, &WidgetSettings::new("rzp_test"), &session, &line)
            .await;

        assert!(matches!(result, Err(CheckoutError::AmountOutOfRange)));
        assert_eq!(backend.call_count(Operation::CreatePaymentOrder), 0);
        assert!(widget.requests().is_empty());
    }
}
