//! Checkout handshake state machine.
//!
//! ```text
//! Idle ──OrderGranted──▶ OrderCreated ──WidgetOpened──▶ AwaitingWidget
//!   │                                                     │
//!   └─OrderRefused─▶ Failed ◀─Cancelled / PaymentFailed───┤
//!                      ▲                                  │ PaymentSucceeded
//!                      └──VerificationRefused── Verifying ◀┘
//!                                                 │ Verified
//!                                                 ▼
//!                                             Completed
//! ```

use sweetshop_core::{PaymentOrder, PaymentProof, PurchaseReceipt};
use thiserror::Error;

/// Where a checkout stands.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CheckoutState {
    #[default]
    Idle,
    OrderCreated {
        order: PaymentOrder,
    },
    AwaitingWidget {
        order: PaymentOrder,
    },
    Verifying {
        order: PaymentOrder,
        proof: PaymentProof,
    },
    Completed {
        receipt: PurchaseReceipt,
    },
    Failed {
        failure: CheckoutFailure,
    },
}

/// Why a checkout ended without a purchase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutFailure {
    OrderRefused(String),
    Cancelled,
    PaymentFailed(String),
    /// The widget returned a proof for a different order.
    OrderMismatch,
    VerificationRefused(String),
}

/// Something that happened during checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutEvent {
    OrderGranted(PaymentOrder),
    OrderRefused(String),
    WidgetOpened,
    PaymentSucceeded(PaymentProof),
    PaymentCancelled,
    PaymentFailed(String),
    Verified(PurchaseReceipt),
    VerificationRefused(String),
}

/// An event that makes no sense in the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot apply {event} while {state}")]
pub struct InvalidTransition {
    pub state: &'static str,
    pub event: &'static str,
}

impl CheckoutState {
    /// Short name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::OrderCreated { .. } => "order_created",
            Self::AwaitingWidget { .. } => "awaiting_widget",
            Self::Verifying { .. } => "verifying",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
        }
    }

    /// Whether no further events are accepted.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }

    /// The state after `event`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] if `event` cannot happen in this state.
    pub fn next(&self, event: CheckoutEvent) -> Result<Self, InvalidTransition> {
        let next = match (self, event) {
            (Self::Idle, CheckoutEvent::OrderGranted(order)) => Self::OrderCreated { order },
            (Self::Idle, CheckoutEvent::OrderRefused(reason)) => Self::Failed {
                failure: CheckoutFailure::OrderRefused(reason),
            },
            (Self::OrderCreated { order }, CheckoutEvent::WidgetOpened) => Self::AwaitingWidget {
                order: order.clone(),
            },
            (Self::AwaitingWidget { order }, CheckoutEvent::PaymentSucceeded(proof)) => {
                if proof.order_id == order.id {
                    Self::Verifying {
                        order: order.clone(),
                        proof,
                    }
                } else {
                    Self::Failed {
                        failure: CheckoutFailure::OrderMismatch,
                    }
                }
            }
            (Self::AwaitingWidget { .. }, CheckoutEvent::PaymentCancelled) => Self::Failed {
                failure: CheckoutFailure::Cancelled,
            },
            (Self::AwaitingWidget { .. }, CheckoutEvent::PaymentFailed(description)) => {
                Self::Failed {
                    failure: CheckoutFailure::PaymentFailed(description),
                }
            }
            (Self::Verifying { .. }, CheckoutEvent::Verified(receipt)) => {
                Self::Completed { receipt }
            }
            (Self::Verifying { .. }, CheckoutEvent::VerificationRefused(reason)) => Self::Failed {
                failure: CheckoutFailure::VerificationRefused(reason),
            },
            (state, event) => {
                return Err(InvalidTransition {
                    state: state.name(),
                    event: event.name(),
                });
            }
        };
        Ok(next)
    }
}

impl CheckoutEvent {
    /// Short name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::OrderGranted(_) => "order_granted",
            Self::OrderRefused(_) => "order_refused",
            Self::WidgetOpened => "widget_opened",
            Self::PaymentSucceeded(_) => "payment_succeeded",
            Self::PaymentCancelled => "payment_cancelled",
            Self::PaymentFailed(_) => "payment_failed",
            Self::Verified(_) => "verified",
            Self::VerificationRefused(_) => "verification_refused",
        }
    }
}
