//! Payment gateway orders, proofs, and purchase receipts.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::{PurchaseId, SweetId, UserId};
use super::price::{CurrencyCode, Price};

/// An order created at the payment gateway, ready to be paid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentOrder {
    /// Gateway order identifier.
    pub id: String,
    /// Amount in minor units (paise).
    pub amount: i64,
    pub currency: CurrencyCode,
    pub receipt: String,
}

impl PaymentOrder {
    /// The order amount as a price.
    #[must_use]
    pub fn price(&self) -> Price {
        Price::from_minor_units(self.amount, self.currency)
    }
}

/// The opaque triple the payment widget hands back on success.
///
/// The client never interprets it; it is forwarded to the backend, which
/// checks the signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentProof {
    #[serde(rename = "razorpay_order_id")]
    pub order_id: String,
    #[serde(rename = "razorpay_payment_id")]
    pub payment_id: String,
    #[serde(rename = "razorpay_signature")]
    pub signature: String,
}

/// A completed, verified purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseReceipt {
    pub id: PurchaseId,
    pub user_id: UserId,
    pub sweet_id: SweetId,
    pub quantity: u32,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_price: Decimal,
    pub purchase_date: DateTime<Utc>,
    /// Gateway order this purchase was paid through.
    pub order_id: String,
}
