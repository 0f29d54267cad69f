//! Payment widget for the terminal.
//!
//! Shows the order, then waits for the buyer to complete the payment with
//! the gateway and paste back the payment id and signature it issued.

use async_trait::async_trait;
use sweetshop_core::PaymentProof;
use sweetshop_storefront::checkout::{PaymentWidget, WidgetOutcome, WidgetRequest};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

/// Reads the gateway's reply from stdin. An empty line cancels.
pub struct ConsoleWidget;

#[async_trait]
impl PaymentWidget for ConsoleWidget {
    async fn open(&self, request: &WidgetRequest) -> WidgetOutcome {
        info!(
            "{} - {} ({})",
            request.settings.merchant_name,
            request.settings.description,
            request.order.price()
        );
        info!(
            "Pay order {} with key {} as {} <{}>",
            request.order.id,
            request.settings.key_id,
            request.prefill.name,
            request.prefill.email
        );

        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        info!("Payment id (empty to cancel):");
        let Some(payment_id) = next_answer(&mut lines).await else {
            return WidgetOutcome::Cancelled;
        };
        info!("Signature (empty to cancel):");
        let Some(signature) = next_answer(&mut lines).await else {
            return WidgetOutcome::Cancelled;
        };

        WidgetOutcome::Paid(PaymentProof {
            order_id: request.order.id.clone(),
            payment_id,
            signature,
        })
    }
}

async fn next_answer<R>(lines: &mut tokio::io::Lines<R>) -> Option<String>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    match lines.next_line().await {
        Ok(Some(line)) => {
            let answer = line.trim();
            (!answer.is_empty()).then(|| answer.to_string())
        }
        Ok(None) => None,
        Err(e) => {
            warn!(error = %e, "Could not read from stdin");
            None
        }
    }
}
