//! Payment signature scheme.
//!
//! The gateway signs `order_id|payment_id` with HMAC-SHA256 under the
//! merchant's secret and hands the hex digest to the widget. The backend
//! recomputes it to verify a payment before finalizing the purchase.

use hmac::{Hmac, Mac};
use rand::Rng;
use rand::distr::Alphanumeric;
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use sweetshop_core::PaymentProof;

type HmacSha256 = Hmac<Sha256>;

const GENERATED_SECRET_LENGTH: usize = 32;

/// Hex HMAC-SHA256 of `order_id|payment_id`.
///
/// Returns `None` only if the secret cannot key the MAC.
#[must_use]
pub fn sign_payment(secret: &SecretString, order_id: &str, payment_id: &str) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes()).ok()?;
    mac.update(format!("{order_id}|{payment_id}").as_bytes());
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Check a proof's signature in constant time.
#[must_use]
pub fn verify_signature(secret: &SecretString, proof: &PaymentProof) -> bool {
    let Ok(provided) = hex::decode(&proof.signature) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.expose_secret().as_bytes()) else {
        return false;
    };
    mac.update(format!("{}|{}", proof.order_id, proof.payment_id).as_bytes());
    mac.verify_slice(&provided).is_ok()
}

/// A random alphanumeric signing secret for offline sessions.
#[must_use]
pub fn generate_secret() -> SecretString {
    SecretString::from(random_token(GENERATED_SECRET_LENGTH))
}

/// Random alphanumeric string, used for gateway-style identifiers.
pub(crate) fn random_token(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn proof(order_id: &str, payment_id: &str, signature: String) -> PaymentProof {
        PaymentProof {
            order_id: order_id.to_string(),
            payment_id: payment_id.to_string(),
            signature,
        }
    }

    #[test]
    fn test_signature_verifies() {
        let secret = SecretString::from("test-signing-secret");
        let signature = sign_payment(&secret, "order_1", "pay_1").unwrap();
        assert_eq!(signature.len(), 64);
        assert!(verify_signature(&secret, &proof("order_1", "pay_1", signature)));
    }

    #[test]
    fn test_signature_bound_to_ids() {
        let secret = SecretString::from("test-signing-secret");
        let signature = sign_payment(&secret, "order_1", "pay_1").unwrap();
        assert!(!verify_signature(
            &secret,
            &proof("order_1", "pay_2", signature.clone())
        ));
        assert!(!verify_signature(
            &SecretString::from("other-secret"),
            &proof("order_1", "pay_1", signature)
        ));
    }

    #[test]
    fn test_signature_rejects_non_hex() {
        let secret = SecretString::from("test-signing-secret");
        assert!(!verify_signature(
            &secret,
            &proof("order_1", "pay_1", "not-hex".to_string())
        ));
    }

    #[test]
    fn test_random_token() {
        let token = random_token(14);
        assert_eq!(token.len(), 14);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(generate_secret().expose_secret().len(), GENERATED_SECRET_LENGTH);
    }
}
