mod qris;
mod sim;

pub use qris::*;
pub use sim::*;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::Result;

type HmacSha256 = Hmac<Sha256>;

/// A scannable payment code issued by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeCreated {
    /// Gateway-side reference for status checks and cancellation
    pub gateway_ref: String,
    /// The scannable code payload (QR string) shown to the buyer
    pub code_payload: String,
    /// Amount the gateway will actually collect
    pub total_amount: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayStatus {
    Paid,
    Unpaid,
}

/// External payment gateway, narrowed to the three calls the core needs.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_code(&self, amount: i64, duration_minutes: i64) -> Result<CodeCreated>;
    async fn check_status(&self, gateway_ref: &str) -> Result<GatewayStatus>;
    async fn cancel(&self, gateway_ref: &str) -> Result<()>;
}

/// Verify an HMAC-SHA256 webhook signature (hex-encoded) over the raw body.
pub fn verify_webhook_signature(secret: &str, payload: &[u8], signature: &str) -> bool {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    let expected = hex::encode(mac.finalize().into_bytes());
    expected.as_bytes().ct_eq(signature.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webhook_signature_round_trip() {
        let secret = "test-secret";
        let payload = br#"{"external_id":"abc","status":"PAID"}"#;
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(payload);
        let sig = hex::encode(mac.finalize().into_bytes());

        assert!(verify_webhook_signature(secret, payload, &sig));
        assert!(!verify_webhook_signature(secret, payload, "deadbeef"));
        assert!(!verify_webhook_signature("other-secret", payload, &sig));
    }
}
