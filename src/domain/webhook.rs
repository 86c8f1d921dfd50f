//! Outbound webhook payload shape and HMAC-SHA256 signing (spec §6 Webhook
//! payload).
//!
//! Signing is grounded on the teacher's RustCrypto-family dependencies
//! (`argon2`, `blake2` in its own manifest establish the idiom of reaching
//! into that crate family for primitives); `hmac`/`sha2` are its canonical
//! HMAC-SHA256 pair, hex-encoded via the teacher's existing `data-encoding`
//! dependency.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use super::instance::InstanceId;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    pub event: String,
    pub instance_id: InstanceId,
    pub status: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

/// Computes `X-Signature: sha256=<hex>` for a signed webhook body. Returns
/// `None` when no secret is configured — per spec §9, webhooks are sent
/// unsigned rather than refusing startup when `WEBHOOK_SECRET` is unset.
pub fn sign(secret: Option<&str>, body: &[u8]) -> Option<String> {
    let secret = secret?;
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(body);
    let digest = mac.finalize().into_bytes();
    Some(format!(
        "sha256={}",
        data_encoding::HEXLOWER.encode(&digest)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_secret_yields_no_signature() {
        assert!(sign(None, b"body").is_none());
    }

    #[test]
    fn signature_is_deterministic_and_hex() {
        let a = sign(Some("shh"), b"body").unwrap();
        let b = sign(Some("shh"), b"body").unwrap();
        assert_eq!(a, b);
        assert!(a.starts_with("sha256="));
        assert_eq!(a.len(), "sha256=".len() + 64);
    }

    #[test]
    fn different_bodies_yield_different_signatures() {
        let a = sign(Some("shh"), b"body-a").unwrap();
        let b = sign(Some("shh"), b"body-b").unwrap();
        assert_ne!(a, b);
    }
}
