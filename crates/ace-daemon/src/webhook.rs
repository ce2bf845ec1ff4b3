//! HMAC-SHA256 signature check for `/webhook/github` (§6), matching
//! GitHub's `X-Hub-Signature-256: sha256=<hex>` convention.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// `true` if `signature_header` (the raw `X-Hub-Signature-256` value) is a
/// valid HMAC-SHA256 of `body` under `secret`. Accepts either the bare hex
/// digest or the `sha256=` prefixed form GitHub actually sends.
pub fn verify_signature(secret: &str, body: &[u8], signature_header: &str) -> bool {
    let digest_hex = signature_header.strip_prefix("sha256=").unwrap_or(signature_header);
    let Ok(expected) = hex::decode(digest_hex) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn accepts_valid_signature() {
        let body = br#"{"action":"opened"}"#;
        let sig = sign("shh", body);
        assert!(verify_signature("shh", body, &sig));
    }

    #[test]
    fn rejects_wrong_secret() {
        let body = br#"{"action":"opened"}"#;
        let sig = sign("shh", body);
        assert!(!verify_signature("different", body, &sig));
    }

    #[test]
    fn rejects_tampered_body() {
        let body = br#"{"action":"opened"}"#;
        let sig = sign("shh", body);
        assert!(!verify_signature("shh", br#"{"action":"closed"}"#, &sig));
    }

    #[test]
    fn rejects_malformed_header() {
        assert!(!verify_signature("shh", b"body", "not-hex"));
    }
}
