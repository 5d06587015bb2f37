//! HMAC-SHA256 request signing.
//!
//! The signature covers the exact bytes of the request body and is sent as
//! lowercase hex in the `X-Webhook-Signature` header.
//!
//! # Verification (receiver side)
//!
//! ```rust,ignore
//! use shopbell::webhooks::signature::verify;
//!
//! let valid = verify(secret, &raw_body, headers["X-Webhook-Signature"]);
//! ```

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the body signature.
pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

/// Signs `body` with `secret`, returning the lowercase hex HMAC-SHA256.
#[must_use]
#[allow(clippy::expect_used)]
pub fn sign(secret: &str, body: &[u8]) -> String {
    // HMAC-SHA256 accepts keys of any length, new_from_slice cannot fail
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC-SHA256 accepts any key size");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies a hex signature against `body` in constant time.
///
/// Returns `false` for signatures that are not valid hex.
#[must_use]
#[allow(clippy::expect_used)]
pub fn verify(secret: &str, body: &[u8], signature_hex: &str) -> bool {
    let Ok(expected) = hex::decode(signature_hex.trim()) else {
        return false;
    };

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC-SHA256 accepts any key size");
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_sign_known_vector() {
        // RFC 4231 test case 2
        let signature = sign("Jefe", b"what do ya want for nothing?");
        assert_eq!(
            signature,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_sign_is_lowercase_hex_without_prefix() {
        let signature = sign("secret", br#"{"event":"quote.approved"}"#);
        assert_eq!(signature.len(), 64);
        assert!(signature.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
        assert!(!signature.starts_with("sha256="));
    }

    #[test]
    fn test_verify_rejects_tampering() {
        let body = br#"{"event":"invoice.paid"}"#;
        let signature = sign("secret", body);

        assert!(verify("secret", body, &signature));
        assert!(!verify("other", body, &signature));
        assert!(!verify("secret", br#"{"event":"invoice.void"}"#, &signature));
        assert!(!verify("secret", body, "not-hex"));
        assert!(!verify("secret", body, ""));
    }

    #[test]
    fn test_empty_secret_still_signs() {
        assert_eq!(sign("", b"body").len(), 64);
    }

    proptest! {
        #[test]
        fn prop_sign_then_verify(
            secret in ".{0,64}",
            body in proptest::collection::vec(any::<u8>(), 0..512),
        ) {
            let signature = sign(&secret, &body);
            prop_assert!(verify(&secret, &body, &signature));
        }

        #[test]
        fn prop_sign_is_deterministic(secret in "[a-z0-9]{1,32}", body in ".{0,256}") {
            prop_assert_eq!(sign(&secret, body.as_bytes()), sign(&secret, body.as_bytes()));
        }
    }
}
