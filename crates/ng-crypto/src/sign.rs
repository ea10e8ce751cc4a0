//! HMAC-SHA256 signatures: request authentication and the Lark outbound form.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Hex-encoded HMAC-SHA256 of `payload` under `key`.
pub fn sign_payload(key: &[u8], payload: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a hex-encoded signature in constant time.
///
/// Malformed hex or a length mismatch verifies as false rather than erroring;
/// callers treat every non-match identically.
pub fn verify_payload(key: &[u8], payload: &[u8], signature_hex: &str) -> bool {
    let Ok(provided) = hex::decode(signature_hex) else {
        return false;
    };
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(payload);
    let expected = mac.finalize().into_bytes();
    provided.ct_eq(expected.as_slice()).into()
}

/// Lark custom-bot signature.
///
/// Lark's contract: the HMAC key is `"{timestamp}\n{secret}"`, the message is
/// the empty byte string, and the result is standard base64. `timestamp` is
/// Unix epoch seconds in decimal.
pub fn lark_sign(timestamp_secs: i64, secret: &str) -> String {
    let key = format!("{}\n{}", timestamp_secs, secret);
    let mac = HmacSha256::new_from_slice(key.as_bytes()).expect("HMAC accepts any key length");
    BASE64.encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_round_trips() {
        let key = b"test-secret";
        let payload = b"1700000000000/notifications/send";
        let sig = sign_payload(key, payload);
        assert_eq!(sig.len(), 64, "hex SHA-256 MAC is 64 chars");
        assert!(verify_payload(key, payload, &sig));
    }

    #[test]
    fn single_byte_mutations_fail_verification() {
        let key = b"test-secret";
        let payload = b"hello world";
        let sig = sign_payload(key, payload);

        assert!(!verify_payload(key, b"hello worle", &sig));
        assert!(!verify_payload(b"test-secres", payload, &sig));

        let mut flipped = sig.clone().into_bytes();
        flipped[0] = if flipped[0] == b'0' { b'1' } else { b'0' };
        assert!(!verify_payload(key, payload, &String::from_utf8(flipped).unwrap()));
    }

    #[test]
    fn malformed_hex_verifies_false() {
        assert!(!verify_payload(b"k", b"p", "not-hex!"));
        assert!(!verify_payload(b"k", b"p", "abcd"));
        assert!(!verify_payload(b"k", b"p", ""));
    }

    #[test]
    fn lark_sign_is_reproducible_and_timestamp_sensitive() {
        let a = lark_sign(1_700_000_000, "s3cret");
        let b = lark_sign(1_700_000_000, "s3cret");
        let c = lark_sign(1_700_000_001, "s3cret");
        assert_eq!(a, b);
        assert_ne!(a, c);
        // base64 of a 32-byte MAC is 44 chars with padding.
        assert_eq!(a.len(), 44);
    }

    #[test]
    fn lark_sign_known_vectors() {
        // base64(HMAC-SHA256(key = "{ts}\n{secret}", msg = "")) precomputed
        // with an independent implementation. These pin the key/message
        // orientation: signing the key string under an empty key yields a
        // different MAC, so swapped arguments fail here.
        assert_eq!(
            lark_sign(1_609_459_200, "test"),
            "yreA7UW51pmZGu9/leOmOn78u0ghM3yizNl38CbnAmE="
        );
        assert_eq!(
            lark_sign(1_700_000_000, "s3cret-key"),
            "gSJgU/nkjK/FoguAeEY4C9QqArxj04acEZeIWKXg3sA="
        );
    }
}
