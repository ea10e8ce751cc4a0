//! AES-256-GCM encryption for channel config blobs at rest.
//!
//! Wire form: `base64(nonce || ciphertext)` with a random 96-bit nonce per
//! encryption. The key is whatever the operator configured, normalized to
//! exactly 32 bytes (zero-padded or truncated).

use aes_gcm::aead::{Aead, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key, KeyInit, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::CryptoError;

const NONCE_LEN: usize = 12;

/// Normalize operator-supplied key material to exactly 32 bytes.
///
/// Shorter input is zero-padded, longer input truncated. This mirrors the
/// process-config contract: any string is accepted, the effective key is
/// always 256 bits.
pub fn normalize_key(key_material: &str) -> [u8; 32] {
    let mut key = [0u8; 32];
    let bytes = key_material.as_bytes();
    let n = bytes.len().min(32);
    key[..n].copy_from_slice(&bytes[..n]);
    key
}

/// Encrypt `plaintext` and return `base64(nonce || ciphertext)`.
pub fn encrypt_blob(key: &[u8; 32], plaintext: &[u8]) -> Result<String, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|_| CryptoError::Encrypt)?;

    let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    combined.extend_from_slice(&nonce);
    combined.extend_from_slice(&ciphertext);
    Ok(BASE64.encode(combined))
}

/// Decrypt a blob produced by [`encrypt_blob`] under the same key.
pub fn decrypt_blob(key: &[u8; 32], blob: &str) -> Result<Vec<u8>, CryptoError> {
    let combined = BASE64.decode(blob)?;
    if combined.len() < NONCE_LEN {
        return Err(CryptoError::Truncated);
    }
    let (nonce, ciphertext) = combined.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::Decrypt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_then_decrypt_returns_original_bytes() {
        let key = normalize_key("encryption-key-for-tests");
        let plaintext = br#"{"webhook_url":"https://h.example/ep"}"#;
        let blob = encrypt_blob(&key, plaintext).unwrap();
        let decrypted = decrypt_blob(&key, &blob).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn each_encryption_uses_a_fresh_nonce() {
        let key = normalize_key("k");
        let a = encrypt_blob(&key, b"same").unwrap();
        let b = encrypt_blob(&key, b"same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let blob = encrypt_blob(&normalize_key("key-one"), b"secret").unwrap();
        let err = decrypt_blob(&normalize_key("key-two"), &blob).unwrap_err();
        assert!(matches!(err, CryptoError::Decrypt));
    }

    #[test]
    fn tampered_ciphertext_fails_to_decrypt() {
        let key = normalize_key("key");
        let blob = encrypt_blob(&key, b"secret payload").unwrap();
        let mut raw = BASE64.decode(&blob).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        let tampered = BASE64.encode(raw);
        assert!(matches!(
            decrypt_blob(&key, &tampered),
            Err(CryptoError::Decrypt)
        ));
    }

    #[test]
    fn key_normalization_pads_and_truncates() {
        let short = normalize_key("abc");
        assert_eq!(&short[..3], b"abc");
        assert!(short[3..].iter().all(|&b| b == 0));

        let long_input = "x".repeat(40);
        let long = normalize_key(&long_input);
        assert_eq!(long, [b'x'; 32]);
    }

    #[test]
    fn garbage_blobs_are_rejected() {
        let key = normalize_key("key");
        assert!(matches!(
            decrypt_blob(&key, "!!not base64!!"),
            Err(CryptoError::Base64(_))
        ));
        let tiny = BASE64.encode([0u8; 4]);
        assert!(matches!(decrypt_blob(&key, &tiny), Err(CryptoError::Truncated)));
    }
}
