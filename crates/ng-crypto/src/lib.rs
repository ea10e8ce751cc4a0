// ng-crypto: Signing and encryption primitives for the notification gateway.
//
// Three concerns live here:
// - HMAC-SHA256 request signatures (hex, constant-time verify)
// - AES-256-GCM encryption of channel config blobs at rest
// - The Lark outbound webhook signature (HMAC keyed by "timestamp\nsecret"
//   over an empty message, base64-encoded)

pub mod cipher;
pub mod sign;

pub use cipher::{decrypt_blob, encrypt_blob, normalize_key};
pub use sign::{lark_sign, sign_payload, verify_payload};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("ciphertext is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("ciphertext too short to contain a nonce")]
    Truncated,
    #[error("decryption failed (wrong key or tampered ciphertext)")]
    Decrypt,
    #[error("encryption failed")]
    Encrypt,
}
