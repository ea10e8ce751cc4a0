//! Process configuration from environment variables.
//!
//! # Required
//! - `DATABASE_URL`
//! - `API_SECRET_KEY` — HMAC key for request signatures
//! - `ENCRYPT_KEY` — AES-GCM key material for config blobs; normalized to
//!   exactly 32 bytes (zero-padded or truncated)
//!
//! # Optional
//! - `BIND_ADDR` (default `0.0.0.0:8080`)
//! - `LOG_LEVEL` (default `info`)
//! - `GRAFANA_USERNAME` / `GRAFANA_PASSWORD` — Basic credentials for the
//!   Grafana ingress; the ingress rejects everything while unset
//! - `ALLOW_PRIVATE_WEBHOOKS` — set to `true` to permit private-IP webhook
//!   targets (test/dev only)

use std::env;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable {0} must be set")]
    Missing(&'static str),
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: String,
    pub api_secret_key: String,
    pub encrypt_key: [u8; 32],
    pub grafana_username: Option<String>,
    pub grafana_password: Option<String>,
    pub allow_private_webhooks: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url =
            env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?;
        let api_secret_key =
            env::var("API_SECRET_KEY").map_err(|_| ConfigError::Missing("API_SECRET_KEY"))?;
        let encrypt_key_material =
            env::var("ENCRYPT_KEY").map_err(|_| ConfigError::Missing("ENCRYPT_KEY"))?;

        Ok(AppConfig {
            database_url,
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_owned()),
            api_secret_key,
            encrypt_key: ng_crypto::normalize_key(&encrypt_key_material),
            grafana_username: env::var("GRAFANA_USERNAME").ok(),
            grafana_password: env::var("GRAFANA_PASSWORD").ok(),
            allow_private_webhooks: env::var("ALLOW_PRIVATE_WEBHOOKS")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        })
    }

    /// Config for tests: in-process defaults, no environment reads.
    pub fn for_tests(database_url: impl Into<String>) -> Self {
        AppConfig {
            database_url: database_url.into(),
            bind_addr: "127.0.0.1:0".to_owned(),
            api_secret_key: "test-api-secret".to_owned(),
            encrypt_key: ng_crypto::normalize_key("test-encrypt-key"),
            grafana_username: Some("grafana".to_owned()),
            grafana_password: Some("grafana-pass".to_owned()),
            allow_private_webhooks: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_normalizes_encrypt_key_to_32_bytes() {
        let cfg = AppConfig::for_tests("postgres://localhost/test");
        assert_eq!(cfg.encrypt_key.len(), 32);
        assert_eq!(&cfg.encrypt_key[..16], b"test-encrypt-key");
        assert!(cfg.encrypt_key[16..].iter().all(|&b| b == 0));
    }
}
