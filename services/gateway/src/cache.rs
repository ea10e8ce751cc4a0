//! Read-through cache of decrypted per-(principal, channel) configuration.
//!
//! Per-process, 300 s TTL. The staleness window is contractual: admin writes
//! do not invalidate, they just age out.

use chrono::{DateTime, Duration, Utc};
use ng_protocol::ChannelType;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::channels::EndpointConfig;
use crate::clock::Clock;
use crate::error::GatewayError;
use crate::repo::channel_configs;

pub const CONFIG_CACHE_TTL_SECS: i64 = 300;

#[derive(Clone)]
struct CacheEntry {
    config: EndpointConfig,
    cached_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct ConfigCache {
    entries: Arc<RwLock<HashMap<(String, ChannelType), CacheEntry>>>,
    ttl: Duration,
}

impl Default for ConfigCache {
    fn default() -> Self {
        ConfigCache::new()
    }
}

impl ConfigCache {
    pub fn new() -> Self {
        ConfigCache {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl: Duration::seconds(CONFIG_CACHE_TTL_SECS),
        }
    }

    /// Return the active config for (principal, channel), reading through to
    /// the store on miss or expiry. `None` means no active config exists.
    pub async fn get_or_load(
        &self,
        pool: &PgPool,
        principal_id: &str,
        channel: ChannelType,
        encrypt_key: &[u8; 32],
        clock: &dyn Clock,
    ) -> Result<Option<EndpointConfig>, GatewayError> {
        let now = clock.now();
        let key = (principal_id.to_owned(), channel);

        {
            let entries = self.entries.read().await;
            if let Some(entry) = entries.get(&key) {
                if now - entry.cached_at < self.ttl {
                    return Ok(Some(entry.config.clone()));
                }
            }
        }

        let Some(row) = channel_configs::fetch_active(pool, principal_id, channel).await? else {
            return Ok(None);
        };

        let plaintext = ng_crypto::decrypt_blob(encrypt_key, &row.config_ciphertext)
            .map_err(|e| GatewayError::Internal(format!("config decrypt failed: {e}")))?;
        let config = EndpointConfig::decode(channel, &plaintext)?;

        let mut entries = self.entries.write().await;
        entries.insert(
            key,
            CacheEntry {
                config: config.clone(),
                cached_at: now,
            },
        );
        Ok(Some(config))
    }

    /// Number of live entries (test/ops helper).
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
