//! Shared application state.

use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::ConfigCache;
use crate::channels::Adapters;
use crate::clock::{Clock, SystemClock};
use crate::config::AppConfig;

/// Outbound HTTP deadline for all adapter calls.
pub const ADAPTER_TIMEOUT_SECS: u64 = 30;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub cfg: Arc<AppConfig>,
    pub config_cache: ConfigCache,
    pub adapters: Arc<Adapters>,
    pub http: reqwest::Client,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(pool: PgPool, cfg: AppConfig) -> Self {
        AppState::with_clock(pool, cfg, Arc::new(SystemClock))
    }

    /// Construction with an explicit clock, for tests pinning time.
    pub fn with_clock(pool: PgPool, cfg: AppConfig, clock: Arc<dyn Clock>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(ADAPTER_TIMEOUT_SECS))
            .build()
            .expect("reqwest client construction cannot fail with static options");
        let adapters = Arc::new(Adapters::new(cfg.allow_private_webhooks));
        AppState {
            pool,
            cfg: Arc::new(cfg),
            config_cache: ConfigCache::new(),
            adapters,
            http,
            clock,
        }
    }
}
