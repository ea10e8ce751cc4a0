pub mod attempt_logs;
pub mod channel_configs;
pub mod idempotency;
pub mod queue;
pub mod templates;
