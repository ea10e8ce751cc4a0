//! Retry scheduler and queue consumers.
//!
//! The retry consumer treats its queue as at-least-once: every mutation is
//! keyed by `log_id` and gated on the row still being non-terminal, so
//! re-delivery of an already-settled message is a no-op. Terminal outcomes
//! (and unrecoverable row loads) ack the message; transient processing
//! errors return it to the queue with a short backoff.

use chrono::Duration;
use ng_protocol::{ContentType, MAX_RETRY_COUNT, RETRY_INTERVALS, RetryMessage};
use tracing::{info, warn};

use crate::channels::OutboundMessage;
use crate::error::GatewayError;
use crate::repo::attempt_logs::{self, AttemptLogRow};
use crate::repo::queue::{self, QueueName};
use crate::repo::templates;
use crate::state::AppState;

pub const QUEUE_POLL_INTERVAL_SECS: u64 = 1;
pub const VISIBILITY_TIMEOUT_SECS: i64 = 60;
pub const PROCESSING_BACKOFF_SECS: i64 = 5;

/// How far back the stranded-row scan looks.
pub const RETRY_TRIGGER_WINDOW_HOURS: i64 = 24;

/// What to do with a claimed queue message.
#[derive(Debug, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    Backoff,
}

/// Publish a retry message for `log_id` with the given per-message delay.
pub async fn publish_retry(
    state: &AppState,
    log_id: i64,
    retry_count: i32,
    delay_secs: i64,
) -> Result<(), GatewayError> {
    let now = state.clock.now();
    let msg = RetryMessage::new(log_id, retry_count, now.timestamp(), delay_secs);
    let payload = serde_json::to_value(&msg).expect("retry message serializes");
    queue::publish(&state.pool, QueueName::Retry, &payload, now, delay_secs).await?;
    Ok(())
}

async fn publish_dead_letter(
    state: &AppState,
    log_id: i64,
    retry_count: i32,
) -> Result<(), GatewayError> {
    let now = state.clock.now();
    let msg = RetryMessage::new(log_id, retry_count, now.timestamp(), 0);
    let payload = serde_json::to_value(&msg).expect("retry message serializes");
    queue::publish(&state.pool, QueueName::DeadLetter, &payload, now, 0).await?;
    Ok(())
}

/// Delay for the next attempt after `retry_count` scheduled retries.
pub fn next_delay_secs(retry_count: i32) -> i64 {
    let index = (retry_count.max(0) as usize).min(RETRY_INTERVALS.len() - 1);
    RETRY_INTERVALS[index]
}

// ---------------------------------------------------------------------------
// Retry consumer
// ---------------------------------------------------------------------------

/// Poll loop over the retry queue. Runs until the process exits.
pub async fn run_retry_consumer(state: AppState) {
    info!("retry consumer started");
    loop {
        match consume_one(&state, QueueName::Retry).await {
            Ok(true) => {} // processed a message; poll again immediately
            Ok(false) => {
                tokio::time::sleep(std::time::Duration::from_secs(QUEUE_POLL_INTERVAL_SECS)).await;
            }
            Err(e) => {
                warn!("retry consumer poll failed: {e}");
                tokio::time::sleep(std::time::Duration::from_secs(QUEUE_POLL_INTERVAL_SECS)).await;
            }
        }
    }
}

/// Poll loop over the dead-letter queue.
pub async fn run_dlq_consumer(state: AppState) {
    info!("dead-letter consumer started");
    loop {
        match consume_one(&state, QueueName::DeadLetter).await {
            Ok(true) => {}
            Ok(false) => {
                tokio::time::sleep(std::time::Duration::from_secs(QUEUE_POLL_INTERVAL_SECS)).await;
            }
            Err(e) => {
                warn!("dead-letter consumer poll failed: {e}");
                tokio::time::sleep(std::time::Duration::from_secs(QUEUE_POLL_INTERVAL_SECS)).await;
            }
        }
    }
}

/// Claim and handle one message. Returns false when the queue was empty.
pub async fn consume_one(state: &AppState, queue_name: QueueName) -> Result<bool, GatewayError> {
    let Some(claimed) = queue::pop(
        &state.pool,
        queue_name,
        state.clock.now(),
        VISIBILITY_TIMEOUT_SECS,
    )
    .await?
    else {
        return Ok(false);
    };

    let disposition = match parse_message(&claimed.payload) {
        Some(msg) => match queue_name {
            QueueName::Retry => process_retry_message(state, &msg).await,
            QueueName::DeadLetter => process_dlq_message(state, &msg).await,
        },
        None => {
            warn!(message_id = claimed.id, "dropping malformed queue payload");
            Disposition::Ack
        }
    };

    match disposition {
        Disposition::Ack => queue::ack(&state.pool, claimed.id).await?,
        Disposition::Backoff => {
            queue::delay(
                &state.pool,
                claimed.id,
                state.clock.now(),
                PROCESSING_BACKOFF_SECS,
            )
            .await?;
        }
    }
    Ok(true)
}

fn parse_message(payload: &serde_json::Value) -> Option<RetryMessage> {
    serde_json::from_value(payload.clone()).ok()
}

/// Handle one retry message end to end.
pub async fn process_retry_message(state: &AppState, msg: &RetryMessage) -> Disposition {
    let row = match attempt_logs::fetch_by_id(&state.pool, msg.log_id).await {
        Ok(Some(row)) => row,
        Ok(None) => {
            warn!(log_id = msg.log_id, "retry message references a missing row");
            return Disposition::Ack;
        }
        Err(e) => {
            warn!(log_id = msg.log_id, "row load failed, backing off: {e}");
            return Disposition::Backoff;
        }
    };

    // Re-delivery of a settled attempt is a no-op.
    if row.status().is_terminal() {
        return Disposition::Ack;
    }

    match attempt_logs::mark_retrying(&state.pool, row.id, state.clock.now()).await {
        Ok(true) => {}
        Ok(false) => {
            warn!(log_id = row.id, status = %row.status, "row left the retry states; acking");
            return Disposition::Ack;
        }
        Err(e) => {
            warn!(log_id = row.id, "failed to mark retrying: {e}");
            return Disposition::Backoff;
        }
    }

    let Some(channel) = row.channel() else {
        let _ = attempt_logs::mark_failed(
            &state.pool,
            row.id,
            &format!("unknown channel type '{}'", row.channel_type),
            state.clock.now(),
        )
        .await;
        return Disposition::Ack;
    };

    let config = match state
        .config_cache
        .get_or_load(
            &state.pool,
            &row.principal_id,
            channel,
            &state.cfg.encrypt_key,
            state.clock.as_ref(),
        )
        .await
    {
        Ok(Some(config)) => config,
        Ok(None) => {
            let _ = attempt_logs::mark_failed(&state.pool, row.id, "config_not_found", state.clock.now()).await;
            return Disposition::Ack;
        }
        Err(GatewayError::Infrastructure(e)) => {
            warn!(log_id = row.id, "config load failed, backing off: {e}");
            return Disposition::Backoff;
        }
        Err(e) => {
            let _ = attempt_logs::mark_failed(&state.pool, row.id, &e.to_string(), state.clock.now()).await;
            return Disposition::Ack;
        }
    };

    // The rendered content was persisted at dispatch; re-send it verbatim.
    let content_type = recover_content_type(state, &row, channel).await;
    let outbound = OutboundMessage {
        subject: row.subject.as_deref(),
        content: &row.content,
        content_type,
    };
    let outcome = state
        .adapters
        .get(channel)
        .send(&state.http, state.clock.as_ref(), &config, &outbound)
        .await;

    match outcome {
        Ok(message_id) => {
            if let Err(e) = attempt_logs::mark_sent(&state.pool, row.id, &message_id, state.clock.now()).await {
                warn!(log_id = row.id, "failed to mark retried attempt sent: {e}");
                return Disposition::Backoff;
            }
            info!(log_id = row.id, channel = %channel, "retry succeeded");
            Disposition::Ack
        }
        Err(e) => {
            let next_count = msg.retry_count + 1;
            if e.retryable() && next_count < MAX_RETRY_COUNT {
                let error = e.to_string();
                if let Err(db_err) =
                    attempt_logs::mark_retry_scheduled(
                        &state.pool,
                        row.id,
                        next_count,
                        &error,
                        state.clock.now(),
                    )
                    .await
                {
                    warn!(log_id = row.id, "failed to reschedule: {db_err}");
                    return Disposition::Backoff;
                }
                let delay = next_delay_secs(next_count);
                if let Err(publish_err) = publish_retry(state, row.id, next_count, delay).await {
                    warn!(log_id = row.id, "failed to publish next retry: {publish_err}");
                    return Disposition::Backoff;
                }
                Disposition::Ack
            } else if e.retryable() {
                // Exhausted: settle the row with the final count and forward
                // to the DLQ for operator inspection.
                let reason = format!("retries exhausted: {e}");
                if let Err(db_err) =
                    attempt_logs::mark_failed_exhausted(
                        &state.pool,
                        row.id,
                        next_count,
                        &reason,
                        state.clock.now(),
                    )
                    .await
                {
                    warn!(log_id = row.id, "failed to finalize exhausted row: {db_err}");
                    return Disposition::Backoff;
                }
                if let Err(dlq_err) = publish_dead_letter(state, row.id, next_count).await {
                    warn!(log_id = row.id, "failed to publish dead letter: {dlq_err}");
                }
                Disposition::Ack
            } else {
                if let Err(db_err) =
                    attempt_logs::mark_failed(&state.pool, row.id, &e.to_string(), state.clock.now()).await
                {
                    warn!(log_id = row.id, "failed to finalize row: {db_err}");
                    return Disposition::Backoff;
                }
                Disposition::Ack
            }
        }
    }
}

/// Dead-letter handler: record an alert, settle the row, never re-enqueue.
pub async fn process_dlq_message(state: &AppState, msg: &RetryMessage) -> Disposition {
    warn!(
        log_id = msg.log_id,
        retry_count = msg.retry_count,
        "dead-lettered notification attempt"
    );
    match attempt_logs::fetch_by_id(&state.pool, msg.log_id).await {
        Ok(Some(row)) if !row.status().is_terminal() => {
            if let Err(e) =
                attempt_logs::mark_failed(
                    &state.pool,
                    row.id,
                    "dead-lettered after retries",
                    state.clock.now(),
                )
                .await
            {
                warn!(log_id = row.id, "failed to settle dead-lettered row: {e}");
                return Disposition::Backoff;
            }
            Disposition::Ack
        }
        Ok(_) => Disposition::Ack,
        Err(e) => {
            warn!(log_id = msg.log_id, "row load failed in DLQ handler: {e}");
            Disposition::Backoff
        }
    }
}

/// Template content_type is not persisted on the log row; recover it from the
/// template when possible, defaulting to plain text.
async fn recover_content_type(
    state: &AppState,
    row: &AttemptLogRow,
    channel: ng_protocol::ChannelType,
) -> ContentType {
    if let Some(key) = &row.template_key {
        if let Ok(Some(content)) = templates::fetch_content(&state.pool, key, channel).await {
            return content.content_type();
        }
    }
    ContentType::Text
}

// ---------------------------------------------------------------------------
// Stranded-row trigger (admin endpoint + startup recovery sweep)
// ---------------------------------------------------------------------------

/// Re-publish retry messages for `retry_scheduled` rows whose expected
/// process time has passed but whose queue message is gone (crash between
/// transition and publish, queue purge, etc.).
pub async fn trigger_stranded_retries(state: &AppState) -> Result<usize, GatewayError> {
    let now = state.clock.now();
    let window_start = now - Duration::hours(RETRY_TRIGGER_WINDOW_HOURS);
    let rows = attempt_logs::list_stranded_retry_scheduled(&state.pool, window_start).await?;

    let mut published = 0;
    for row in rows {
        let expected_at = row.updated_at + Duration::seconds(next_delay_secs(row.retry_count));
        if expected_at <= now {
            publish_retry(state, row.id, row.retry_count, 0).await?;
            published += 1;
        }
    }
    if published > 0 {
        info!(published, "re-published stranded retry messages");
    }
    Ok(published)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_schedule_is_10_then_30_then_capped() {
        assert_eq!(next_delay_secs(0), 10);
        assert_eq!(next_delay_secs(1), 30);
        assert_eq!(next_delay_secs(2), 30);
        assert_eq!(next_delay_secs(-1), 10);
    }

    #[test]
    fn malformed_payloads_parse_to_none() {
        assert!(parse_message(&serde_json::json!({"nope": true})).is_none());
        let ok = parse_message(&serde_json::json!({
            "logId": 7,
            "retryCount": 0,
            "type": "retry_notification",
            "scheduledAt": 100,
            "expectedProcessAt": 110,
        }));
        assert_eq!(ok.unwrap().log_id, 7);
    }
}
