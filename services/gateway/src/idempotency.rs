//! Idempotency manager: dedupe by (principal, idempotency_key) for 24 hours.

use chrono::Duration;
use ng_protocol::{IDEMPOTENCY_TTL_SECS, SendData, SendRequest};
use sha2::{Digest, Sha256};
use sqlx::PgPool;

use crate::clock::Clock;
use crate::error::GatewayError;
use crate::repo::idempotency as repo;

/// Hash of the canonical request body, stored alongside the result set.
pub fn request_hash(req: &SendRequest) -> String {
    let canonical = serde_json::to_vec(req).expect("send request serializes");
    hex::encode(Sha256::digest(&canonical))
}

/// Look up a live record; a hit replays the stored result set unchanged.
pub async fn check(
    pool: &PgPool,
    clock: &dyn Clock,
    principal_id: &str,
    idempotency_key: &str,
) -> Result<Option<SendData>, GatewayError> {
    let Some(row) = repo::fetch_active(pool, principal_id, idempotency_key, clock.now()).await?
    else {
        return Ok(None);
    };
    let data: SendData = serde_json::from_value(row.results)
        .map_err(|e| GatewayError::Internal(format!("stored idempotency results corrupt: {e}")))?;
    Ok(Some(data))
}

/// Store the result set with a 24 h expiry. Returns false when a concurrent
/// dispatch won the unique-key race; the caller's results are discarded and
/// subsequent checks replay the winner's.
pub async fn store(
    pool: &PgPool,
    clock: &dyn Clock,
    principal_id: &str,
    idempotency_key: &str,
    req: &SendRequest,
    results: &SendData,
) -> Result<bool, GatewayError> {
    let expires_at = clock.now() + Duration::seconds(IDEMPOTENCY_TTL_SECS);
    let value = serde_json::to_value(results).expect("send data serializes");
    let inserted = repo::insert(
        pool,
        principal_id,
        idempotency_key,
        &request_hash(req),
        &value,
        expires_at,
    )
    .await?;
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_hash_is_stable_and_input_sensitive() {
        let req = SendRequest {
            user_id: "u1".to_owned(),
            channels: vec!["webhook".to_owned()],
            template_key: Some("welcome".to_owned()),
            variables: None,
            custom_content: None,
            idempotency_key: Some("k1".to_owned()),
        };
        let a = request_hash(&req);
        let b = request_hash(&req);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        let mut other = req;
        other.user_id = "u2".to_owned();
        assert_ne!(a, request_hash(&other));
    }
}
