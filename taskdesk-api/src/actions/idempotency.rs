//! Idempotency ledger for real batches.
//!
//! A key is bound to exactly one request fingerprint per caller. Replaying the
//! same request returns the stored response bytes; reusing the key for a
//! different request is a conflict.

use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde_json::Value;
use taskdesk_core::{content_hash_hex, EntityId, IdempotencyRecord};
use taskdesk_storage::ActionStore;

use crate::actions::schema::ActionRequest;
use crate::constants::{IDEMPOTENCY_KEY_HEADER, IDEMPOTENCY_REPLAYED_HEADER};
use crate::error::{ApiError, ApiResult};

/// Extract and validate the `Idempotency-Key` header.
///
/// Returns `Ok(None)` when the header is absent.
pub fn idempotency_key(headers: &HeaderMap, max_len: usize) -> ApiResult<Option<String>> {
    let Some(value) = headers.get(IDEMPOTENCY_KEY_HEADER) else {
        return Ok(None);
    };

    let key = value
        .to_str()
        .map_err(|_| ApiError::invalid_format(IDEMPOTENCY_KEY_HEADER, "visible ASCII characters"))?;

    if key.is_empty() || key.len() > max_len {
        return Err(ApiError::invalid_format(
            IDEMPOTENCY_KEY_HEADER,
            &format!("1 to {} characters", max_len),
        ));
    }
    if !key.bytes().all(|b| b.is_ascii_graphic()) {
        return Err(ApiError::invalid_format(
            IDEMPOTENCY_KEY_HEADER,
            "visible ASCII characters",
        ));
    }

    Ok(Some(key.to_string()))
}

/// SHA-256 hex over the canonical JSON of the normalized actions.
///
/// Map keys serialize in sorted order, so two bodies that normalize to the
/// same actions fingerprint identically regardless of key order or
/// whitespace.
pub fn request_fingerprint(actions: &[ActionRequest]) -> ApiResult<String> {
    let normalized = actions
        .iter()
        .map(ActionRequest::normalized)
        .collect::<ApiResult<Vec<Value>>>()?;
    let canonical = serde_json::to_vec(&serde_json::json!({ "actions": normalized }))
        .map_err(|e| ApiError::serialization("request fingerprint", e))?;
    Ok(content_hash_hex(&canonical))
}

/// What the ledger says about an incoming request.
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerLookup {
    /// Key never used by this caller.
    Miss,
    /// Same key, same request: replay the stored response.
    Replay(IdempotencyRecord),
    /// Same key, different request.
    Conflict,
}

pub async fn lookup(
    store: &dyn ActionStore,
    caller_id: EntityId,
    key: &str,
    request_hash: &str,
) -> ApiResult<LedgerLookup> {
    let outcome = match store.idempotency_get(caller_id, key).await? {
        None => LedgerLookup::Miss,
        Some(record) if record.request_hash == request_hash => LedgerLookup::Replay(record),
        Some(record) => {
            tracing::warn!(
                caller_id = %caller_id,
                key,
                stored_hash = %record.request_hash,
                "Idempotency key reused with a different request"
            );
            LedgerLookup::Conflict
        }
    };
    Ok(outcome)
}

/// Response for a replayed request: stored bytes, verbatim.
pub fn replay_response(record: IdempotencyRecord) -> Response {
    tracing::debug!(key = %record.key, caller_id = %record.caller_id, "Replaying stored response");
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/json")),
            (
                header::HeaderName::from_static(IDEMPOTENCY_REPLAYED_HEADER),
                HeaderValue::from_static("true"),
            ),
        ],
        record.response_body,
    )
        .into_response()
}

/// Ledger record waiting for its response body.
#[derive(Debug, Clone)]
pub struct PendingLedgerEntry {
    pub key: String,
    pub caller_id: EntityId,
    pub request_hash: String,
}

impl PendingLedgerEntry {
    pub fn into_record(self, response_body: String) -> IdempotencyRecord {
        IdempotencyRecord {
            key: self.key,
            caller_id: self.caller_id,
            request_hash: self.request_hash,
            response_body,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::schema::validate_batch;
    use serde_json::json;
    use taskdesk_core::new_entity_id;
    use taskdesk_storage::InMemoryStore;

    fn headers(key: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(IDEMPOTENCY_KEY_HEADER, HeaderValue::from_str(key).unwrap());
        headers
    }

    #[test]
    fn test_key_validation() {
        assert_eq!(idempotency_key(&HeaderMap::new(), 256).unwrap(), None);
        assert_eq!(
            idempotency_key(&headers("batch-42"), 256).unwrap().as_deref(),
            Some("batch-42")
        );
        assert!(idempotency_key(&headers(&"k".repeat(257)), 256).is_err());
        assert!(idempotency_key(&headers("has space"), 256).is_err());
    }

    #[test]
    fn test_fingerprint_ignores_key_order_and_whitespace() {
        let a = validate_batch(
            json!({"actions": [{"type": "task.create", "data": {"title": "x", "priority": 3}}]}),
            200,
        )
        .unwrap();
        let b = validate_batch(
            json!({"dry_run": false, "actions": [{"data": {"priority": 3, "title": " x"}, "type": "task.create"}]}),
            200,
        )
        .unwrap();
        let c = validate_batch(
            json!({"actions": [{"type": "task.create", "data": {"title": "y", "priority": 3}}]}),
            200,
        )
        .unwrap();

        let fa = request_fingerprint(&a.actions).unwrap();
        assert_eq!(fa, request_fingerprint(&b.actions).unwrap());
        assert_ne!(fa, request_fingerprint(&c.actions).unwrap());
        assert_eq!(fa.len(), 64);
    }

    #[tokio::test]
    async fn test_lookup_outcomes() {
        let store = InMemoryStore::new();
        let caller = new_entity_id();
        assert_eq!(
            lookup(&store, caller, "k", "h1").await.unwrap(),
            LedgerLookup::Miss
        );

        let record = PendingLedgerEntry {
            key: "k".to_string(),
            caller_id: caller,
            request_hash: "h1".to_string(),
        }
        .into_record("{\"ok\":true}".to_string());
        let mut tx = store.begin().await.unwrap();
        tx.idempotency_insert(&record).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(
            lookup(&store, caller, "k", "h1").await.unwrap(),
            LedgerLookup::Replay(record)
        );
        assert_eq!(
            lookup(&store, caller, "k", "h2").await.unwrap(),
            LedgerLookup::Conflict
        );
        assert_eq!(
            lookup(&store, new_entity_id(), "k", "h2").await.unwrap(),
            LedgerLookup::Miss
        );
    }
}
