//! Audit entries for agent batches.

use chrono::Utc;
use serde_json::json;
use taskdesk_core::{new_entity_id, AuditEntry, EntityId, REQUEST_ERROR_ACTION};
use taskdesk_storage::ActionStore;

use crate::actions::executor::ActionResult;
use crate::actions::schema::ActionRequest;
use crate::error::{ApiError, ApiResult};

/// Entry for one executed action, written inside the batch transaction.
pub fn action_entry(
    caller_id: EntityId,
    request: &ActionRequest,
    result: &ActionResult,
) -> ApiResult<AuditEntry> {
    Ok(AuditEntry {
        id: new_entity_id(),
        caller_id,
        action_kind: request.kind().as_str().to_string(),
        payload: request.raw.clone(),
        result: serde_json::to_value(result)
            .map_err(|e| ApiError::serialization("audit result", e))?,
        created_at: Utc::now(),
    })
}

/// Entry describing a failed batch.
pub fn request_error_entry(
    caller_id: EntityId,
    action_count: usize,
    failed_index: Option<usize>,
    error: &ApiError,
) -> AuditEntry {
    AuditEntry {
        id: new_entity_id(),
        caller_id,
        action_kind: REQUEST_ERROR_ACTION.to_string(),
        payload: json!({
            "action_count": action_count,
            "failed_index": failed_index,
        }),
        result: json!({
            "status": error.status_code().as_u16(),
            "code": error.code,
            "message": error.message,
        }),
        created_at: Utc::now(),
    }
}

/// Record a failed batch outside any transaction.
///
/// Failures here are logged and swallowed; the caller still sees the
/// original error.
pub async fn record_request_error(store: &dyn ActionStore, entry: AuditEntry) {
    match store.audit_append(&entry).await {
        Ok(()) => tracing::debug!(caller_id = %entry.caller_id, "Recorded request.error audit entry"),
        Err(e) => tracing::error!(
            caller_id = %entry.caller_id,
            error = %e,
            "Failed to record request.error audit entry"
        ),
    }
}
