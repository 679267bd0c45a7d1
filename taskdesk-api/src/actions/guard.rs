//! Capability checks for a validated batch.

use taskdesk_core::ActionKind;

use crate::actions::schema::ActionRequest;
use crate::auth::AuthContext;
use crate::error::{ApiError, ApiResult};

/// Capability an agent needs to run an action of `kind`.
pub fn required_capability(kind: ActionKind) -> &'static str {
    match kind {
        ActionKind::TaskCreate | ActionKind::TaskUpdate => "tasks:write",
        ActionKind::DocCreate | ActionKind::DocUpdate => "docs:write",
        ActionKind::EventCreate => "events:write",
        ActionKind::AttachmentCreate => "attachments:write",
    }
}

/// Check every action before any of them runs.
///
/// Reports the lowest-indexed action whose capability is missing.
pub fn authorize_batch(auth: &AuthContext, actions: &[ActionRequest]) -> ApiResult<()> {
    for (index, request) in actions.iter().enumerate() {
        let kind = request.kind();
        let capability = required_capability(kind);
        if !auth.has_capability(capability) {
            tracing::info!(
                agent_id = %auth.agent_id,
                index,
                action = %kind,
                capability,
                "Batch rejected: missing capability"
            );
            return Err(ApiError::missing_capability(index, kind.as_str(), capability));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::schema::validate_batch;
    use crate::error::ErrorCode;
    use serde_json::json;
    use uuid::Uuid;

    fn batch() -> Vec<ActionRequest> {
        validate_batch(
            json!({"actions": [
                {"type": "task.create", "data": {"title": "a"}},
                {"type": "event.create", "data": {"title": "b", "starts_at": "2026-01-01T09:00:00Z"}},
                {"type": "doc.create", "data": {"title": "c"}},
            ]}),
            200,
        )
        .unwrap()
        .actions
    }

    #[test]
    fn test_every_kind_has_a_capability() {
        for kind in ActionKind::ALL {
            assert!(required_capability(kind).ends_with(":write"));
        }
    }

    #[test]
    fn test_first_missing_capability_is_reported() {
        let auth = AuthContext::new(Uuid::nil(), "planner", ["tasks:write"]);
        let err = authorize_batch(&auth, &batch()).unwrap_err();
        assert_eq!(err.code, ErrorCode::Forbidden);
        let details = err.details.unwrap_or_default();
        assert_eq!(details["index"], 1);
        assert_eq!(details["missing_capability"], "events:write");
    }

    #[test]
    fn test_wildcards_authorize_everything_they_cover() {
        let root = AuthContext::new(Uuid::nil(), "root", ["*"]);
        assert!(authorize_batch(&root, &batch()).is_ok());

        let areas = AuthContext::new(Uuid::nil(), "areas", ["tasks:*", "events:*", "docs:write"]);
        assert!(authorize_batch(&areas, &batch()).is_ok());
    }
}
