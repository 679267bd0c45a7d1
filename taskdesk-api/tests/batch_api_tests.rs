//! End-to-end tests for `POST /api/v1/agent/actions` against the in-memory store.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use taskdesk_api::constants::AGENT_ACTIONS_PATH;
use taskdesk_api::ApiConfig;
use taskdesk_core::REQUEST_ERROR_ACTION;
use taskdesk_test_utils::assertions::{assert_audit_kinds, assert_store_empty};
use taskdesk_test_utils::fixtures::{self, ADMIN_TOKEN, TASKS_ONLY_TOKEN};

#[path = "support/app.rs"]
mod test_app_support;
use test_app_support::TestApp;

fn audit_kinds(entries: &[taskdesk_core::AuditEntry]) -> Vec<&str> {
    entries.iter().map(|e| e.action_kind.as_str()).collect()
}

// ============================================================================
// AUTHENTICATION
// ============================================================================

#[tokio::test]
async fn test_missing_credential_is_401_without_audit() {
    let app = TestApp::new().await;
    let response = app
        .post_raw(None, None, fixtures::doc_and_linked_task().to_string())
        .await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_store_empty(&app.store).await;
}

#[tokio::test]
async fn test_unknown_and_revoked_tokens_are_401() {
    let app = TestApp::new().await;
    let body = fixtures::batch(vec![fixtures::task_create("x")], false);

    let response = app.post("not-a-real-token", &body).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    assert!(app.directory.revoke(ADMIN_TOKEN).await);
    let response = app.post(ADMIN_TOKEN, &body).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_store_empty(&app.store).await;
}

#[tokio::test]
async fn test_agent_token_header_is_accepted() {
    let app = TestApp::new().await;
    let body = fixtures::batch(vec![fixtures::task_create("via header")], false);

    let response = app
        .send(
            Request::builder()
                .method("POST")
                .uri(AGENT_ACTIONS_PATH)
                .header("content-type", "application/json")
                .header("x-agent-token", ADMIN_TOKEN)
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(app.store.snapshot().await.tasks.len(), 1);
}

// ============================================================================
// HAPPY PATH
// ============================================================================

#[tokio::test]
async fn test_doc_and_linked_task_commit_together() {
    let app = TestApp::new().await;
    let response = app.post(ADMIN_TOKEN, &fixtures::doc_and_linked_task()).await;

    assert_eq!(response.status, StatusCode::OK);
    let body = response.json();
    assert_eq!(body["ok"], true);
    assert_eq!(body["agent"]["name"], "admin-agent");
    assert!(body["startedAt"].is_string());
    assert!(body.get("dry_run").is_none());

    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["type"], "doc.create");
    assert_eq!(results[0]["saveAs"], "plan");
    assert_eq!(results[1]["type"], "task.create");
    assert_eq!(results[1]["record"]["doc_id"], results[0]["id"]);

    let state = app.store.snapshot().await;
    assert_eq!(state.documents.len(), 1);
    assert_eq!(state.tasks.len(), 1);
    let task = state.tasks.values().next().unwrap();
    let doc = state.documents.values().next().unwrap();
    assert_eq!(task.doc_id, Some(doc.id));
    assert_audit_kinds(&state.audit_log, &["doc.create", "task.create"]);
}

#[tokio::test]
async fn test_task_defaults_are_applied() {
    let app = TestApp::new().await;
    let body = fixtures::batch(
        vec![json!({"type": "task.create", "data": {"title": "  Plan day  ", "status": "planned"}})],
        false,
    );
    let response = app.post(ADMIN_TOKEN, &body).await;
    assert_eq!(response.status, StatusCode::OK);

    let record = &response.json()["results"][0]["record"];
    assert_eq!(record["title"], "Plan day");
    assert_eq!(record["workspace"], "personal");
    assert_eq!(record["priority"], 2);
    assert_eq!(record["status"], "planned");
    assert_eq!(record["schedule_bucket"], "morning");
}

#[tokio::test]
async fn test_update_by_ref_sees_earlier_create() {
    let app = TestApp::new().await;
    let body = fixtures::batch(
        vec![
            fixtures::with_save_as(fixtures::task_create("first draft"), Some("t1")),
            fixtures::task_update_by_ref("t1", json!({"title": "final", "priority": 4})),
        ],
        false,
    );
    let response = app.post(ADMIN_TOKEN, &body).await;
    assert_eq!(response.status, StatusCode::OK);

    let results = response.json()["results"].clone();
    assert_eq!(results[1]["id"], results[0]["id"]);
    assert_eq!(results[1]["changed"], json!(["title", "priority"]));
    assert_eq!(results[1]["record"]["title"], "final");

    let state = app.store.snapshot().await;
    let task = state.tasks.values().next().unwrap();
    assert_eq!(task.title, "final");
    assert_eq!(task.priority, 4);
}

#[tokio::test]
async fn test_noop_update_is_reported_and_audited() {
    let app = TestApp::new().await;
    let created = app
        .post(ADMIN_TOKEN, &fixtures::batch(vec![fixtures::task_create("keep")], false))
        .await
        .json();
    let id: uuid::Uuid = created["results"][0]["id"].as_str().unwrap().parse().unwrap();

    let response = app
        .post(
            ADMIN_TOKEN,
            &fixtures::batch(vec![fixtures::task_update_by_id(id, json!({}))], false),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    let result = &response.json()["results"][0];
    assert_eq!(result["noop"], true);
    assert_eq!(result["changed"], json!([]));

    let state = app.store.snapshot().await;
    assert_audit_kinds(&state.audit_log, &["task.create", "task.update"]);
}

// ============================================================================
// ATOMICITY
// ============================================================================

#[tokio::test]
async fn test_failure_mid_batch_leaves_no_writes() {
    let app = TestApp::new().await;
    let missing = uuid::Uuid::now_v7();
    let body = fixtures::batch(
        vec![
            fixtures::doc_create("a", None),
            fixtures::task_create("b"),
            fixtures::task_update_by_id(missing, json!({"title": "c"})),
        ],
        false,
    );
    let response = app.post(ADMIN_TOKEN, &body).await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.json()["code"], "ENTITY_NOT_FOUND");

    let state = app.store.snapshot().await;
    assert!(state.documents.is_empty());
    assert!(state.tasks.is_empty());
    assert!(state.idempotency.is_empty());
    assert_eq!(audit_kinds(&state.audit_log), vec![REQUEST_ERROR_ACTION]);
    assert_eq!(state.audit_log[0].payload["failed_index"], 2);
    assert_eq!(state.audit_log[0].result["status"], 404);
}

#[tokio::test]
async fn test_commit_failure_is_500_and_rolls_back() {
    let app = TestApp::new().await;
    app.store.set_fail_commit(true);

    let response = app.post(ADMIN_TOKEN, &fixtures::doc_and_linked_task()).await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.json()["message"].is_string());

    let state = app.store.snapshot().await;
    assert!(state.tasks.is_empty());
    assert!(state.documents.is_empty());
}

#[tokio::test]
async fn test_dangling_doc_id_is_rejected_atomically() {
    let app = TestApp::new().await;
    let body = fixtures::batch(
        vec![
            fixtures::task_create("ok"),
            json!({"type": "task.create", "data": {"title": "bad", "doc_id": uuid::Uuid::now_v7()}}),
        ],
        false,
    );
    let response = app.post(ADMIN_TOKEN, &body).await;
    assert!(response.status.is_server_error());
    assert!(app.store.snapshot().await.tasks.is_empty());
}

// ============================================================================
// VALIDATION
// ============================================================================

#[tokio::test]
async fn test_validation_lists_every_violation() {
    let app = TestApp::new().await;
    let body = fixtures::batch(
        vec![
            json!({"type": "task.create", "data": {"priority": 9}}),
            json!({"type": "task.explode", "data": {}}),
            json!({"type": "task.update", "data": {"title": "x"}, "saveAs": "nope"}),
        ],
        false,
    );
    let response = app.post(ADMIN_TOKEN, &body).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let error = response.json();
    assert_eq!(error["code"], "VALIDATION_FAILED");
    let errors = error["details"]["errors"].as_array().unwrap();
    let fields: Vec<(u64, &str)> = errors
        .iter()
        .map(|e| (e["index"].as_u64().unwrap(), e["field"].as_str().unwrap()))
        .collect();
    assert!(fields.contains(&(0, "data.title")));
    assert!(fields.contains(&(0, "data.priority")));
    assert!(fields.contains(&(1, "type")));
    assert!(fields.contains(&(2, "saveAs")));
    assert!(fields.contains(&(2, "data.id")));

    let state = app.store.snapshot().await;
    assert!(state.tasks.is_empty());
    assert_eq!(audit_kinds(&state.audit_log), vec![REQUEST_ERROR_ACTION]);
}

#[tokio::test]
async fn test_unknown_data_field_is_rejected() {
    let app = TestApp::new().await;
    let body = fixtures::batch(
        vec![json!({"type": "doc.create", "data": {"title": "a", "colour": "red"}})],
        false,
    );
    let response = app.post(ADMIN_TOKEN, &body).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    let error = response.json();
    assert_eq!(error["details"]["errors"][0]["field"], "data.colour");
}

#[tokio::test]
async fn test_each_mistyped_field_gets_its_own_error() {
    let app = TestApp::new().await;
    let body = fixtures::batch(
        vec![json!({"type": "task.create", "data": {
            "title": 5,
            "priority": "high",
            "status": "bogus",
            "scheduled_date": "nope"
        }})],
        false,
    );
    let response = app.post(ADMIN_TOKEN, &body).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let error = response.json();
    assert_eq!(error["message"], "4 validation errors");
    let fields: Vec<&str> = error["details"]["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["field"].as_str().unwrap())
        .collect();
    assert_eq!(
        fields,
        vec!["data.title", "data.priority", "data.status", "data.scheduled_date"]
    );
}

#[tokio::test]
async fn test_invalid_json_is_400_and_audited() {
    let app = TestApp::new().await;
    let response = app.post_raw(Some(ADMIN_TOKEN), None, "{not json").await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let state = app.store.snapshot().await;
    assert_eq!(audit_kinds(&state.audit_log), vec![REQUEST_ERROR_ACTION]);
    assert_eq!(state.audit_log[0].payload["action_count"], 0);
}

#[tokio::test]
async fn test_batch_size_limit() {
    let app = TestApp::new().await;

    let at_limit: Vec<Value> = (0..200).map(|i| fixtures::task_create(&format!("t{}", i))).collect();
    let response = app.post(ADMIN_TOKEN, &fixtures::batch(at_limit, false)).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(app.store.snapshot().await.tasks.len(), 200);

    let over_limit: Vec<Value> = (0..201).map(|i| fixtures::task_create(&format!("u{}", i))).collect();
    let response = app.post(ADMIN_TOKEN, &fixtures::batch(over_limit, false)).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(app.store.snapshot().await.tasks.len(), 200);
}

#[tokio::test]
async fn test_empty_batch_is_rejected() {
    let app = TestApp::new().await;
    let response = app.post(ADMIN_TOKEN, &fixtures::batch(vec![], false)).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_body_limit_is_enforced() {
    let app = TestApp::with_config(ApiConfig {
        max_body_bytes: 64,
        ..ApiConfig::default()
    })
    .await;
    let body = fixtures::batch(vec![fixtures::task_create(&"x".repeat(200))], false);
    let response = app.post(ADMIN_TOKEN, &body).await;
    assert_eq!(response.status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(app.store.snapshot().await.tasks.is_empty());
}

// ============================================================================
// REFERENCES
// ============================================================================

#[tokio::test]
async fn test_forward_reference_falls_back_to_literal_id() {
    let app = TestApp::new().await;
    let body = fixtures::batch(
        vec![
            fixtures::task_create_linked("early", "later"),
            fixtures::doc_create("later doc", Some("later")),
        ],
        false,
    );
    let response = app.post(ADMIN_TOKEN, &body).await;
    assert_eq!(response.status, StatusCode::OK);

    let state = app.store.snapshot().await;
    let task = state.tasks.values().next().unwrap();
    assert_eq!(task.doc_id, None);
}

#[tokio::test]
async fn test_update_with_unbound_ref_and_no_id_is_400() {
    let app = TestApp::new().await;
    let body = fixtures::batch(
        vec![
            fixtures::task_create("a"),
            fixtures::task_update_by_ref("ghost", json!({"title": "b"})),
        ],
        false,
    );
    let response = app.post(ADMIN_TOKEN, &body).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(app.store.snapshot().await.tasks.is_empty());
}

#[tokio::test]
async fn test_alias_rebinding_uses_latest() {
    let app = TestApp::new().await;
    let body = fixtures::batch(
        vec![
            fixtures::doc_create("one", Some("d")),
            fixtures::doc_create("two", Some("d")),
            fixtures::task_create_linked("linked", "d"),
        ],
        false,
    );
    let response = app.post(ADMIN_TOKEN, &body).await;
    assert_eq!(response.status, StatusCode::OK);
    let results = response.json()["results"].clone();
    assert_eq!(results[2]["record"]["doc_id"], results[1]["id"]);
}

// ============================================================================
// AUTHORIZATION
// ============================================================================

#[tokio::test]
async fn test_doc_ref_to_task_alias_is_400_in_both_modes() {
    let app = TestApp::new().await;
    let actions = vec![
        fixtures::with_save_as(fixtures::task_create("parent"), Some("t1")),
        fixtures::task_create_linked("child", "t1"),
    ];

    let preview = app.post(ADMIN_TOKEN, &fixtures::batch(actions.clone(), true)).await;
    let real = app.post(ADMIN_TOKEN, &fixtures::batch(actions, false)).await;

    for response in [&preview, &real] {
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        let error = response.json();
        assert_eq!(error["details"]["errors"][0]["index"], 1);
        assert_eq!(error["details"]["errors"][0]["field"], "data.doc_ref");
    }
    assert!(app.store.snapshot().await.tasks.is_empty());
}

#[tokio::test]
async fn test_missing_capability_aborts_whole_batch() {
    let app = TestApp::new().await;
    for actions in [
        vec![fixtures::task_create("allowed"), fixtures::doc_create("denied", None)],
        vec![fixtures::doc_create("denied", None), fixtures::task_create("allowed")],
    ] {
        let response = app.post(TASKS_ONLY_TOKEN, &fixtures::batch(actions, false)).await;
        assert_eq!(response.status, StatusCode::FORBIDDEN);
        let body = response.json();
        assert_eq!(body["code"], "FORBIDDEN");
        assert_eq!(body["details"]["missing_capability"], "docs:write");
    }

    let state = app.store.snapshot().await;
    assert!(state.tasks.is_empty());
    assert!(state.documents.is_empty());
    assert_eq!(
        audit_kinds(&state.audit_log),
        vec![REQUEST_ERROR_ACTION, REQUEST_ERROR_ACTION]
    );
}

#[tokio::test]
async fn test_forbidden_dry_run_is_not_audited() {
    let app = TestApp::new().await;
    let body = fixtures::batch(vec![fixtures::doc_create("denied", None)], true);
    let response = app.post(TASKS_ONLY_TOKEN, &body).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_store_empty(&app.store).await;
}

// ============================================================================
// DRY RUN
// ============================================================================

#[tokio::test]
async fn test_dry_run_writes_nothing() {
    let app = TestApp::new().await;
    let mut body = fixtures::doc_and_linked_task();
    body["dry_run"] = json!(true);

    let response = app.post(ADMIN_TOKEN, &body).await;
    assert_eq!(response.status, StatusCode::OK);

    let json = response.json();
    assert_eq!(json["dry_run"], true);
    assert_eq!(json["preview_only"], true);
    let results = json["results"].as_array().unwrap();
    for result in results {
        assert_eq!(result["would_write"], false);
        assert!(result["id"].as_str().unwrap().starts_with("preview_"));
    }
    assert_eq!(results[1]["record"]["doc_id"], results[0]["id"]);

    assert_store_empty(&app.store).await;
}

#[tokio::test]
async fn test_dry_run_ignores_idempotency_key() {
    let app = TestApp::new().await;
    let body = fixtures::batch(vec![fixtures::task_create("preview")], true);
    let response = app.post_with_key(ADMIN_TOKEN, "key-1", &body).await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.headers.get("idempotency-replayed").is_none());
    assert_store_empty(&app.store).await;
}

#[tokio::test]
async fn test_dry_run_update_of_missing_row_is_404() {
    let app = TestApp::new().await;
    let body = fixtures::batch(
        vec![fixtures::task_update_by_id(uuid::Uuid::now_v7(), json!({"title": "x"}))],
        true,
    );
    let response = app.post(ADMIN_TOKEN, &body).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_store_empty(&app.store).await;
}

#[tokio::test]
async fn test_preview_id_cannot_be_written() {
    let app = TestApp::new().await;
    let body = fixtures::batch(
        vec![json!({"type": "task.update", "data": {"id": "preview_0123456789abcdef0123456789abcdef", "title": "x"}})],
        false,
    );
    let response = app.post(ADMIN_TOKEN, &body).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

// ============================================================================
// IDEMPOTENCY
// ============================================================================

#[tokio::test]
async fn test_retry_replays_identical_bytes() {
    let app = TestApp::new().await;
    let body = fixtures::doc_and_linked_task();

    let first = app.post_with_key(ADMIN_TOKEN, "retry-1", &body).await;
    assert_eq!(first.status, StatusCode::OK);
    assert!(first.headers.get("idempotency-replayed").is_none());

    let second = app.post_with_key(ADMIN_TOKEN, "retry-1", &body).await;
    assert_eq!(second.status, StatusCode::OK);
    assert_eq!(second.bytes, first.bytes);
    assert_eq!(
        second.headers.get("idempotency-replayed").unwrap(),
        "true"
    );

    let state = app.store.snapshot().await;
    assert_eq!(state.documents.len(), 1);
    assert_eq!(state.tasks.len(), 1);
    assert_eq!(state.idempotency.len(), 1);
    assert_audit_kinds(&state.audit_log, &["doc.create", "task.create"]);
}

#[tokio::test]
async fn test_key_order_and_whitespace_do_not_change_fingerprint() {
    let app = TestApp::new().await;
    let first = r#"{"actions":[{"type":"task.create","data":{"title":"a","priority":3}}]}"#;
    let second = r#"{ "actions" : [ { "data" : { "priority" : 3, "title" : "a" }, "type" : "task.create" } ] }"#;

    let a = app.post_raw(Some(ADMIN_TOKEN), Some("k"), first).await;
    let b = app.post_raw(Some(ADMIN_TOKEN), Some("k"), second).await;
    assert_eq!(a.status, StatusCode::OK);
    assert_eq!(b.status, StatusCode::OK);
    assert_eq!(a.bytes, b.bytes);
    assert_eq!(app.store.snapshot().await.tasks.len(), 1);
}

#[tokio::test]
async fn test_reused_key_with_different_body_is_409() {
    let app = TestApp::new().await;
    let first = fixtures::batch(vec![fixtures::task_create("one")], false);
    let second = fixtures::batch(vec![fixtures::task_create("two")], false);

    assert_eq!(app.post_with_key(ADMIN_TOKEN, "k", &first).await.status, StatusCode::OK);
    let response = app.post_with_key(ADMIN_TOKEN, "k", &second).await;
    assert_eq!(response.status, StatusCode::CONFLICT);
    assert_eq!(response.json()["code"], "IDEMPOTENCY_CONFLICT");

    let state = app.store.snapshot().await;
    assert_eq!(state.tasks.len(), 1);
    assert_eq!(state.tasks.values().next().unwrap().title, "one");
    assert_eq!(
        audit_kinds(&state.audit_log),
        vec!["task.create", REQUEST_ERROR_ACTION]
    );
}

#[tokio::test]
async fn test_concurrent_requests_with_same_key_commit_once() {
    let app = TestApp::new().await;
    let body = fixtures::doc_and_linked_task();

    let (a, b) = tokio::join!(
        app.post_with_key(ADMIN_TOKEN, "race", &body),
        app.post_with_key(ADMIN_TOKEN, "race", &body),
    );

    assert_eq!(a.status, StatusCode::OK);
    assert_eq!(b.status, StatusCode::OK);
    assert_eq!(a.bytes, b.bytes);
    let replayed = [&a, &b]
        .iter()
        .filter(|r| r.headers.contains_key("idempotency-replayed"))
        .count();
    assert_eq!(replayed, 1);

    let state = app.store.snapshot().await;
    assert_eq!(state.documents.len(), 1);
    assert_eq!(state.tasks.len(), 1);
    assert_eq!(state.idempotency.len(), 1);
    assert_audit_kinds(&state.audit_log, &["doc.create", "task.create"]);
}

#[tokio::test]
async fn test_concurrent_different_bodies_with_same_key_conflict() {
    let app = TestApp::new().await;
    let first = fixtures::batch(vec![fixtures::task_create("one")], false);
    let second = fixtures::batch(vec![fixtures::task_create("two")], false);

    let (a, b) = tokio::join!(
        app.post_with_key(ADMIN_TOKEN, "race", &first),
        app.post_with_key(ADMIN_TOKEN, "race", &second),
    );

    let mut statuses = vec![a.status.as_u16(), b.status.as_u16()];
    statuses.sort_unstable();
    assert_eq!(statuses, vec![200, 409]);
    assert_eq!(app.store.snapshot().await.tasks.len(), 1);
}

#[tokio::test]
async fn test_serialization_conflict_without_ledger_record_is_500() {
    let app = TestApp::new().await;
    app.store.set_conflict_on_commit(true);
    let body = fixtures::batch(vec![fixtures::task_create("x")], false);

    let keyed = app.post_with_key(ADMIN_TOKEN, "k", &body).await;
    assert_eq!(keyed.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(keyed.json()["code"], "DATABASE_ERROR");

    let unkeyed = app.post(ADMIN_TOKEN, &body).await;
    assert_eq!(unkeyed.status, StatusCode::INTERNAL_SERVER_ERROR);

    let state = app.store.snapshot().await;
    assert!(state.tasks.is_empty());
    assert!(state.idempotency.is_empty());
}

#[tokio::test]
async fn test_keys_are_scoped_per_agent() {
    let app = TestApp::new().await;
    let body = fixtures::batch(vec![fixtures::task_create("shared key")], false);

    assert_eq!(app.post_with_key(ADMIN_TOKEN, "same", &body).await.status, StatusCode::OK);
    let other = app.post_with_key(TASKS_ONLY_TOKEN, "same", &body).await;
    assert_eq!(other.status, StatusCode::OK);
    assert!(other.headers.get("idempotency-replayed").is_none());
    assert_eq!(app.store.snapshot().await.tasks.len(), 2);
}

#[tokio::test]
async fn test_failed_batch_does_not_consume_key() {
    let app = TestApp::new().await;
    let missing = uuid::Uuid::now_v7();
    let bad = fixtures::batch(
        vec![fixtures::task_update_by_id(missing, json!({"title": "x"}))],
        false,
    );
    assert_eq!(
        app.post_with_key(ADMIN_TOKEN, "k", &bad).await.status,
        StatusCode::NOT_FOUND
    );

    let good = fixtures::batch(vec![fixtures::task_create("fresh")], false);
    assert_eq!(app.post_with_key(ADMIN_TOKEN, "k", &good).await.status, StatusCode::OK);
}

#[tokio::test]
async fn test_invalid_idempotency_key_is_400() {
    let app = TestApp::new().await;
    let body = fixtures::batch(vec![fixtures::task_create("x")], false);
    let long_key = "k".repeat(300);
    let response = app.post_with_key(ADMIN_TOKEN, &long_key, &body).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(app.store.snapshot().await.tasks.is_empty());
}

// ============================================================================
// METRICS
// ============================================================================

#[tokio::test]
async fn test_metrics_count_batches() {
    let app = TestApp::new().await;
    app.post(ADMIN_TOKEN, &fixtures::batch(vec![fixtures::task_create("m")], false))
        .await;

    let response = app
        .send(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status, StatusCode::OK);
    let text = String::from_utf8(response.bytes).unwrap();
    assert!(text.contains("taskdesk_batches_total"));
}
