//! Property-Based Tests for the Agent Batch Endpoint
//!
//! - A committed batch writes exactly one row and one audit entry per action.
//! - A dry run never writes, whatever the batch contains.
//! - Retrying with the same idempotency key replays the first response.
//! - Every task that names a saved alias links to the entity saved under it.

use axum::http::StatusCode;
use proptest::prelude::*;
use taskdesk_test_utils::fixtures::{self, ADMIN_TOKEN};
use taskdesk_test_utils::StorageStatistics;
use taskdesk_test_utils::generators::{arb_create_actions, arb_linked_batch};
use tokio::runtime::Runtime;

#[path = "support/app.rs"]
mod test_app_support;
use test_app_support::TestApp;

fn test_runtime() -> Result<Runtime, TestCaseError> {
    Runtime::new().map_err(|e| TestCaseError::fail(format!("Failed to create runtime: {}", e)))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_commit_writes_one_row_per_action(actions in arb_create_actions(12)) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let app = TestApp::new().await;
            let count = actions.len();
            let response = app.post(ADMIN_TOKEN, &fixtures::batch(actions, false)).await;
            prop_assert_eq!(response.status, StatusCode::OK);

            let state = app.store.snapshot().await;
            let stats = state.statistics();
            prop_assert_eq!(stats.tasks + stats.documents + stats.events, count);
            prop_assert_eq!(stats.audit_entries, count);
            prop_assert_eq!(response.json()["results"].as_array().map(Vec::len), Some(count));
            Ok(())
        })?;
    }

    #[test]
    fn prop_dry_run_never_writes((_alias, actions) in arb_linked_batch(6)) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let app = TestApp::new().await;
            let count = actions.len();
            let response = app
                .post_with_key(ADMIN_TOKEN, "preview-key", &fixtures::batch(actions, true))
                .await;
            prop_assert_eq!(response.status, StatusCode::OK);

            let body = response.json();
            let results = body["results"].as_array().cloned().unwrap_or_default();
            prop_assert_eq!(results.len(), count);
            for result in &results {
                let id = result["id"].as_str().unwrap_or_default();
                prop_assert!(id.starts_with("preview_"), "unexpected id {}", id);
            }

            let stats = app.store.snapshot().await.statistics();
            prop_assert_eq!(stats, StorageStatistics::default());
            Ok(())
        })?;
    }

    #[test]
    fn prop_retry_replays_first_response(actions in arb_create_actions(6), key in "[A-Za-z0-9-]{1,32}") {
        let rt = test_runtime()?;
        rt.block_on(async {
            let app = TestApp::new().await;
            let body = fixtures::batch(actions, false);

            let first = app.post_with_key(ADMIN_TOKEN, &key, &body).await;
            let after_first = app.store.snapshot().await.statistics();
            let second = app.post_with_key(ADMIN_TOKEN, &key, &body).await;
            let after_second = app.store.snapshot().await.statistics();

            prop_assert_eq!(first.status, StatusCode::OK);
            prop_assert_eq!(second.status, StatusCode::OK);
            prop_assert_eq!(&first.bytes, &second.bytes);
            prop_assert!(second.headers.contains_key("idempotency-replayed"));
            prop_assert_eq!(after_first, after_second);
            prop_assert_eq!(after_first.idempotency_records, 1);
            Ok(())
        })?;
    }

    #[test]
    fn prop_saved_alias_links_every_task((_alias, actions) in arb_linked_batch(8)) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let app = TestApp::new().await;
            let task_count = actions.len() - 1;
            let response = app.post(ADMIN_TOKEN, &fixtures::batch(actions, false)).await;
            prop_assert_eq!(response.status, StatusCode::OK);

            let state = app.store.snapshot().await;
            prop_assert_eq!(state.documents.len(), 1);
            let doc_id = state.documents.keys().next().copied();
            prop_assert_eq!(state.tasks.len(), task_count);
            for task in state.tasks.values() {
                prop_assert_eq!(task.doc_id, doc_id);
            }
            Ok(())
        })?;
    }
}
