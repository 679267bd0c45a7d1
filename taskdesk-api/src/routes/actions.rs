//! Agent Batch Action Route
//!
//! `POST /api/v1/agent/actions` accepts a list of heterogeneous mutating
//! actions and applies them atomically, or previews them when `dry_run` is
//! set. Real batches may carry an `Idempotency-Key` header, in which case a
//! retry with the same body replays the first response byte for byte.

use std::time::Instant;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use taskdesk_core::{EntityId, Timestamp};
use tracing::Instrument;

use crate::actions::{
    audit, authorize_batch,
    idempotency::{self, LedgerLookup, PendingLedgerEntry},
    validate_batch, ActionResult, ExecutionError,
};
use crate::auth::AuthContext;
use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthExtractor;
use crate::state::AppState;
use crate::telemetry::METRICS;

// ============================================================================
// RESPONSE TYPES
// ============================================================================

#[derive(Debug, Serialize)]
struct AgentSummary<'a> {
    id: EntityId,
    name: &'a str,
}

/// Success body for both real and dry-run batches.
#[derive(Debug, Serialize)]
struct BatchResponse<'a> {
    ok: bool,
    agent: AgentSummary<'a>,
    #[serde(rename = "startedAt")]
    started_at: Timestamp,
    results: &'a [ActionResult],
    #[serde(skip_serializing_if = "Option::is_none")]
    dry_run: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    preview_only: Option<bool>,
}

fn render_body(
    auth: &AuthContext,
    started_at: Timestamp,
    results: &[ActionResult],
    dry_run: bool,
) -> ApiResult<String> {
    let body = BatchResponse {
        ok: true,
        agent: AgentSummary {
            id: auth.agent_id,
            name: &auth.name,
        },
        started_at,
        results,
        dry_run: dry_run.then_some(true),
        preview_only: dry_run.then_some(true),
    };
    serde_json::to_string(&body).map_err(|e| ApiError::serialization("response", e))
}

fn json_response(body: String) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
        body,
    )
        .into_response()
}

// ============================================================================
// PIPELINE
// ============================================================================

/// A successful batch and the label it is counted under.
struct BatchOutcome {
    response: Response,
    label: &'static str,
}

/// A failed batch with what is known about it for the audit log.
struct BatchFailure {
    error: ApiError,
    dry_run: bool,
    action_count: usize,
    failed_index: Option<usize>,
}

impl BatchFailure {
    fn new(error: ApiError, dry_run: bool, action_count: usize) -> Self {
        Self {
            error,
            dry_run,
            action_count,
            failed_index: None,
        }
    }

    fn from_execution(err: ExecutionError, dry_run: bool, action_count: usize) -> Self {
        let failed_index = match &err {
            ExecutionError::Action { index, .. } => Some(*index),
            _ => None,
        };
        Self {
            failed_index,
            ..Self::new(err.into(), dry_run, action_count)
        }
    }

    fn label(&self) -> &'static str {
        if self.error.is_client_error() {
            "rejected"
        } else {
            "failed"
        }
    }
}

async fn run_batch(
    state: &AppState,
    auth: &AuthContext,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<BatchOutcome, BatchFailure> {
    let started_at = Utc::now();

    let value: Value = serde_json::from_slice(body).map_err(|e| {
        BatchFailure::new(
            ApiError::invalid_input(format!("Request body is not valid JSON: {}", e)),
            false,
            0,
        )
    })?;
    let dry_run_hint = value.get("dry_run").and_then(Value::as_bool).unwrap_or(false);
    let item_count = value
        .get("actions")
        .and_then(Value::as_array)
        .map_or(0, Vec::len);

    let batch = validate_batch(value, state.config.max_actions)
        .map_err(|e| BatchFailure::new(e, dry_run_hint, item_count))?;
    let dry_run = batch.dry_run;
    let count = batch.actions.len();

    let span = tracing::Span::current();
    span.record("dry_run", dry_run);
    span.record("action_count", count as u64);

    authorize_batch(auth, &batch.actions).map_err(|e| BatchFailure::new(e, dry_run, count))?;

    if dry_run {
        let results = state
            .executor
            .preview(&batch.actions)
            .await
            .map_err(|e| BatchFailure::from_execution(e, true, count))?;
        let body = render_body(auth, started_at, &results, true)
            .map_err(|e| BatchFailure::new(e, true, count))?;
        record_actions(&results, true);
        return Ok(BatchOutcome {
            response: json_response(body),
            label: "preview",
        });
    }

    let key = idempotency::idempotency_key(headers, state.config.idempotency_key_max_len)
        .map_err(|e| BatchFailure::new(e, false, count))?;

    let pending = match key {
        Some(key) => {
            let request_hash = idempotency::request_fingerprint(&batch.actions)
                .map_err(|e| BatchFailure::new(e, false, count))?;
            match idempotency::lookup(state.store.as_ref(), auth.agent_id, &key, &request_hash)
                .await
                .map_err(|e| BatchFailure::new(e, false, count))?
            {
                LedgerLookup::Miss => Some(PendingLedgerEntry {
                    key,
                    caller_id: auth.agent_id,
                    request_hash,
                }),
                LedgerLookup::Replay(record) => {
                    return Ok(BatchOutcome {
                        response: idempotency::replay_response(record),
                        label: "replayed",
                    })
                }
                LedgerLookup::Conflict => {
                    return Err(BatchFailure::new(
                        ApiError::idempotency_conflict(&key),
                        false,
                        count,
                    ))
                }
            }
        }
        None => None,
    };

    let retry = pending.clone();
    let outcome = state
        .executor
        .execute(auth, &batch.actions, pending, |results| {
            render_body(auth, started_at, results, false)
        })
        .await;

    match outcome {
        Ok((results, body)) => {
            record_actions(&results, false);
            Ok(BatchOutcome {
                response: json_response(body),
                label: "committed",
            })
        }
        Err(ExecutionError::LedgerConflict) => {
            // A concurrent request with the same key committed first.
            let Some(entry) = retry else {
                return Err(BatchFailure::new(
                    ApiError::internal_error("Ledger conflict without an idempotency key"),
                    false,
                    count,
                ));
            };
            match idempotency::lookup(
                state.store.as_ref(),
                entry.caller_id,
                &entry.key,
                &entry.request_hash,
            )
            .await
            .map_err(|e| BatchFailure::new(e, false, count))?
            {
                LedgerLookup::Replay(record) => {
                    tracing::debug!(key = %entry.key, "Concurrent duplicate replayed");
                    Ok(BatchOutcome {
                        response: idempotency::replay_response(record),
                        label: "replayed",
                    })
                }
                LedgerLookup::Conflict => Err(BatchFailure::new(
                    ApiError::idempotency_conflict(&entry.key),
                    false,
                    count,
                )),
                // The conflict was not over this key after all.
                LedgerLookup::Miss => Err(BatchFailure::new(
                    ApiError::database_error("Batch conflicted with a concurrent request"),
                    false,
                    count,
                )),
            }
        }
        Err(err) => Err(BatchFailure::from_execution(err, false, count)),
    }
}

fn record_actions(results: &[ActionResult], dry_run: bool) {
    if let Ok(metrics) = METRICS.as_ref() {
        metrics.record_actions(results.iter().map(|r| r.kind), dry_run);
    }
}

// ============================================================================
// ROUTE HANDLER
// ============================================================================

/// POST /api/v1/agent/actions - Execute or preview an agent batch
pub async fn post_actions(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    let span = tracing::info_span!(
        "agent_batch",
        agent_id = %auth.agent_id,
        agent = %auth.name,
        dry_run = tracing::field::Empty,
        action_count = tracing::field::Empty,
    );

    async move {
        let result = run_batch(&state, &auth, &headers, &body).await;
        let elapsed = started.elapsed().as_secs_f64();

        match result {
            Ok(outcome) => {
                if let Ok(metrics) = METRICS.as_ref() {
                    metrics.record_batch(outcome.label, outcome.label == "preview", elapsed);
                }
                tracing::info!(outcome = outcome.label, elapsed_ms = elapsed * 1000.0, "Batch finished");
                outcome.response
            }
            Err(failure) => {
                if let Ok(metrics) = METRICS.as_ref() {
                    metrics.record_batch(failure.label(), failure.dry_run, elapsed);
                }
                if failure.error.is_client_error() {
                    tracing::info!(code = %failure.error.code, message = %failure.error.message, "Batch rejected");
                } else {
                    tracing::error!(code = %failure.error.code, message = %failure.error.message, "Batch failed");
                }

                if !failure.dry_run {
                    let entry = audit::request_error_entry(
                        auth.agent_id,
                        failure.action_count,
                        failure.failed_index,
                        &failure.error,
                    );
                    audit::record_request_error(state.store.as_ref(), entry).await;
                }

                failure.error.into_response()
            }
        }
    }
    .instrument(span)
    .await
}
