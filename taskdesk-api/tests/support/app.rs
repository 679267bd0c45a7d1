//! In-process harness for the batch endpoint.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use taskdesk_api::constants::AGENT_ACTIONS_PATH;
use taskdesk_api::{create_api_router, ApiConfig, AppState};
use taskdesk_storage::{InMemoryAgentDirectory, InMemoryStore};
use taskdesk_test_utils::fixtures;
use tower::ServiceExt;

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub bytes: Vec<u8>,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.bytes).expect("response body is JSON")
    }
}

pub struct TestApp {
    pub store: InMemoryStore,
    pub directory: InMemoryAgentDirectory,
    router: Router,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(ApiConfig::default()).await
    }

    pub async fn with_config(config: ApiConfig) -> Self {
        let store = InMemoryStore::new();
        let directory = fixtures::seeded_directory().await;
        let state = AppState::new(
            Arc::new(store.clone()),
            Arc::new(directory.clone()),
            config,
        );
        Self {
            store,
            directory,
            router: create_api_router(state),
        }
    }

    /// POST raw bytes to the action endpoint.
    pub async fn post_raw(
        &self,
        token: Option<&str>,
        idempotency_key: Option<&str>,
        body: impl Into<Body>,
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method("POST")
            .uri(AGENT_ACTIONS_PATH)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        if let Some(key) = idempotency_key {
            builder = builder.header("idempotency-key", key);
        }

        self.send(builder.body(body.into()).unwrap()).await
    }

    /// Route an arbitrary request through the full router.
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec();
        TestResponse {
            status,
            headers,
            bytes,
        }
    }

    pub async fn post(&self, token: &str, body: &Value) -> TestResponse {
        self.post_raw(Some(token), None, body.to_string()).await
    }

    pub async fn post_with_key(&self, token: &str, key: &str, body: &Value) -> TestResponse {
        self.post_raw(Some(token), Some(key), body.to_string()).await
    }
}
