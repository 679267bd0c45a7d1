//! Authentication Module
//!
//! Agents authenticate with an opaque bearer token, presented either as
//! `Authorization: Bearer <token>` or as `X-Agent-Token: <token>`. Tokens are
//! looked up by their SHA-256 digest in an [`AgentDirectory`]; the plaintext
//! is never stored.

use std::collections::BTreeSet;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use taskdesk_core::{content_hash_hex, ConfigError, EntityId};
use taskdesk_storage::{AgentDirectory, InMemoryAgentDirectory};

use crate::constants::WILDCARD_SCOPE;
use crate::error::{ApiError, ApiResult};

// ============================================================================
// STATIC AGENT CREDENTIALS
// ============================================================================

/// One agent credential supplied through configuration.
#[derive(Clone)]
pub struct StaticAgent {
    pub name: String,
    pub token: SecretString,
    pub scopes: BTreeSet<String>,
}

impl std::fmt::Debug for StaticAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticAgent")
            .field("name", &self.name)
            .field("token", &"[REDACTED]")
            .field("scopes", &self.scopes)
            .finish()
    }
}

impl StaticAgent {
    /// Hex SHA-256 of the token, as stored in the agent directory.
    pub fn token_hash(&self) -> String {
        content_hash_hex(self.token.expose_secret().as_bytes())
    }
}

/// Authentication configuration.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    /// Agents to register at startup.
    pub agents: Vec<StaticAgent>,
}

impl AuthConfig {
    /// Create authentication configuration from environment variables.
    ///
    /// # Environment Variables
    /// - `TASKDESK_AGENT_TOKENS`: comma-separated `name:token:scope1|scope2`
    ///   entries. Scopes may be empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var("TASKDESK_AGENT_TOKENS") {
            Ok(raw) => Self::parse_agent_tokens(&raw),
            Err(_) => Ok(Self::default()),
        }
    }

    /// Parse the `TASKDESK_AGENT_TOKENS` format.
    pub fn parse_agent_tokens(raw: &str) -> Result<Self, ConfigError> {
        let mut agents = Vec::new();
        for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let mut parts = entry.splitn(3, ':');
            let name = parts.next().unwrap_or_default().trim();
            let token = parts.next().unwrap_or_default().trim();
            let scopes = parts.next().unwrap_or_default();

            if name.is_empty() || token.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "TASKDESK_AGENT_TOKENS".to_string(),
                    value: name.to_string(),
                    reason: "expected name:token:scope1|scope2".to_string(),
                });
            }

            agents.push(StaticAgent {
                name: name.to_string(),
                token: SecretString::new(token.to_string().into()),
                scopes: scopes
                    .split('|')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
            });
        }
        Ok(Self { agents })
    }

    /// Add an agent credential.
    pub fn add_agent<I, S>(&mut self, name: &str, token: &str, scopes: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.agents.push(StaticAgent {
            name: name.to_string(),
            token: SecretString::new(token.to_string().into()),
            scopes: scopes.into_iter().map(Into::into).collect(),
        });
    }

    /// Register every configured agent in an in-memory directory.
    pub async fn seed(&self, directory: &InMemoryAgentDirectory) {
        for agent in &self.agents {
            directory
                .register(
                    &agent.name,
                    agent.token.expose_secret(),
                    agent.scopes.iter().cloned(),
                )
                .await;
        }
    }
}

// ============================================================================
// AUTH CONTEXT
// ============================================================================

/// Identity and capability set of the calling agent.
///
/// Resolved once per request and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    pub agent_id: EntityId,
    pub name: String,
    pub scopes: BTreeSet<String>,
}

impl AuthContext {
    pub fn new<I, S>(agent_id: EntityId, name: impl Into<String>, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            agent_id,
            name: name.into(),
            scopes: scopes.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether the granted scopes cover `capability`.
    ///
    /// `*` covers everything; `tasks:*` covers every `tasks:` capability.
    pub fn has_capability(&self, capability: &str) -> bool {
        if self.scopes.contains(WILDCARD_SCOPE) || self.scopes.contains(capability) {
            return true;
        }
        match capability.split_once(':') {
            Some((area, _)) => self.scopes.contains(&format!("{}:*", area)),
            None => false,
        }
    }
}

// ============================================================================
// AUTHENTICATION FUNCTIONS
// ============================================================================

/// Pull the presented token out of the credential headers.
///
/// `Authorization` wins when both headers are present.
pub fn extract_token<'a>(
    auth_header: Option<&'a str>,
    agent_token_header: Option<&'a str>,
) -> ApiResult<&'a str> {
    let token = match (auth_header, agent_token_header) {
        (Some(value), _) => value.strip_prefix("Bearer ").ok_or_else(|| {
            ApiError::invalid_token("Authorization header must use Bearer scheme")
        })?,
        (None, Some(value)) => value,
        (None, None) => {
            return Err(ApiError::unauthorized(
                "Authentication required: provide Authorization or X-Agent-Token header",
            ))
        }
    };

    let token = token.trim();
    if token.is_empty() {
        return Err(ApiError::unauthorized("Agent token is empty"));
    }
    Ok(token)
}

/// Resolve a presented token to the calling agent.
pub async fn authenticate(
    directory: &dyn AgentDirectory,
    auth_header: Option<&str>,
    agent_token_header: Option<&str>,
) -> ApiResult<AuthContext> {
    let token = extract_token(auth_header, agent_token_header)?;
    let token_hash = content_hash_hex(token.as_bytes());

    let credential = directory
        .find_by_token_hash(&token_hash)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid agent token"))?;

    if credential.revoked {
        return Err(ApiError::unauthorized("Agent credential has been revoked"));
    }

    Ok(AuthContext {
        agent_id: credential.agent_id,
        name: credential.name,
        scopes: credential.scopes,
    })
}
