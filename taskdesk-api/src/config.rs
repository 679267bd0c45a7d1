//! API Configuration Module
//!
//! Limits for the action endpoint and the choice of backing store. Loaded from
//! environment variables with defaults suitable for development.

use std::str::FromStr;

use taskdesk_core::ConfigError;

use crate::constants::{DEFAULT_MAX_BODY_BYTES, MAX_BATCH_ACTIONS, MAX_IDEMPOTENCY_KEY_LEN};

// ============================================================================
// STORE SELECTION
// ============================================================================

/// Which [`taskdesk_storage::ActionStore`] the server runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreKind {
    #[default]
    Postgres,
    Memory,
}

impl FromStr for StoreKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "pg" => Ok(StoreKind::Postgres),
            "memory" | "mem" => Ok(StoreKind::Memory),
            other => Err(ConfigError::InvalidValue {
                field: "TASKDESK_STORE".to_string(),
                value: other.to_string(),
                reason: "expected 'postgres' or 'memory'".to_string(),
            }),
        }
    }
}

// ============================================================================
// API CONFIGURATION
// ============================================================================

/// Limits applied to the batch action endpoint.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Maximum number of actions in one batch.
    pub max_actions: usize,

    /// Maximum accepted request body size in bytes.
    pub max_body_bytes: usize,

    /// Maximum idempotency key length.
    pub idempotency_key_max_len: usize,

    /// Backing store.
    pub store: StoreKind,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            max_actions: MAX_BATCH_ACTIONS,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            idempotency_key_max_len: MAX_IDEMPOTENCY_KEY_LEN,
            store: StoreKind::default(),
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `TASKDESK_MAX_ACTIONS`: Actions per batch (default: 200)
    /// - `TASKDESK_MAX_BODY_BYTES`: Request body limit (default: 2 MiB)
    /// - `TASKDESK_IDEMPOTENCY_KEY_MAX_LEN`: Key length limit (default: 256)
    /// - `TASKDESK_STORE`: "postgres" or "memory" (default: postgres)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let max_actions = std::env::var("TASKDESK_MAX_ACTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|n: &usize| *n > 0)
            .unwrap_or(defaults.max_actions);

        let max_body_bytes = std::env::var("TASKDESK_MAX_BODY_BYTES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.max_body_bytes);

        let idempotency_key_max_len = std::env::var("TASKDESK_IDEMPOTENCY_KEY_MAX_LEN")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|n: &usize| *n > 0)
            .unwrap_or(defaults.idempotency_key_max_len);

        let store = match std::env::var("TASKDESK_STORE") {
            Ok(value) => value.parse()?,
            Err(_) => defaults.store,
        };

        Ok(Self {
            max_actions,
            max_body_bytes,
            idempotency_key_max_len,
            store,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let config = ApiConfig::default();
        assert_eq!(config.max_actions, 200);
        assert_eq!(config.idempotency_key_max_len, 256);
        assert_eq!(config.store, StoreKind::Postgres);
    }

    #[test]
    fn test_store_kind_parse() {
        assert_eq!("memory".parse::<StoreKind>(), Ok(StoreKind::Memory));
        assert_eq!(" Postgres ".parse::<StoreKind>(), Ok(StoreKind::Postgres));
        assert!("sqlite".parse::<StoreKind>().is_err());
    }
}
