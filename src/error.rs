//! Replica error types.
//!
//! Every fallible operation in the crate returns [`ReplicaError`]. The enum is
//! serializable so status reporting layers can hand structured failures to
//! whatever presents them.

use crate::services::sync_events::SyncStep;
use serde::Serialize;
use thiserror::Error;

/// Errors raised by the store, the remote source and the sync engine.
///
/// All variants serialize to a structured JSON object.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum ReplicaError {
    /// A remote call failed (network, auth, rate limit, bad status).
    #[error("Transport error: {message}")]
    Transport {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        status_code: Option<u16>,
        #[serde(skip_serializing_if = "Option::is_none")]
        endpoint: Option<String>,
    },

    /// The local store is unavailable or a constraint was violated.
    #[error("Storage error: {message}")]
    Storage {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        operation: Option<String>,
    },

    /// A single-entity lookup missed.
    #[error("Not found: {resource}")]
    NotFound {
        resource: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },

    /// The caller cancelled a streaming fetch.
    #[error("Operation cancelled")]
    Cancelled,

    /// Configuration is missing or malformed.
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        field: Option<String>,
    },

    /// A step of an orchestrated sync run failed.
    #[error("Sync step '{step}' failed: {source}")]
    StepFailed {
        step: SyncStep,
        source: Box<ReplicaError>,
    },

    /// Internal error.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ReplicaError {
    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            status_code: None,
            endpoint: None,
        }
    }

    /// Create a transport error with status code and endpoint.
    pub fn transport_full(
        message: impl Into<String>,
        status_code: u16,
        endpoint: impl Into<String>,
    ) -> Self {
        Self::Transport {
            message: message.into(),
            status_code: Some(status_code),
            endpoint: Some(endpoint.into()),
        }
    }

    /// Create a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            operation: None,
        }
    }

    /// Create a storage error with operation context.
    pub fn storage_with_op(message: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            operation: Some(operation.into()),
        }
    }

    /// Create a not found error.
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: None,
        }
    }

    /// Create a not found error with ID.
    pub fn not_found_with_id(resource: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: Some(id.to_string()),
        }
    }

    /// Create a cancellation error.
    pub fn cancelled() -> Self {
        Self::Cancelled
    }

    /// Create a configuration error for a specific field.
    pub fn config_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Wrap an error with the orchestrated step it aborted.
    pub fn step_failed(step: SyncStep, source: ReplicaError) -> Self {
        Self::StepFailed {
            step,
            source: Box::new(source),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether callers can recover by falling back to a remote fetch.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether this error (or the error a failed step wraps) is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::StepFailed { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// The orchestrated step that failed, if this error came from a sync run.
    pub fn failed_step(&self) -> Option<SyncStep> {
        match self {
            Self::StepFailed { step, .. } => Some(*step),
            _ => None,
        }
    }
}

// Conversions from common error types

impl From<sqlx::Error> for ReplicaError {
    fn from(err: sqlx::Error) -> Self {
        Self::storage(err.to_string())
    }
}

impl From<reqwest::Error> for ReplicaError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::transport("Request timed out")
        } else if err.is_connect() {
            Self::transport("Failed to connect to server")
        } else if let Some(status) = err.status() {
            Self::Transport {
                message: format!("HTTP error: {}", err),
                status_code: Some(status.as_u16()),
                endpoint: None,
            }
        } else {
            Self::transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ReplicaError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal(format!("JSON error: {}", err))
    }
}

impl From<crate::db::DbError> for ReplicaError {
    fn from(err: crate::db::DbError) -> Self {
        Self::storage(err.to_string())
    }
}
