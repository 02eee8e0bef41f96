use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

use crate::session::SessionStatus;

/// Internal session-state violations. Any of these drives a session to `Error`.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid session transition {from} -> {to}")]
    InvalidTransition {
        from: SessionStatus,
        to: SessionStatus,
    },

    #[error("iteration cap of {cap} reached")]
    IterationCapReached { cap: u32 },

    #[error("session {0} already has a pending clarification")]
    ClarificationPending(Uuid),

    #[error("session {0} has no pending clarification")]
    NoPendingClarification(Uuid),

    #[error("response targets request {got}, but request {expected} is pending")]
    RequestMismatch { expected: Uuid, got: Uuid },

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(PathBuf),

    #[error("read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parse config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
