//! Error types for shellmind-core operations.
//!
//! Only explicit, user-invoked operations (setup, training, status) surface
//! these to the user. The completion and readiness paths map every error to a
//! fallback value before it can reach the shell.

use std::path::PathBuf;

/// All errors that can occur in shellmind-core operations.
#[derive(Debug, thiserror::Error)]
pub enum ShellmindError {
    // ─────────────────────────────────────────────────────────────────────
    // Service Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Model service unreachable at {url}: {details}")]
    ServiceUnreachable { url: String, details: String },

    #[error("Model not found on service: {0}")]
    ModelAbsent(String),

    #[error("Invalid response from model service: {0}")]
    InvalidResponse(String),

    #[error("Request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("HTTP error: {context}: {source}")]
    Http {
        context: String,
        #[source]
        source: reqwest::Error,
    },

    // ─────────────────────────────────────────────────────────────────────
    // Validation Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Commit message rejected: {0}")]
    ValidationRejected(String),

    #[error("Illegal readiness transition: {from} -> {to}")]
    IllegalTransition { from: String, to: String },

    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    #[error("Home directory not found")]
    HomeDirNotFound,

    // ─────────────────────────────────────────────────────────────────────
    // I/O Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON parsing error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    // ─────────────────────────────────────────────────────────────────────
    // Action Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Binary not found on PATH: {0}")]
    BinaryNotFound(String),

    #[error("Command execution failed: {command}: {details}")]
    CommandFailed { command: String, details: String },

    #[error("Orchestrator already running for session {0}")]
    AlreadyRunning(String),
}

impl ShellmindError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        ShellmindError::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        ShellmindError::Json {
            context: context.into(),
            source,
        }
    }

    /// True for failures that mean "the service is not there right now".
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            ShellmindError::ServiceUnreachable { .. } | ShellmindError::Timeout(_)
        )
    }
}

/// Convenience type alias for Results using ShellmindError.
pub type Result<T> = std::result::Result<T, ShellmindError>;
