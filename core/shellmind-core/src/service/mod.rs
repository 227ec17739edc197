//! The external model service.
//!
//! Everything above this module talks to the server through [`ModelService`],
//! so the orchestrator, resolver and commit synthesizer can be exercised
//! against an in-process stub. Every method takes an explicit timeout; there
//! is no call here that can block without bound.

pub mod ollama;
pub mod probe;

use std::time::Duration;

use crate::error::Result;

pub use ollama::OllamaClient;
pub use probe::{ProcessLauncher, ServiceLauncher, ServiceProbe};

/// One model loaded on the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    pub name: String,
    pub size: Option<u64>,
    pub modified_at: Option<String>,
}

impl ModelInfo {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: None,
            modified_at: None,
        }
    }
}

/// Non-streaming generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub system: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub timeout: Duration,
}

/// Client surface of the model server.
pub trait ModelService: Send + Sync {
    /// Base URL, for diagnostics.
    fn endpoint(&self) -> &str;

    /// Cheap liveness check.
    fn ping(&self, timeout: Duration) -> Result<()>;

    fn list_models(&self, timeout: Duration) -> Result<Vec<ModelInfo>>;

    /// Returns the raw response text.
    fn generate(&self, request: &GenerateRequest) -> Result<String>;
}
