//! # shellmind-core
//!
//! Core library for shellmind: AI-assisted shell command completion backed
//! by a local Ollama server.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime. Every network call and child process
//!   carries an explicit timeout.
//! - **Never block the shell**: The completion and readiness paths map every
//!   failure to a fallback value. Only explicit commands (setup, train,
//!   status) surface errors.
//! - **Per-keystroke processes**: State that must outlive one `complete`
//!   call (cache, history, session status) lives on disk and is written
//!   atomically.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use shellmind_core::{recent_commands, CompletionContext, CompletionResolver, Config};
//!
//! let config = Config::from_env()?;
//! let mut resolver = CompletionResolver::from_config(&config, service);
//! let recent = recent_commands(&shell_history, config.completion.fingerprint_depth);
//! let context = CompletionContext::detect(&cwd, recent, config.completion.git_timeout());
//! let suggestion = resolver.resolve("git comm", &context);
//! ```

pub mod cache;
pub mod commit;
pub mod config;
pub mod context;
pub mod error;
pub mod history;
pub mod ledger;
pub mod process;
pub mod readiness;
pub mod registry;
pub mod resolver;
pub mod service;
pub mod setup;
pub mod storage;
pub mod table;
pub mod training;

#[cfg(test)]
mod testing;

// Re-export commonly used items at crate root
pub use cache::{CacheEntry, CacheStore};
pub use commit::{CommitCandidate, CommitMessageSynthesizer, CommitSettings, GitDiffSource};
pub use config::{Config, EnvOverrides};
pub use context::{recent_commands, CompletionContext, ContextFingerprint, ProjectType};
pub use error::{Result, ShellmindError};
pub use history::{HistoryEntry, HistoryLedger};
pub use ledger::{
    new_session_id, sweep_stale_sessions, AnnouncementRenderer, OrchestratorLock, StatusLedger,
};
pub use readiness::{
    Announcement, OrchestratorHandle, OrchestratorSettings, ReadinessOrchestrator,
    ReadinessState,
};
pub use registry::ModelRegistry;
pub use resolver::{CompletionResolver, ResolverSettings, Suggestion, SuggestionSource};
pub use service::{
    GenerateRequest, ModelInfo, ModelService, OllamaClient, ProcessLauncher, ServiceLauncher,
    ServiceProbe,
};
pub use setup::{run_setup, DependencyStatus, SetupChecker, SetupReport, SetupStatus};
pub use storage::StorageConfig;
pub use table::{TrainingExample, TrainingTable};
pub use training::{retrain, CommandTrainer, ModelImport, OllamaCli, TrainReport};
