//! Runtime configuration.
//!
//! `Config` is built once at process start (file, then environment overrides)
//! and passed by reference to every component. Nothing reads the environment
//! after that point.
//!
//! ```toml
//! [service]
//! url = "http://127.0.0.1:11434"
//! probe_timeout_ms = 500
//!
//! [model]
//! name = "zsh-assistant"
//!
//! [completion]
//! min_prefix_len = 2
//! cache_ttl_secs = 3600
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, ShellmindError};
use crate::storage::StorageConfig;

pub const OLLAMA_URL_ENV: &str = "SHELLMIND_OLLAMA_URL";
pub const MODEL_ENV: &str = "SHELLMIND_MODEL";

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    /// Base URL of the model server.
    pub url: String,
    /// Name (or path) of the model server binary.
    pub binary: String,
    /// Liveness probe budget. Kept sub-second.
    pub probe_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    /// Budget for listing loaded models.
    pub list_timeout_ms: u64,
    /// Maximum number of re-probes after launching the server.
    pub launch_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:11434".to_string(),
            binary: "ollama".to_string(),
            probe_timeout_ms: 500,
            connect_timeout_ms: 300,
            list_timeout_ms: 800,
            launch_attempts: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl ServiceConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn list_timeout(&self) -> Duration {
        Duration::from_millis(self.list_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    /// Fine-tuned model the orchestrator waits for.
    pub name: String,
    /// Base model pulled by `setup` when building the fine-tuned model.
    pub base_model: String,
    pub warm_up: bool,
    pub warm_up_timeout_ms: u64,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: "zsh-assistant".to_string(),
            base_model: "codellama:7b".to_string(),
            warm_up: true,
            warm_up_timeout_ms: 8000,
            max_tokens: 64,
            temperature: 0.1,
            top_p: 0.9,
        }
    }
}

impl ModelConfig {
    pub fn warm_up_timeout(&self) -> Duration {
        Duration::from_millis(self.warm_up_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct CompletionConfig {
    /// Buffers shorter than this (in chars) go straight to native completion.
    pub min_prefix_len: usize,
    /// End-to-end budget for one `resolve` call.
    pub deadline_ms: u64,
    /// Cap on the model request inside that budget.
    pub model_timeout_ms: u64,
    pub cache_ttl_secs: u64,
    pub persist_cache: bool,
    pub history_capacity: usize,
    /// How many of the shell's recent commands feed the context fingerprint.
    pub fingerprint_depth: usize,
    /// `git status` cap on the keystroke path. Kept short.
    pub git_timeout_ms: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            min_prefix_len: 2,
            deadline_ms: 3000,
            model_timeout_ms: 2500,
            cache_ttl_secs: 3600,
            persist_cache: true,
            history_capacity: 100,
            fingerprint_depth: 3,
            git_timeout_ms: 300,
        }
    }
}

impl CompletionConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    pub fn model_timeout(&self) -> Duration {
        Duration::from_millis(self.model_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn git_timeout(&self) -> Duration {
        Duration::from_millis(self.git_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct CommitConfig {
    /// Retries after the first rejected candidate.
    pub max_retries: u32,
    /// Minimum distinct words in the subject.
    pub min_words: usize,
    pub timeout_ms: u64,
    pub max_tokens: u32,
    pub git_timeout_ms: u64,
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            min_words: 3,
            timeout_ms: 15_000,
            max_tokens: 96,
            git_timeout_ms: 2000,
        }
    }
}

impl CommitConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn git_timeout(&self) -> Duration {
        Duration::from_millis(self.git_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct TrainingConfig {
    /// Fine-tuning job, run as-is with the training data path in
    /// `SHELLMIND_TRAINING_DATA`. Empty means import-only.
    pub command: Vec<String>,
    /// Adapter produced by the job, referenced from the Modelfile.
    pub adapter: Option<String>,
    pub max_examples: Option<usize>,
    /// Upper bound on the fine-tuning job.
    pub timeout_mins: Option<u64>,
}

impl TrainingConfig {
    pub const DEFAULT_MAX_EXAMPLES: usize = 500;
    pub const DEFAULT_TIMEOUT_MINS: u64 = 120;

    pub fn max_examples(&self) -> usize {
        self.max_examples.unwrap_or(Self::DEFAULT_MAX_EXAMPLES)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(60 * self.timeout_mins.unwrap_or(Self::DEFAULT_TIMEOUT_MINS))
    }
}

/// On-disk shape of config.toml.
#[derive(Debug, Clone, Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    service: ServiceConfig,
    #[serde(default)]
    model: ModelConfig,
    #[serde(default)]
    completion: CompletionConfig,
    #[serde(default)]
    commit: CommitConfig,
    #[serde(default)]
    training: TrainingConfig,
}

/// Environment overrides, captured once.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub ollama_url: Option<String>,
    pub model: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        let read = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        Self {
            ollama_url: read(OLLAMA_URL_ENV),
            model: read(MODEL_ENV),
        }
    }
}

/// Immutable configuration shared by every component.
#[derive(Debug, Clone)]
pub struct Config {
    pub storage: StorageConfig,
    pub service: ServiceConfig,
    pub model: ModelConfig,
    pub completion: CompletionConfig,
    pub commit: CommitConfig,
    pub training: TrainingConfig,
}

impl Config {
    pub fn defaults(storage: StorageConfig) -> Self {
        Self::from_file(storage, ConfigFile::default())
    }

    /// Resolves storage and config from the process environment.
    pub fn from_env() -> Result<Self> {
        let storage = StorageConfig::from_env()?;
        Self::load(storage, &EnvOverrides::from_env())
    }

    /// Loads config.toml under `storage`. A missing file yields defaults.
    pub fn load(storage: StorageConfig, overrides: &EnvOverrides) -> Result<Self> {
        let path = storage.config_file();
        let file = if path.exists() {
            let content =
                fs_err::read_to_string(&path).map_err(|e| ShellmindError::ConfigMalformed {
                    path: path.clone(),
                    details: e.to_string(),
                })?;
            toml::from_str::<ConfigFile>(&content).map_err(|e| {
                ShellmindError::ConfigMalformed {
                    path: path.clone(),
                    details: e.to_string(),
                }
            })?
        } else {
            ConfigFile::default()
        };

        let mut config = Self::from_file(storage, file);
        config.apply(overrides);
        Ok(config)
    }

    /// Like `load`, but a malformed file degrades to defaults with a warning.
    /// Used on the interactive path where nothing may fail.
    pub fn load_lenient(storage: StorageConfig, overrides: &EnvOverrides) -> Self {
        match Self::load(storage.clone(), overrides) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(error = %err, "Falling back to default configuration");
                let mut config = Self::defaults(storage);
                config.apply(overrides);
                config
            }
        }
    }

    fn from_file(storage: StorageConfig, file: ConfigFile) -> Self {
        Self {
            storage,
            service: file.service,
            model: file.model,
            completion: file.completion,
            commit: file.commit,
            training: file.training,
        }
    }

    fn apply(&mut self, overrides: &EnvOverrides) {
        if let Some(url) = &overrides.ollama_url {
            self.service.url = url.trim_end_matches('/').to_string();
        }
        if let Some(model) = &overrides.model {
            self.model.name = model.clone();
        }
    }
}
