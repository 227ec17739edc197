//! Setup validation and one-shot provisioning.
//!
//! `SetupChecker` answers "is everything in place?" without changing
//! anything. `run_setup` does the work: start the server, pull the base
//! model, import the fine-tuned one. Both are only reached from explicit
//! CLI commands.

use std::time::Duration;

use serde::Serialize;

use crate::config::Config;
use crate::error::{Result, ShellmindError};
use crate::process::which;
use crate::registry::ModelRegistry;
use crate::service::ServiceProbe;
use crate::training::{generate_training_data, import_model, ModelImport};

/// How long `setup` waits for a freshly launched server.
const SERVICE_START_WAIT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DependencyStatus {
    pub name: String,
    pub required: bool,
    pub found: bool,
    pub path: Option<String>,
    pub install_hint: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SetupStatus {
    pub dependencies: Vec<DependencyStatus>,
    pub service_url: String,
    pub service_reachable: bool,
    pub model: String,
    /// `None` when the server could not be asked.
    pub model_present: Option<bool>,
    pub all_ready: bool,
    pub blocking_reason: Option<String>,
}

pub struct SetupChecker<'a> {
    config: &'a Config,
    probe: &'a ServiceProbe,
}

impl<'a> SetupChecker<'a> {
    pub fn new(config: &'a Config, probe: &'a ServiceProbe) -> Self {
        Self { config, probe }
    }

    pub fn check_setup_status(&self) -> SetupStatus {
        let dependencies = vec![self.check_service_binary(), self.check_git()];
        let service_reachable = self.probe.is_reachable();
        let model = self.config.model.name.clone();
        let model_present = if service_reachable {
            match ModelRegistry::from_probe(self.probe).contains(&model) {
                Ok(present) => Some(present),
                Err(err) => {
                    tracing::warn!(error = %err, "Could not list models");
                    None
                }
            }
        } else {
            None
        };

        let missing_required_dep = dependencies.iter().find(|d| d.required && !d.found);
        let blocking_reason = if let Some(dep) = missing_required_dep {
            Some(format!("{} is required but not installed", dep.name))
        } else if !service_reachable {
            Some(format!(
                "Model server not reachable at {}",
                self.config.service.url
            ))
        } else if model_present != Some(true) {
            Some(format!("Model {} not found (run: shellmind setup)", model))
        } else {
            None
        };

        SetupStatus {
            dependencies,
            service_url: self.config.service.url.clone(),
            service_reachable,
            model,
            model_present,
            all_ready: blocking_reason.is_none(),
            blocking_reason,
        }
    }

    fn check_service_binary(&self) -> DependencyStatus {
        let binary = &self.config.service.binary;
        let path = which(binary).map(|p| p.to_string_lossy().to_string());
        DependencyStatus {
            name: binary.clone(),
            required: true,
            found: self.probe.binary_available(),
            path,
            install_hint: Some("https://ollama.com/download".to_string()),
        }
    }

    fn check_git(&self) -> DependencyStatus {
        let path = which("git").map(|p| p.to_string_lossy().to_string());
        DependencyStatus {
            name: "git".to_string(),
            required: false,
            found: path.is_some(),
            path,
            install_hint: Some("Needed for branch context and commit messages".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupReport {
    pub launched_service: bool,
    pub pulled_base: bool,
    pub created_model: bool,
}

/// Brings the system to a state where the orchestrator will reach
/// `ModelReady`. Each step is skipped when already satisfied.
pub fn run_setup(
    config: &Config,
    probe: &ServiceProbe,
    importer: &dyn ModelImport,
) -> Result<SetupReport> {
    config.storage.ensure_dirs()?;

    if !probe.binary_available() {
        return Err(ShellmindError::BinaryNotFound(
            config.service.binary.clone(),
        ));
    }

    let mut report = SetupReport {
        launched_service: false,
        pulled_base: false,
        created_model: false,
    };

    if !probe.is_reachable() {
        if !probe.launch() {
            return Err(ShellmindError::CommandFailed {
                command: format!("{} serve", config.service.binary),
                details: "launch failed".to_string(),
            });
        }
        report.launched_service = true;
        if !probe.wait_for(SERVICE_START_WAIT) {
            return Err(ShellmindError::ServiceUnreachable {
                url: config.service.url.clone(),
                details: format!("not serving after {:?}", SERVICE_START_WAIT),
            });
        }
    }

    let registry = ModelRegistry::from_probe(probe);
    if registry.contains(&config.model.name)? {
        tracing::info!(model = %config.model.name, "Model already present");
        return Ok(report);
    }

    if !registry.contains(&config.model.base_model)? {
        tracing::info!(model = %config.model.base_model, "Pulling base model");
        importer.pull(&config.model.base_model)?;
        report.pulled_base = true;
    }

    if !config.storage.training_table_file().exists() {
        generate_training_data(config)?;
    }
    import_model(config, importer)?;
    report.created_model = true;

    if !registry.contains(&config.model.name)? {
        return Err(ShellmindError::ModelAbsent(config.model.name.clone()));
    }
    Ok(report)
}
