//! Reachability checks and detached launch of the model server.

use std::path::PathBuf;
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::ModelService;
use crate::config::ServiceConfig;
use crate::error::{Result, ShellmindError};
use crate::process;

/// Starts the model server out of process.
pub trait ServiceLauncher: Send + Sync {
    fn binary_available(&self) -> bool;

    /// Launches the server detached. Returns once the process is spawned,
    /// not once it is serving.
    fn launch(&self) -> Result<()>;
}

/// Launches `<binary> serve` in its own session, logging to a file.
pub struct ProcessLauncher {
    binary: String,
    log_file: PathBuf,
}

impl ProcessLauncher {
    pub fn new(binary: impl Into<String>, log_file: PathBuf) -> Self {
        Self {
            binary: binary.into(),
            log_file,
        }
    }
}

impl ServiceLauncher for ProcessLauncher {
    fn binary_available(&self) -> bool {
        process::which(&self.binary).is_some()
    }

    fn launch(&self) -> Result<()> {
        let binary = process::which(&self.binary)
            .ok_or_else(|| ShellmindError::BinaryNotFound(self.binary.clone()))?;
        let pid = process::spawn_detached(
            Command::new(binary).arg("serve"),
            Some(self.log_file.as_path()),
        )?;
        tracing::info!(pid, binary = %self.binary, "Launched model server");
        Ok(())
    }
}

/// Checks and starts the model server. All probes use the sub-second
/// `probe_timeout` from [`ServiceConfig`].
pub struct ServiceProbe {
    service: Arc<dyn ModelService>,
    launcher: Arc<dyn ServiceLauncher>,
    settings: ServiceConfig,
}

impl ServiceProbe {
    pub fn new(
        service: Arc<dyn ModelService>,
        launcher: Arc<dyn ServiceLauncher>,
        settings: ServiceConfig,
    ) -> Self {
        Self {
            service,
            launcher,
            settings,
        }
    }

    pub fn service(&self) -> &Arc<dyn ModelService> {
        &self.service
    }

    pub fn settings(&self) -> &ServiceConfig {
        &self.settings
    }

    pub fn is_reachable(&self) -> bool {
        match self.service.ping(self.settings.probe_timeout()) {
            Ok(()) => true,
            Err(err) => {
                tracing::debug!(error = %err, endpoint = self.service.endpoint(), "Probe failed");
                false
            }
        }
    }

    pub fn binary_available(&self) -> bool {
        self.launcher.binary_available()
    }

    /// Launches the server if its binary exists. Returns false when nothing
    /// was started.
    pub fn launch(&self) -> bool {
        if !self.launcher.binary_available() {
            tracing::info!(binary = %self.settings.binary, "Model server binary not installed");
            return false;
        }
        match self.launcher.launch() {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(error = %err, "Failed to launch model server");
                false
            }
        }
    }

    /// Re-probes up to `attempts` times, sleeping `retry_delay` before each.
    /// Stops early when `cancel` is set.
    pub fn wait_until_reachable(&self, attempts: u32, cancel: &AtomicBool) -> bool {
        for attempt in 1..=attempts {
            if cancel.load(Ordering::Relaxed) {
                return false;
            }
            thread::sleep(self.settings.retry_delay());
            if self.is_reachable() {
                tracing::debug!(attempt, "Model server became reachable");
                return true;
            }
        }
        false
    }

    /// Setup-time variant: waits up to `total` regardless of the configured
    /// attempt cap.
    pub fn wait_for(&self, total: Duration) -> bool {
        let delay = self.settings.retry_delay().max(Duration::from_millis(50));
        let attempts = (total.as_millis() / delay.as_millis()).max(1) as u32;
        self.wait_until_reachable(attempts, &AtomicBool::new(false))
    }
}
