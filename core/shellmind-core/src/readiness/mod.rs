//! Readiness orchestration for the model service.
//!
//! One orchestrator runs per shell session, in a process detached from the
//! shell. It walks the state machine in [`state`] to a terminal state,
//! records every step in the [`StatusLedger`], and publishes exactly one
//! [`Announcement`]. Every failure along the way becomes a state; `run`
//! cannot fail.
//!
//! The orchestrator never trains or imports a model. A missing model is
//! reported and left for the user to fix with `shellmind setup` or
//! `shellmind train`.

pub mod state;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::config::Config;
use crate::error::ShellmindError;
use crate::ledger::StatusLedger;
use crate::registry::ModelRegistry;
use crate::service::{GenerateRequest, ServiceProbe};

pub use state::{Announcement, ReadinessState, StatusRecord};

#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorSettings {
    pub target_model: String,
    /// Re-probes after launching the server.
    pub launch_attempts: u32,
    pub warm_up: bool,
    pub warm_up_timeout: Duration,
}

impl OrchestratorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            target_model: config.model.name.clone(),
            launch_attempts: config.service.launch_attempts,
            warm_up: config.model.warm_up,
            warm_up_timeout: config.model.warm_up_timeout(),
        }
    }
}

pub struct ReadinessOrchestrator {
    probe: ServiceProbe,
    registry: ModelRegistry,
    ledger: StatusLedger,
    settings: OrchestratorSettings,
}

impl ReadinessOrchestrator {
    pub fn new(
        probe: ServiceProbe,
        registry: ModelRegistry,
        ledger: StatusLedger,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            probe,
            registry,
            ledger,
            settings,
        }
    }

    pub fn ledger(&self) -> &StatusLedger {
        &self.ledger
    }

    /// Runs the state machine to a terminal state on the calling thread and
    /// publishes the announcement.
    pub fn run(&self, cancel: &AtomicBool) -> ReadinessState {
        let (terminal, announcement) = self.advance(cancel);
        if let Err(err) = self.ledger.announce(announcement) {
            tracing::warn!(error = %err, "Failed to publish announcement");
        }
        tracing::info!(
            session = self.ledger.session_id(),
            state = %terminal,
            %announcement,
            "Readiness settled"
        );
        terminal
    }

    /// Runs on a dedicated thread. The caller may drop the handle without
    /// joining it.
    pub fn spawn(self) -> OrchestratorHandle {
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancel);
        let handle = thread::spawn(move || self.run(&flag));
        OrchestratorHandle { cancel, handle }
    }

    fn advance(&self, cancel: &AtomicBool) -> (ReadinessState, Announcement) {
        use ReadinessState::*;

        self.enter(CheckingService);
        if !self.probe.is_reachable() {
            if !self.probe.launch() {
                self.enter(Degraded);
                return (Degraded, Announcement::FallbackMode);
            }
            self.enter(ServiceStarting);
            if !self
                .probe
                .wait_until_reachable(self.settings.launch_attempts, cancel)
            {
                self.enter(Degraded);
                return (Degraded, Announcement::FallbackMode);
            }
        }
        self.enter(ServiceRunning);

        self.enter(CheckingModel);
        let model = match self.registry.find(&self.settings.target_model) {
            Ok(Some(model)) => model,
            Ok(None) => {
                self.enter(ModelMissing);
                self.enter(Unavailable);
                return (Unavailable, Announcement::ModelNotFound);
            }
            Err(err) => {
                tracing::warn!(error = %err, "Model listing failed");
                self.enter(Degraded);
                return (Degraded, Announcement::FallbackMode);
            }
        };
        self.enter(ModelFound);

        if !self.settings.warm_up {
            self.enter(ModelReady);
            return (ModelReady, Announcement::ModelReady);
        }

        self.enter(LoadingModel);
        match self.warm_up(&model.name) {
            Ok(()) => {
                self.enter(ModelReady);
                (ModelReady, Announcement::ModelReady)
            }
            // Still loading into memory; it will serve shortly.
            Err(ShellmindError::Timeout(timeout)) => {
                tracing::info!(?timeout, "Warm-up timed out; treating model as ready");
                self.enter(ModelReady);
                (ModelReady, Announcement::ModelReady)
            }
            Err(err) => {
                tracing::warn!(error = %err, "Warm-up failed");
                self.enter(Unavailable);
                (Unavailable, Announcement::FallbackMode)
            }
        }
    }

    fn warm_up(&self, model: &str) -> crate::error::Result<()> {
        let request = GenerateRequest {
            model: model.to_string(),
            prompt: "ls".to_string(),
            system: None,
            max_tokens: 1,
            temperature: 0.0,
            top_p: 1.0,
            timeout: self.settings.warm_up_timeout,
        };
        self.probe.service().generate(&request).map(|_| ())
    }

    fn enter(&self, state: ReadinessState) {
        if let Err(err) = self.ledger.record(state) {
            tracing::warn!(error = %err, state = %state, "Failed to record readiness state");
        }
    }
}

/// Handle to an orchestrator thread.
pub struct OrchestratorHandle {
    cancel: Arc<AtomicBool>,
    handle: JoinHandle<ReadinessState>,
}

impl OrchestratorHandle {
    /// Asks the orchestrator to stop waiting for the service. It still
    /// settles into a terminal state.
    pub fn cancel(&self) {
        self.cancel
            .store(true, std::sync::atomic::Ordering::Relaxed);
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Blocks until the orchestrator settles. Returns `None` if its thread
    /// panicked.
    pub fn join(self) -> Option<ReadinessState> {
        self.handle.join().ok()
    }
}
