//! Shell session lifecycle: start, announce, orchestrate.
//!
//! ## Lifecycle
//!
//! 1. `session-start` (once per interactive shell) resets the session's
//!    ledger, prints the session id and spawns `orchestrate` detached
//! 2. `orchestrate` holds the session's pid lock, runs the readiness state
//!    machine to a terminal state and publishes one announcement
//! 3. `precmd` (every prompt until it prints something) takes the
//!    announcement, so it is shown exactly once

use std::process::Command;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use shellmind_core::process::spawn_detached;
use shellmind_core::{
    new_session_id, sweep_stale_sessions, Announcement, AnnouncementRenderer, Config,
    ModelRegistry, OllamaClient, OrchestratorSettings, ProcessLauncher, ReadinessOrchestrator,
    ReadinessState, Result, ServiceProbe, ShellmindError, StatusLedger,
};

const STALE_SESSION_AGE: Duration = Duration::from_secs(24 * 60 * 60);
const ORCHESTRATOR_LOG: &str = "orchestrator.log";

pub fn start(config: &Config, session: Option<String>) -> Result<()> {
    let session_id = session
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(new_session_id);
    // The shell captures this even if the rest fails; completion then runs
    // with unknown readiness.
    println!("{}", session_id);

    config.storage.ensure_dirs()?;
    let ledger = StatusLedger::new(config.storage.clone(), session_id.as_str());
    ledger.reset()?;
    sweep_stale_sessions(&config.storage, STALE_SESSION_AGE);

    let pid = launch_detached(config, &session_id)?;
    tracing::info!(session = %session_id, pid, "Spawned readiness orchestrator");
    Ok(())
}

/// Spawns `shellmind orchestrate --session <id>` in its own session and
/// returns without waiting for it.
pub fn launch_detached(config: &Config, session_id: &str) -> Result<u32> {
    let exe = std::env::current_exe().map_err(|e| ShellmindError::Io {
        context: "locating shellmind binary".to_string(),
        source: e,
    })?;
    let log = config.storage.logs_dir().join(ORCHESTRATOR_LOG);
    spawn_detached(
        Command::new(exe).args(["orchestrate", "--session", session_id]),
        Some(log.as_path()),
    )
}

pub fn precmd(config: &Config, session: &str) {
    if session.is_empty() {
        return;
    }
    let mut renderer =
        AnnouncementRenderer::new(StatusLedger::new(config.storage.clone(), session));
    if let Some(message) = renderer.render() {
        println!("{}", message);
    }
}

pub fn orchestrate(config: &Config, session: &str) {
    let ledger = StatusLedger::new(config.storage.clone(), session);
    let _lock = match ledger.acquire_orchestrator_lock(std::process::id()) {
        Ok(lock) => lock,
        Err(e) => {
            tracing::info!(error = %e, session, "Orchestrator not started");
            return;
        }
    };

    let client = match OllamaClient::new(&config.service) {
        Ok(client) => client,
        Err(e) => {
            tracing::error!(error = %e, "Could not build model client");
            settle_degraded(&ledger);
            return;
        }
    };
    let launcher = ProcessLauncher::new(
        config.service.binary.clone(),
        config.storage.service_log_file(),
    );
    let probe = ServiceProbe::new(
        Arc::new(client),
        Arc::new(launcher),
        config.service.clone(),
    );
    let registry = ModelRegistry::from_probe(&probe);
    let orchestrator = ReadinessOrchestrator::new(
        probe,
        registry,
        ledger,
        OrchestratorSettings::from_config(config),
    );
    orchestrator.run(&AtomicBool::new(false));
}

fn settle_degraded(ledger: &StatusLedger) {
    for state in [ReadinessState::CheckingService, ReadinessState::Degraded] {
        if let Err(e) = ledger.record(state) {
            tracing::warn!(error = %e, %state, "Failed to record readiness state");
        }
    }
    if let Err(e) = ledger.announce(Announcement::FallbackMode) {
        tracing::warn!(error = %e, "Failed to publish announcement");
    }
}
