//! `status` and `models`: read-only views for the user.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use serde::Serialize;
use shellmind_core::{
    Config, ModelRegistry, OllamaClient, ProcessLauncher, ReadinessState, Result, ServiceProbe,
    SetupChecker, SetupStatus, StatusLedger,
};

#[derive(Debug, Serialize)]
struct SessionReport {
    id: String,
    state: Option<ReadinessState>,
    since: Option<String>,
    transitions: usize,
}

#[derive(Debug, Serialize)]
struct StatusReport {
    #[serde(flatten)]
    setup: SetupStatus,
    session: Option<SessionReport>,
}

pub(crate) fn build_probe(config: &Config) -> Result<ServiceProbe> {
    let client = OllamaClient::new(&config.service)?;
    let launcher = ProcessLauncher::new(
        config.service.binary.clone(),
        config.storage.service_log_file(),
    );
    Ok(ServiceProbe::new(
        Arc::new(client),
        Arc::new(launcher),
        config.service.clone(),
    ))
}

pub fn run(config: &Config, session: Option<&str>, json: bool) -> Result<()> {
    let probe = build_probe(config)?;
    let setup = SetupChecker::new(config, &probe).check_setup_status();
    let session = session
        .filter(|s| !s.is_empty())
        .map(|id| session_report(config, id));
    let report = StatusReport { setup, session };

    if json {
        let text = serde_json::to_string_pretty(&report).map_err(|e| {
            shellmind_core::ShellmindError::Json {
                context: "serializing status".to_string(),
                source: e,
            }
        })?;
        println!("{}", text);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn session_report(config: &Config, id: &str) -> SessionReport {
    let ledger = StatusLedger::new(config.storage.clone(), id);
    let current = ledger.current();
    SessionReport {
        id: id.to_string(),
        state: current.map(|r| r.state),
        since: current
            .and_then(|r| Utc.timestamp_opt(r.timestamp, 0).single())
            .map(|t| t.to_rfc3339()),
        transitions: ledger.transitions().len(),
    }
}

fn print_report(report: &StatusReport) {
    let setup = &report.setup;
    for dep in &setup.dependencies {
        let mark = if dep.found { "ok" } else { "missing" };
        match (&dep.path, dep.found) {
            (Some(path), true) => println!("{:<8} {} ({})", mark, dep.name, path),
            _ => println!(
                "{:<8} {}{}",
                mark,
                dep.name,
                dep.install_hint
                    .as_deref()
                    .map(|h| format!(" - {}", h))
                    .unwrap_or_default()
            ),
        }
    }
    let reachable = if setup.service_reachable { "ok" } else { "down" };
    println!("{:<8} server {}", reachable, setup.service_url);
    let model = match setup.model_present {
        Some(true) => "ok",
        Some(false) => "missing",
        None => "unknown",
    };
    println!("{:<8} model {}", model, setup.model);

    if let Some(session) = &report.session {
        let state = session
            .state
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        println!(
            "session  {} {}{}",
            session.id,
            state,
            session
                .since
                .as_deref()
                .map(|s| format!(" since {}", s))
                .unwrap_or_default()
        );
    }

    match &setup.blocking_reason {
        Some(reason) => println!("\nNot ready: {}", reason),
        None => println!("\nReady"),
    }
}

pub fn models(config: &Config) -> Result<()> {
    let probe = build_probe(config)?;
    let registry = ModelRegistry::from_probe(&probe);
    for model in registry.list()? {
        let marker = if shellmind_core::registry::model_matches(&model.name, &config.model.name) {
            "*"
        } else {
            " "
        };
        let size = model
            .size
            .map(|bytes| format!("{:.1} GB", bytes as f64 / 1_000_000_000.0))
            .unwrap_or_default();
        println!("{} {:<40} {}", marker, model.name, size);
    }
    Ok(())
}
