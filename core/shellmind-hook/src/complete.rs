//! Keystroke completion.
//!
//! ## Usage
//!
//! ```bash
//! shellmind complete --session "$_SHELLMIND_SESSION" --recent="$(fc -ln -1)" -- "git comm"
//! ```
//!
//! Prints the suggested full command, or nothing. Static-table hits never
//! touch the network or run git. `--recent` carries the commands the user
//! last ran; they feed the context fingerprint.

use std::path::PathBuf;
use std::sync::Arc;

use shellmind_core::{
    recent_commands, CompletionContext, CompletionResolver, Config, OllamaClient, StatusLedger,
};

pub struct Request<'a> {
    pub buffer: &'a str,
    pub session: Option<&'a str>,
    pub cwd: Option<PathBuf>,
    pub recent: &'a [String],
}

pub fn run(config: &Config, request: Request<'_>) {
    if let Some(text) = suggest(config, request) {
        println!("{}", text);
    }
}

fn suggest(config: &Config, request: Request<'_>) -> Option<String> {
    let Request {
        buffer,
        session,
        cwd,
        recent,
    } = request;
    let service = match OllamaClient::new(&config.service) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            tracing::warn!(error = %e, "Could not build model client");
            return None;
        }
    };
    let readiness = session
        .filter(|s| !s.is_empty())
        .and_then(|s| StatusLedger::new(config.storage.clone(), s).current_state());

    let mut resolver = CompletionResolver::from_config(config, service).with_readiness(readiness);

    let cwd = cwd
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));
    let recent = recent_commands(recent, config.completion.fingerprint_depth);
    let context = CompletionContext::detect(&cwd, recent, config.completion.git_timeout());

    let suggestion = resolver.resolve(buffer, &context)?;
    tracing::debug!(
        buffer,
        suggestion = %suggestion.text,
        source = ?suggestion.source,
        "Completion resolved"
    );
    Some(suggestion.text)
}
