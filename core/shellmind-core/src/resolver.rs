//! Keystroke-triggered completion under a hard deadline.
//!
//! ```text
//! buffer ──► too short? ──► static table ──► cache ──► readiness gate ──► model ──► clean + validate
//!               │               │              │             │               │              │
//!              None          Suggestion     Suggestion      None            None      accept: cache,
//!                                                                                     history, Suggestion
//! ```
//!
//! Stages run cheapest first and the first hit wins. The model is called at
//! most once per request, with whatever is left of the deadline as its
//! timeout, and every failure past that point is a plain `None`: the shell
//! falls back to native completion.

use std::sync::Arc;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::cache::CacheStore;
use crate::config::Config;
use crate::context::CompletionContext;
use crate::history::{HistoryEntry, HistoryLedger};
use crate::readiness::ReadinessState;
use crate::service::{GenerateRequest, ModelService};
use crate::table::TrainingTable;

const SYSTEM_PROMPT: &str = "You are a shell command completion engine. \
Reply with exactly one complete command that begins with the user's partial input. \
No explanations, no markdown, no alternatives.";

/// Lines a chatty model puts before the actual command.
static EXPLANATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(here\b|sure\b|certainly\b|to complete\b|note:|this\b|the command\b|i\b|you can\b|try\b)")
        .expect("valid regex")
});

static LIST_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+[.)]|[-*•])\s+").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionSource {
    StaticTable,
    Cache,
    #[default]
    Model,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    pub text: String,
    pub source: SuggestionSource,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolverSettings {
    pub min_prefix_len: usize,
    pub deadline: Duration,
    /// Cap on the model call itself, within what is left of `deadline`.
    pub model_timeout: Duration,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

impl ResolverSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            min_prefix_len: config.completion.min_prefix_len,
            deadline: config.completion.deadline(),
            model_timeout: config.completion.model_timeout(),
            model: config.model.name.clone(),
            max_tokens: config.model.max_tokens,
            temperature: config.model.temperature,
            top_p: config.model.top_p,
        }
    }
}

pub struct CompletionResolver {
    table: TrainingTable,
    cache: CacheStore,
    history: HistoryLedger,
    service: Arc<dyn ModelService>,
    readiness: Option<ReadinessState>,
    settings: ResolverSettings,
}

impl CompletionResolver {
    pub fn new(
        table: TrainingTable,
        cache: CacheStore,
        history: HistoryLedger,
        service: Arc<dyn ModelService>,
        settings: ResolverSettings,
    ) -> Self {
        Self {
            table,
            cache,
            history,
            service,
            readiness: None,
            settings,
        }
    }

    /// Opens the on-disk table, cache snapshot and history named by `config`.
    pub fn from_config(config: &Config, service: Arc<dyn ModelService>) -> Self {
        let table = TrainingTable::load(&config.storage.training_table_file());
        let cache = if config.completion.persist_cache {
            CacheStore::with_snapshot(config.completion.cache_ttl(), config.storage.cache_file())
        } else {
            CacheStore::new(config.completion.cache_ttl())
        };
        let history = HistoryLedger::open(
            config.storage.history_file(),
            config.completion.history_capacity,
        );
        Self::new(
            table,
            cache,
            history,
            service,
            ResolverSettings::from_config(config),
        )
    }

    /// Latest readiness state of the session, if known. Unknown means the
    /// model is tried.
    pub fn with_readiness(mut self, state: Option<ReadinessState>) -> Self {
        self.readiness = state;
        self
    }

    pub fn history(&self) -> &HistoryLedger {
        &self.history
    }

    pub fn resolve(&mut self, buffer: &str, context: &CompletionContext) -> Option<Suggestion> {
        let started = Instant::now();

        if buffer.trim().chars().count() < self.settings.min_prefix_len {
            return None;
        }

        if let Some(text) = self.table.lookup(buffer) {
            return Some(Suggestion {
                text: text.to_string(),
                source: SuggestionSource::StaticTable,
            });
        }

        let fingerprint = context.fingerprint();
        if let Some(text) = self.cache.get(buffer, fingerprint.as_str()) {
            return Some(Suggestion {
                text,
                source: SuggestionSource::Cache,
            });
        }

        if let Some(state) = self.readiness {
            if !state.allows_model_calls() {
                tracing::debug!(state = %state, "Model gate closed");
                return None;
            }
        }

        let remaining = self.settings.deadline.checked_sub(started.elapsed())?;
        if remaining.is_zero() {
            return None;
        }
        let request = GenerateRequest {
            model: self.settings.model.clone(),
            prompt: self.build_prompt(buffer, context),
            system: Some(SYSTEM_PROMPT.to_string()),
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
            top_p: self.settings.top_p,
            timeout: remaining.min(self.settings.model_timeout),
        };

        let raw = match self.service.generate(&request) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::debug!(error = %err, "Model completion failed");
                return None;
            }
        };
        let Some(text) = accept_response(&raw, buffer) else {
            tracing::debug!(response = %raw.trim(), "Rejected model response");
            return None;
        };

        self.cache.insert(buffer, fingerprint.as_str(), &text);
        self.cache.flush();

        let entry = HistoryEntry {
            timestamp: chrono::Utc::now().timestamp(),
            prefix: buffer.to_string(),
            suggestion: text.clone(),
            fingerprint: fingerprint.to_string(),
            cwd: context.cwd.display().to_string(),
            source: SuggestionSource::Model,
        };
        if let Err(err) = self.history.append(entry) {
            tracing::warn!(error = %err, "History append failed");
        }

        Some(Suggestion {
            text,
            source: SuggestionSource::Model,
        })
    }

    fn build_prompt(&self, buffer: &str, context: &CompletionContext) -> String {
        let mut prompt = format!("Complete this shell command: {}\n", buffer);

        let described = context.describe();
        if !described.is_empty() {
            prompt.push_str(&format!("Context: {}\n", described));
        }
        if !context.recent.is_empty() {
            prompt.push_str(&format!("Recent commands: {}\n", context.recent.join("; ")));
        }
        let frequent: Vec<String> = self
            .history
            .most_frequent(5)
            .into_iter()
            .map(|(head, _)| head)
            .collect();
        if !frequent.is_empty() {
            prompt.push_str(&format!("Frequently used: {}\n", frequent.join(", ")));
        }
        let accepted = self.history.recent_sequence(3);
        if !accepted.is_empty() {
            prompt.push_str(&format!("Recently accepted: {}\n", accepted.join("; ")));
        }
        let similar = self.history.similar(buffer, 3);
        if !similar.is_empty() {
            prompt.push_str(&format!("Similar past commands: {}\n", similar.join("; ")));
        }
        prompt.push_str("Completed command:");
        prompt
    }
}

/// Extracts the command from a model reply and applies the acceptance rules:
/// its first word must start with the buffer's first word (equal it, once the
/// user has typed past it), and it must differ from and be strictly longer
/// than the buffer.
pub fn accept_response(raw: &str, buffer: &str) -> Option<String> {
    let candidate = clean_response(raw)?;
    let typed = buffer.trim();
    let head = typed.split_whitespace().next()?;
    let first = candidate.split_whitespace().next()?;

    let head_complete = buffer.trim_start().len() > head.len();
    let same_command = if head_complete {
        first == head
    } else {
        first.starts_with(head)
    };
    if !same_command {
        return None;
    }
    if candidate == typed || candidate.len() <= typed.len() {
        return None;
    }
    Some(candidate)
}

/// First line of `raw` that looks like a command.
fn clean_response(raw: &str) -> Option<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.starts_with("```"))
        .map(|line| line.trim_start_matches("$ ").trim_matches('`').trim())
        .find(|line| {
            !line.is_empty()
                && !line.ends_with(':')
                && !EXPLANATION.is_match(line)
                && !LIST_MARKER.is_match(line)
        })
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::VcsState;
    use crate::testing::{StubReply, StubService};
    use std::path::Path;

    fn settings() -> ResolverSettings {
        ResolverSettings {
            min_prefix_len: 2,
            deadline: Duration::from_secs(3),
            model_timeout: Duration::from_millis(2500),
            model: "zsh-assistant".to_string(),
            max_tokens: 64,
            temperature: 0.1,
            top_p: 0.9,
        }
    }

    fn resolver(root: &Path, service: Arc<StubService>) -> CompletionResolver {
        CompletionResolver::new(
            TrainingTable::seed(),
            CacheStore::new(Duration::from_secs(3600)),
            HistoryLedger::open(root.join("history.jsonl"), 100),
            service,
            settings(),
        )
    }

    fn context(root: &Path) -> CompletionContext {
        CompletionContext::detect(root, Vec::new(), Duration::from_millis(100))
            .with_vcs(VcsState::default())
    }

    #[test]
    fn short_buffer_returns_none_without_network() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let service = Arc::new(StubService::reachable().with_text("g status"));
        let mut resolver = resolver(tmp.path(), service.clone());
        assert_eq!(resolver.resolve("g", &context(tmp.path())), None);
        assert_eq!(resolver.resolve(" ", &context(tmp.path())), None);
        assert_eq!(service.network_calls(), 0);
    }

    #[test]
    fn static_table_hit_is_exact_fast_and_offline() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let service = Arc::new(StubService::reachable().with_text("git status"));
        let mut resolver = resolver(tmp.path(), service.clone());
        let ctx = context(tmp.path());

        let started = Instant::now();
        let suggestion = resolver.resolve("git comm", &ctx).expect("suggestion");
        assert!(started.elapsed() < Duration::from_millis(5));
        assert_eq!(suggestion.text, "git commit -m \"commit message\"");
        assert_eq!(suggestion.source, SuggestionSource::StaticTable);
        assert_eq!(service.network_calls(), 0);
        assert!(resolver.history().is_empty());
    }

    #[test]
    fn accepted_model_reply_is_cached_and_recorded() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let service = Arc::new(StubService::reachable().with_text("rsync -avz src/ backup/"));
        let mut resolver = resolver(tmp.path(), service.clone());
        let ctx = context(tmp.path());

        let first = resolver.resolve("rsync -a", &ctx).expect("suggestion");
        assert_eq!(first.source, SuggestionSource::Model);
        assert_eq!(service.generate_calls(), 1);

        let second = resolver.resolve("rsync -a", &ctx).expect("suggestion");
        assert_eq!(second.source, SuggestionSource::Cache);
        assert_eq!(first.text, second.text);
        assert_eq!(service.generate_calls(), 1);
        assert_eq!(resolver.history().len(), 1);
    }

    #[test]
    fn echo_or_truncated_reply_is_rejected() {
        let tmp = tempfile::tempdir().expect("temp dir");
        for reply in ["rsync -a", "rsync", ""] {
            let service = Arc::new(StubService::reachable().with_text(reply));
            let mut resolver = resolver(tmp.path(), service);
            assert_eq!(resolver.resolve("rsync -a", &context(tmp.path())), None);
        }
    }

    #[test]
    fn failed_call_is_not_retried() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let service = Arc::new(
            StubService::reachable().with_replies(vec![
                StubReply::Timeout,
                StubReply::Text("rsync -avz a b".to_string()),
            ]),
        );
        let mut resolver = resolver(tmp.path(), service.clone());
        assert_eq!(resolver.resolve("rsync -a", &context(tmp.path())), None);
        assert_eq!(service.generate_calls(), 1);
        assert!(resolver.history().is_empty());
    }

    #[test]
    fn closed_gate_skips_model() {
        let tmp = tempfile::tempdir().expect("temp dir");
        for state in [
            ReadinessState::Degraded,
            ReadinessState::ModelMissing,
            ReadinessState::Unavailable,
        ] {
            let service = Arc::new(StubService::reachable().with_text("rsync -avz a b"));
            let mut resolver = resolver(tmp.path(), service.clone()).with_readiness(Some(state));
            assert_eq!(resolver.resolve("rsync -a", &context(tmp.path())), None);
            assert_eq!(service.network_calls(), 0);
        }
    }

    #[test]
    fn prompt_carries_history_signals() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let service = Arc::new(StubService::reachable().with_text("rsync -avz a b"));
        let mut resolver = resolver(tmp.path(), service.clone());
        let ctx = CompletionContext::detect(
            tmp.path(),
            vec!["cd backups".to_string()],
            Duration::from_millis(100),
        )
        .with_vcs(VcsState {
            branch: Some("main".to_string()),
            dirty: false,
        });

        resolver.resolve("rsync -a", &ctx).expect("suggestion");
        let prompt = &service.prompts()[0];
        assert!(prompt.starts_with("Complete this shell command: rsync -a"));
        assert!(prompt.contains("git branch main (clean)"));
        assert!(prompt.contains("Recent commands: cd backups"));
    }

    #[test]
    fn prompt_carries_recently_accepted_suggestions() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let service = Arc::new(StubService::reachable().with_replies(vec![
            StubReply::Text("rsync -avz a b".to_string()),
            StubReply::Text("rsync -rv c d".to_string()),
        ]));
        let mut resolver = resolver(tmp.path(), service.clone());

        resolver.resolve("rsync -a", &context(tmp.path())).expect("first");
        resolver.resolve("rsync -r", &context(tmp.path())).expect("second");
        let prompts = service.prompts();
        assert!(!prompts[0].contains("Recently accepted"));
        assert!(prompts[1].contains("Recently accepted: rsync -avz a b"));
    }

    #[test]
    fn cleaning_skips_chatter_and_fences() {
        let raw = "Sure! Here is the command:\n```bash\n$ docker build -t app .\n```\n";
        assert_eq!(
            accept_response(raw, "docker bu").as_deref(),
            Some("docker build -t app .")
        );
        let listed = "1. git stash pop\n`git stash list`";
        assert_eq!(
            accept_response(listed, "git sta").as_deref(),
            Some("git stash list")
        );
    }

    #[test]
    fn reply_for_another_command_is_rejected() {
        assert_eq!(accept_response("ls -la /tmp", "docker ps"), None);
        assert_eq!(accept_response("gitk --all", "git lo"), None);
    }

    #[test]
    fn partial_first_word_is_completed() {
        assert_eq!(
            accept_response("terraform plan", "terraf").as_deref(),
            Some("terraform plan")
        );
        assert_eq!(
            accept_response("kubectl get pods", "kubect").as_deref(),
            Some("kubectl get pods")
        );
        assert_eq!(
            accept_response("./scripts/deploy.sh staging", "./scr").as_deref(),
            Some("./scripts/deploy.sh staging")
        );
        assert_eq!(accept_response("make build", "terraf"), None);
    }

    #[test]
    fn partial_first_word_resolves_through_model() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let service = Arc::new(StubService::reachable().with_text("terraform plan"));
        let mut resolver = resolver(tmp.path(), service.clone());
        let suggestion = resolver
            .resolve("terraf", &context(tmp.path()))
            .expect("suggestion");
        assert_eq!(suggestion.text, "terraform plan");
        assert_eq!(suggestion.source, SuggestionSource::Model);
    }
}
