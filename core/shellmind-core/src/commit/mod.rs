//! Commit message synthesis.
//!
//! ```text
//! AnalyzeDiff ──► Synthesize ──► Validate ──► Accept
//!                     ▲              │
//!                     └── Retry ≤ K ─┤ (rejection reason fed back)
//!                                    └──► Fallback (template from the diff)
//! ```
//!
//! The model only ever proposes. A proposal reaches the user only after it
//! passes [`validate`]; when every attempt is rejected the deterministic
//! template in [`fallback_candidate`] is used instead, so the feature never
//! fails once a diff exists.

pub mod diff;

use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::Config;
use crate::error::{Result, ShellmindError};
use crate::service::{GenerateRequest, ModelService};

pub use diff::{analyze_diff, collect, DiffOrigin, DiffSource, DiffSummary, FileChange, FileStatus, GitDiffSource};

pub const CONVENTIONAL_TYPES: &[&str] = &[
    "feat", "fix", "docs", "style", "refactor", "perf", "test", "build", "ci", "chore",
];

/// Subjects (or whole messages) that say nothing.
const DENYLIST: &[&str] = &[
    "commit message",
    "message",
    "wip",
    "update",
    "updates",
    "changes",
    "update files",
    "update code",
    "fix",
    "feat",
    "chore",
    "misc",
];

const MAX_SUBJECT_CHARS: usize = 72;
const MAX_PROMPT_FILES: usize = 20;

static HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z]+)(?:\([^)]*\))?!?:\s*(.*)$").expect("valid regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitCandidate {
    pub message: String,
    pub conventional_type: String,
}

impl CommitCandidate {
    /// Message text after the `type(scope):` header.
    pub fn subject(&self) -> &str {
        HEADER
            .captures(&self.message)
            .and_then(|c| c.get(2))
            .map(|m| m.as_str())
            .unwrap_or(&self.message)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommitSettings {
    pub model: String,
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub min_words: usize,
    pub timeout: Duration,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl CommitSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.model.name.clone(),
            max_retries: config.commit.max_retries,
            min_words: config.commit.min_words,
            timeout: config.commit.timeout(),
            max_tokens: config.commit.max_tokens,
            temperature: config.model.temperature,
        }
    }
}

pub struct CommitMessageSynthesizer {
    service: Arc<dyn ModelService>,
    settings: CommitSettings,
}

impl CommitMessageSynthesizer {
    pub fn new(service: Arc<dyn ModelService>, settings: CommitSettings) -> Self {
        Self { service, settings }
    }

    /// Collects the diff and produces a message. `Ok(None)` means there is
    /// nothing to commit; `Err` only when the diff itself cannot be read.
    pub fn synthesize(
        &self,
        source: &dyn DiffSource,
        project_context: &str,
    ) -> Result<Option<CommitCandidate>> {
        let Some(summary) = collect(source)? else {
            return Ok(None);
        };
        Ok(Some(self.from_summary(&summary, project_context)))
    }

    /// Generate-validate-retry over an analyzed diff. Always returns a
    /// candidate.
    pub fn from_summary(&self, summary: &DiffSummary, project_context: &str) -> CommitCandidate {
        let mut rejection: Option<String> = None;

        for attempt in 0..=self.settings.max_retries {
            let request = GenerateRequest {
                model: self.settings.model.clone(),
                prompt: build_prompt(
                    summary,
                    project_context,
                    self.settings.min_words,
                    rejection.as_deref(),
                ),
                system: None,
                max_tokens: self.settings.max_tokens,
                temperature: self.settings.temperature,
                top_p: 0.9,
                timeout: self.settings.timeout,
            };

            match self.service.generate(&request) {
                Ok(raw) => match validate(&raw, self.settings.min_words) {
                    Ok(candidate) => {
                        tracing::debug!(attempt, message = %candidate.message, "Accepted commit message");
                        return candidate;
                    }
                    Err(err) => {
                        tracing::debug!(attempt, error = %err, "Rejected commit message");
                        rejection = Some(err.to_string());
                    }
                },
                Err(err) if err.is_unreachable() => {
                    tracing::info!(error = %err, "Model unavailable; using template");
                    break;
                }
                Err(err) => {
                    tracing::debug!(attempt, error = %err, "Commit generation failed");
                    rejection = Some("the previous reply was unusable".to_string());
                }
            }
        }

        fallback_candidate(summary)
    }
}

/// Parses a model reply into a candidate, or says why it is unacceptable.
pub fn validate(raw: &str, min_words: usize) -> Result<CommitCandidate> {
    let Some(line) = first_message_line(raw) else {
        return Err(ShellmindError::ValidationRejected("empty subject".to_string()));
    };

    let (kind, subject) = match HEADER.captures(&line) {
        Some(caps) if is_conventional(&caps[1].to_lowercase()) => {
            (caps[1].to_lowercase(), caps[2].trim().to_string())
        }
        _ => (infer_type(&line).to_string(), line.clone()),
    };

    if subject.is_empty() {
        return Err(ShellmindError::ValidationRejected("empty subject".to_string()));
    }
    let normalized = subject
        .trim_end_matches(['.', '!'])
        .trim()
        .to_lowercase();
    if DENYLIST.contains(&normalized.as_str())
        || DENYLIST.contains(&line.to_lowercase().as_str())
        || normalized.contains("commit message")
        || (normalized.contains('<') && normalized.contains('>'))
    {
        return Err(ShellmindError::ValidationRejected(format!(
            "\"{}\" is a placeholder, not a description",
            subject
        )));
    }
    let words = distinct_words(&subject);
    if words < min_words {
        return Err(ShellmindError::ValidationRejected(format!(
            "subject has {} distinct words, need at least {}",
            words, min_words
        )));
    }

    Ok(CommitCandidate {
        message: truncate_subject(&format!("{}: {}", kind, subject)),
        conventional_type: kind,
    })
}

fn first_message_line(raw: &str) -> Option<String> {
    raw.lines()
        .map(str::trim)
        .filter(|l| !l.starts_with("```"))
        .map(|l| {
            l.trim_start_matches("Commit message:")
                .trim()
                .trim_matches(|c| c == '"' || c == '`' || c == '\'')
                .trim()
        })
        .find(|l| !l.is_empty())
        .map(str::to_string)
}

fn is_conventional(kind: &str) -> bool {
    CONVENTIONAL_TYPES.contains(&kind)
}

fn distinct_words(text: &str) -> usize {
    let mut words: Vec<String> = text
        .split_whitespace()
        .filter(|w| w.chars().any(|c| c.is_alphanumeric()))
        .map(|w| w.to_lowercase())
        .collect();
    words.sort();
    words.dedup();
    words.len()
}

/// Best guess at a type from free-form wording.
fn infer_type(text: &str) -> &'static str {
    let lower = text.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));
    if has(&["fix", "bug", "error", "crash", "resolve"]) {
        "fix"
    } else if has(&["test"]) {
        "test"
    } else if has(&["doc", "readme"]) {
        "docs"
    } else if has(&["refactor", "rename", "move", "clean"]) {
        "refactor"
    } else if has(&["add", "implement", "introduce", "support"]) {
        "feat"
    } else {
        "chore"
    }
}

fn truncate_subject(message: &str) -> String {
    if message.chars().count() <= MAX_SUBJECT_CHARS {
        return message.to_string();
    }
    let kept: String = message.chars().take(MAX_SUBJECT_CHARS - 3).collect();
    format!("{}...", kept.trim_end())
}

/// Type implied by the shape of the diff alone.
pub fn summary_type(summary: &DiffSummary) -> &'static str {
    if summary.files.iter().all(FileChange::is_docs) {
        "docs"
    } else if summary.files.iter().all(FileChange::is_test) {
        "test"
    } else if summary.files.iter().any(|f| f.status == FileStatus::Added) {
        "feat"
    } else {
        "chore"
    }
}

/// Deterministic message built only from the diff.
pub fn fallback_candidate(summary: &DiffSummary) -> CommitCandidate {
    let kind = summary_type(summary);
    let verb = match kind {
        "docs" => "update documentation in",
        "test" => "update tests in",
        _ if summary.files.iter().all(|f| f.status == FileStatus::Deleted) => "remove",
        "feat" => "add",
        _ => "update",
    };
    let target = match summary.files.as_slice() {
        [] => "working tree".to_string(),
        [only] => only.file_name().to_string(),
        [first, rest @ ..] => format!("{} and {} other files", first.file_name(), rest.len()),
    };

    let mut subject = format!("{} {}", verb, target);
    if !summary.symbols.is_empty() {
        let named: Vec<&str> = summary.symbols.iter().take(2).map(String::as_str).collect();
        subject.push_str(&format!(" touching {}", named.join(", ")));
    }
    subject.push_str(&format!(
        " (+{}/-{} lines)",
        summary.lines_added(),
        summary.lines_removed()
    ));

    CommitCandidate {
        message: truncate_subject(&format!("{}: {}", kind, subject)),
        conventional_type: kind.to_string(),
    }
}

fn build_prompt(
    summary: &DiffSummary,
    project_context: &str,
    min_words: usize,
    rejection: Option<&str>,
) -> String {
    let mut prompt = format!(
        "Write a git commit message in Conventional Commits format for these {} changes.\n\nFiles:\n",
        summary.origin.as_str()
    );
    for file in summary.files.iter().take(MAX_PROMPT_FILES) {
        prompt.push_str(&format!(
            "  {} {} (+{}/-{})\n",
            file.status.letter(),
            file.path,
            file.added,
            file.removed
        ));
    }
    if summary.files.len() > MAX_PROMPT_FILES {
        prompt.push_str(&format!(
            "  ... and {} more\n",
            summary.files.len() - MAX_PROMPT_FILES
        ));
    }
    if !summary.symbols.is_empty() {
        prompt.push_str(&format!("Changed symbols: {}\n", summary.symbols.join(", ")));
    }
    let types = summary.file_types();
    if !types.is_empty() {
        prompt.push_str(&format!("File types: {}\n", types.join(", ")));
    }
    if !project_context.is_empty() {
        prompt.push_str(&format!("Project: {}\n", project_context));
    }
    prompt.push_str(&format!("Suggested type: {}\n\n", summary_type(summary)));

    prompt.push_str("CRITICAL RULES:\n");
    prompt.push_str("- Reply with exactly one line: <type>: <subject>\n");
    prompt.push_str(&format!("- <type> is one of: {}\n", CONVENTIONAL_TYPES.join(", ")));
    prompt.push_str(&format!(
        "- The subject says what changed in at least {} words and at most {} characters\n",
        min_words, MAX_SUBJECT_CHARS
    ));
    prompt.push_str(
        "- Never use placeholders such as \"commit message\", \"update\", \"changes\" or \"wip\"\n",
    );
    if let Some(reason) = rejection {
        prompt.push_str(&format!(
            "\nYour previous reply was rejected: {}. Write a more specific message.\n",
            reason
        ));
    }
    prompt
}
