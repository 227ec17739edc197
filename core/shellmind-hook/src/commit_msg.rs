//! `commit-msg`: print a commit message for the pending changes.
//!
//! ```bash
//! git commit -m "$(shellmind commit-msg)"
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use shellmind_core::{
    CommitMessageSynthesizer, CommitSettings, CompletionContext, Config, GitDiffSource,
    OllamaClient, Result,
};

pub fn run(config: &Config, repo: Option<PathBuf>) -> Result<()> {
    let repo = repo
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));
    let source = GitDiffSource::new(repo.clone(), config.commit.git_timeout());
    let project_context =
        CompletionContext::detect(&repo, Vec::new(), config.commit.git_timeout()).describe();

    let service = Arc::new(OllamaClient::new(&config.service)?);
    let synthesizer = CommitMessageSynthesizer::new(service, CommitSettings::from_config(config));

    match synthesizer.synthesize(&source, &project_context)? {
        Some(candidate) => println!("{}", candidate.message),
        None => eprintln!("shellmind: nothing to commit"),
    }
    Ok(())
}
