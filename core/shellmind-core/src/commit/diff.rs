//! Diff collection and analysis for commit messages.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Result, ShellmindError};
use crate::process::run_with_timeout;

const MAX_SYMBOLS: usize = 10;

static SYMBOL_DEF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:export\s+)?(?:default\s+)?(?:async\s+)?(?:fn|struct|enum|trait|def|class|function|func|interface|impl(?:<[^>]*>)?)\s+([A-Za-z_][A-Za-z0-9_]*)",
    )
    .expect("valid regex")
});

/// Where diff text comes from.
pub trait DiffSource {
    fn staged(&self) -> Result<String>;
    fn unstaged(&self) -> Result<String>;
}

/// Runs `git diff` in a working tree, each call bounded by `timeout`.
pub struct GitDiffSource {
    repo: PathBuf,
    timeout: Duration,
}

impl GitDiffSource {
    pub fn new(repo: PathBuf, timeout: Duration) -> Self {
        Self { repo, timeout }
    }

    fn diff(&self, extra: &[&str]) -> Result<String> {
        let output = run_with_timeout(
            Command::new("git")
                .arg("diff")
                .args(extra)
                .args(["--no-color", "--no-ext-diff", "-M"])
                .current_dir(&self.repo),
            self.timeout,
        )?;
        if !output.success() {
            return Err(ShellmindError::CommandFailed {
                command: format!("git diff {}", extra.join(" ")),
                details: output.stderr.trim().to_string(),
            });
        }
        Ok(output.stdout)
    }
}

impl DiffSource for GitDiffSource {
    fn staged(&self) -> Result<String> {
        self.diff(&["--cached"])
    }

    fn unstaged(&self) -> Result<String> {
        self.diff(&[])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffOrigin {
    Staged,
    Unstaged,
}

impl DiffOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            DiffOrigin::Staged => "staged",
            DiffOrigin::Unstaged => "unstaged",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Added,
    Modified,
    Deleted,
    Renamed,
}

impl FileStatus {
    pub fn letter(self) -> char {
        match self {
            FileStatus::Added => 'A',
            FileStatus::Modified => 'M',
            FileStatus::Deleted => 'D',
            FileStatus::Renamed => 'R',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: String,
    pub status: FileStatus,
    pub added: usize,
    pub removed: usize,
}

impl FileChange {
    fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            status: FileStatus::Modified,
            added: 0,
            removed: 0,
        }
    }

    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    pub fn extension(&self) -> Option<&str> {
        let name = self.file_name();
        name.rfind('.')
            .filter(|idx| *idx > 0)
            .map(|idx| &name[idx + 1..])
    }

    pub fn is_docs(&self) -> bool {
        matches!(self.extension(), Some("md" | "rst" | "txt" | "adoc"))
            || self.path.starts_with("docs/")
    }

    pub fn is_test(&self) -> bool {
        let name = self.file_name();
        self.path.starts_with("tests/")
            || self.path.contains("/tests/")
            || name.starts_with("test_")
            || name.contains("_test.")
            || name.contains(".test.")
            || name.contains(".spec.")
    }
}

/// What changed, extracted from one unified diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffSummary {
    pub origin: DiffOrigin,
    pub files: Vec<FileChange>,
    /// Names of functions/types whose definitions were added or changed.
    pub symbols: Vec<String>,
}

impl DiffSummary {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn lines_added(&self) -> usize {
        self.files.iter().map(|f| f.added).sum()
    }

    pub fn lines_removed(&self) -> usize {
        self.files.iter().map(|f| f.removed).sum()
    }

    /// Distinct file extensions, sorted.
    pub fn file_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self
            .files
            .iter()
            .filter_map(|f| f.extension().map(str::to_string))
            .collect();
        types.sort();
        types.dedup();
        types
    }
}

/// Reads staged changes, or unstaged ones if nothing is staged. `None`
/// means the tree is clean.
pub fn collect(source: &dyn DiffSource) -> Result<Option<DiffSummary>> {
    let staged = source.staged()?;
    if !staged.trim().is_empty() {
        return Ok(Some(analyze_diff(&staged, DiffOrigin::Staged)).filter(|s| !s.is_empty()));
    }
    let unstaged = source.unstaged()?;
    if !unstaged.trim().is_empty() {
        return Ok(Some(analyze_diff(&unstaged, DiffOrigin::Unstaged)).filter(|s| !s.is_empty()));
    }
    Ok(None)
}

pub fn analyze_diff(text: &str, origin: DiffOrigin) -> DiffSummary {
    let mut files: Vec<FileChange> = Vec::new();
    let mut symbols: Vec<String> = Vec::new();

    // File headers (`---`/`+++`) only appear before a file's first hunk.
    let mut in_hunk = false;

    for line in text.lines() {
        if let Some(rest) = line.strip_prefix("diff --git ") {
            let path = rest
                .rsplit_once(" b/")
                .map(|(_, b)| b)
                .unwrap_or(rest);
            files.push(FileChange::new(path));
            in_hunk = false;
            continue;
        }
        let Some(current) = files.last_mut() else {
            continue;
        };

        if line.starts_with("@@") {
            in_hunk = true;
        } else if line.starts_with("new file mode") {
            current.status = FileStatus::Added;
        } else if line.starts_with("deleted file mode") {
            current.status = FileStatus::Deleted;
        } else if let Some(to) = line.strip_prefix("rename to ") {
            current.status = FileStatus::Renamed;
            current.path = to.to_string();
        } else if !in_hunk && (line.starts_with("+++") || line.starts_with("---")) {
            continue;
        } else if let Some(added) = line.strip_prefix('+') {
            current.added += 1;
            if let Some(caps) = SYMBOL_DEF.captures(added) {
                let name = caps[1].to_string();
                if symbols.len() < MAX_SYMBOLS && !symbols.contains(&name) {
                    symbols.push(name);
                }
            }
        } else if line.starts_with('-') {
            current.removed += 1;
        }
    }

    DiffSummary {
        origin,
        files,
        symbols,
    }
}
