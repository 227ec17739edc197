//! The environment a completion request is made in.
//!
//! Project markers are stat calls in the working directory. The VCS part is
//! computed lazily on first use, so requests answered by the static table
//! never spawn `git`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use once_cell::unsync::OnceCell;
use serde::Serialize;

use crate::process::run_with_timeout;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectType {
    Rust,
    Node,
    Python,
    Go,
    Java,
    Unknown,
}

impl ProjectType {
    /// Marker files, checked in order; the first hit wins.
    const MARKERS: &'static [(&'static str, ProjectType)] = &[
        ("Cargo.toml", ProjectType::Rust),
        ("package.json", ProjectType::Node),
        ("pyproject.toml", ProjectType::Python),
        ("requirements.txt", ProjectType::Python),
        ("setup.py", ProjectType::Python),
        ("go.mod", ProjectType::Go),
        ("pom.xml", ProjectType::Java),
        ("build.gradle", ProjectType::Java),
    ];

    pub fn detect(dir: &Path) -> Self {
        Self::MARKERS
            .iter()
            .find(|(marker, _)| dir.join(marker).exists())
            .map(|(_, kind)| *kind)
            .unwrap_or(ProjectType::Unknown)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProjectType::Rust => "rust",
            ProjectType::Node => "node",
            ProjectType::Python => "python",
            ProjectType::Go => "go",
            ProjectType::Java => "java",
            ProjectType::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VcsState {
    pub branch: Option<String>,
    pub dirty: bool,
}

/// Deterministic digest used in cache keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContextFingerprint(String);

impl ContextFingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContextFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct CompletionContext {
    pub cwd: PathBuf,
    pub project: ProjectType,
    pub has_docker: bool,
    pub has_kubernetes: bool,
    /// Commands the user last ran in this shell, oldest first.
    pub recent: Vec<String>,
    vcs: OnceCell<VcsState>,
    git_timeout: Duration,
}

impl CompletionContext {
    /// Inspects `cwd`. `recent` comes from the shell (see [`recent_commands`]),
    /// never from the history ledger: accepting a completion must not change
    /// the fingerprint the next identical request is looked up under.
    pub fn detect(cwd: &Path, recent: Vec<String>, git_timeout: Duration) -> Self {
        Self {
            cwd: cwd.to_path_buf(),
            project: ProjectType::detect(cwd),
            has_docker: ["Dockerfile", "docker-compose.yml", "compose.yaml"]
                .iter()
                .any(|f| cwd.join(f).exists()),
            has_kubernetes: ["k8s", "kubernetes"].iter().any(|d| cwd.join(d).is_dir()),
            recent,
            vcs: OnceCell::new(),
            git_timeout,
        }
    }

    /// Context with a fixed VCS state; never runs git.
    pub fn with_vcs(mut self, vcs: VcsState) -> Self {
        self.vcs = OnceCell::from(vcs);
        self
    }

    pub fn vcs(&self) -> &VcsState {
        self.vcs
            .get_or_init(|| detect_vcs(&self.cwd, self.git_timeout))
    }

    pub fn fingerprint(&self) -> ContextFingerprint {
        let vcs = self.vcs();
        let material = format!(
            "{}\u{1f}{}\u{1f}{}\u{1f}{}",
            self.project.as_str(),
            vcs.branch.as_deref().unwrap_or(""),
            vcs.dirty,
            self.recent.join("\u{1e}")
        );
        ContextFingerprint(format!("{:x}", md5::compute(material.as_bytes())))
    }

    /// One-line description for model prompts.
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if self.project != ProjectType::Unknown {
            parts.push(format!("{} project", self.project.as_str()));
        }
        let vcs = self.vcs();
        if let Some(branch) = &vcs.branch {
            let state = if vcs.dirty { "uncommitted changes" } else { "clean" };
            parts.push(format!("git branch {} ({})", branch, state));
        }
        if self.has_docker {
            parts.push("docker available".to_string());
        }
        if self.has_kubernetes {
            parts.push("kubernetes manifests".to_string());
        }
        parts.join(", ")
    }
}

/// The last `depth` non-empty commands of the shell's own history, trimmed,
/// oldest first.
pub fn recent_commands<S: AsRef<str>>(commands: &[S], depth: usize) -> Vec<String> {
    let cleaned: Vec<String> = commands
        .iter()
        .map(|c| c.as_ref().trim())
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect();
    let skip = cleaned.len().saturating_sub(depth);
    cleaned.into_iter().skip(skip).collect()
}

fn detect_vcs(cwd: &Path, git_timeout: Duration) -> VcsState {
    let Some(branch) = read_branch(cwd) else {
        return VcsState::default();
    };
    let dirty = run_with_timeout(
        Command::new("git")
            .args(["status", "--porcelain", "--untracked-files=no"])
            .current_dir(cwd),
        git_timeout,
    )
    .map(|out| out.success() && !out.stdout.trim().is_empty())
    .unwrap_or(false);

    VcsState {
        branch: Some(branch),
        dirty,
    }
}

/// Reads the branch from `.git/HEAD` without spawning git. Detached heads
/// report the short hash.
fn read_branch(cwd: &Path) -> Option<String> {
    let git_dir = find_git_dir(cwd)?;
    let head = fs_err::read_to_string(git_dir.join("HEAD")).ok()?;
    let head = head.trim();
    match head.strip_prefix("ref: ") {
        Some(reference) => Some(
            reference
                .strip_prefix("refs/heads/")
                .unwrap_or(reference)
                .to_string(),
        ),
        None => Some(head.chars().take(7).collect()),
    }
}

fn find_git_dir(start: &Path) -> Option<PathBuf> {
    for dir in start.ancestors() {
        let candidate = dir.join(".git");
        if candidate.is_dir() {
            return Some(candidate);
        }
        if candidate.is_file() {
            // Worktrees and submodules: `.git` is a file holding `gitdir: <path>`.
            let content = fs_err::read_to_string(&candidate).ok()?;
            let target = content.trim().strip_prefix("gitdir:")?.trim();
            let target = Path::new(target);
            return Some(if target.is_absolute() {
                target.to_path_buf()
            } else {
                dir.join(target)
            });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(dir: &Path, recent: &[&str], vcs: VcsState) -> CompletionContext {
        CompletionContext::detect(
            dir,
            recent.iter().map(|s| s.to_string()).collect(),
            Duration::from_millis(500),
        )
        .with_vcs(vcs)
    }

    #[test]
    fn detects_project_markers() {
        let tmp = tempfile::tempdir().expect("temp dir");
        assert_eq!(ProjectType::detect(tmp.path()), ProjectType::Unknown);
        fs_err::write(tmp.path().join("requirements.txt"), "").expect("write");
        assert_eq!(ProjectType::detect(tmp.path()), ProjectType::Python);
        fs_err::write(tmp.path().join("Cargo.toml"), "").expect("write");
        assert_eq!(ProjectType::detect(tmp.path()), ProjectType::Rust);
    }

    #[test]
    fn fingerprint_is_deterministic_and_sensitive() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let main = VcsState {
            branch: Some("main".to_string()),
            dirty: false,
        };
        let a = ctx(tmp.path(), &["ls"], main.clone()).fingerprint();
        let b = ctx(tmp.path(), &["ls"], main.clone()).fingerprint();
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 32);

        let dirty = ctx(
            tmp.path(),
            &["ls"],
            VcsState {
                dirty: true,
                ..main.clone()
            },
        )
        .fingerprint();
        let other_history = ctx(tmp.path(), &["pwd"], main).fingerprint();
        assert_ne!(a, dirty);
        assert_ne!(a, other_history);
    }

    #[test]
    fn recent_commands_keeps_last_non_empty_lines() {
        let lines = ["  cd infra", "", "ls", "terraform init  ", "   "];
        assert_eq!(
            recent_commands(&lines, 2),
            vec!["ls".to_string(), "terraform init".to_string()]
        );
        assert_eq!(recent_commands(&lines, 10).len(), 3);
        assert!(recent_commands::<&str>(&[], 3).is_empty());
    }

    #[test]
    fn reads_branch_from_head_file() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let git = tmp.path().join(".git");
        fs_err::create_dir_all(&git).expect("mkdir");
        fs_err::write(git.join("HEAD"), "ref: refs/heads/feature/cache\n").expect("write");
        let nested = tmp.path().join("src").join("deep");
        fs_err::create_dir_all(&nested).expect("mkdir");

        assert_eq!(read_branch(&nested).as_deref(), Some("feature/cache"));
    }

    #[test]
    fn detached_head_reports_short_hash() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let git = tmp.path().join(".git");
        fs_err::create_dir_all(&git).expect("mkdir");
        fs_err::write(git.join("HEAD"), "3f2a9c1d0e8b7a6f5e4d3c2b1a0f9e8d7c6b5a4f\n").expect("write");
        assert_eq!(read_branch(tmp.path()).as_deref(), Some("3f2a9c1"));
    }

    #[test]
    fn no_repository_means_no_branch() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let context = CompletionContext::detect(tmp.path(), Vec::new(), Duration::from_millis(200));
        // tempdirs live outside any repository on CI hosts.
        if find_git_dir(tmp.path()).is_none() {
            assert_eq!(context.vcs(), &VcsState::default());
        }
    }

    #[test]
    fn describe_mentions_detected_parts() {
        let tmp = tempfile::tempdir().expect("temp dir");
        fs_err::write(tmp.path().join("Cargo.toml"), "").expect("write");
        fs_err::write(tmp.path().join("Dockerfile"), "").expect("write");
        let context = ctx(
            tmp.path(),
            &[],
            VcsState {
                branch: Some("main".to_string()),
                dirty: true,
            },
        );
        let text = context.describe();
        assert!(text.contains("rust project"));
        assert!(text.contains("git branch main (uncommitted changes)"));
        assert!(text.contains("docker available"));
    }
}
