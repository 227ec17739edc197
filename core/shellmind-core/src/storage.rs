//! Storage configuration and path management for shellmind.
//!
//! Every file the workspace reads or writes is named here. Production code
//! resolves the root from `SHELLMIND_HOME` or `~/.shellmind`; tests use
//! `StorageConfig::with_root(temp_dir)` for isolation.
//!
//! ```text
//! ~/.shellmind/
//! ├── config.toml
//! ├── history.jsonl              durable accepted-completion log
//! ├── cache/completions.json     best-effort cache snapshot
//! ├── training/commands.jsonl    static prefix → command table
//! ├── training/Modelfile         written by setup/train
//! ├── logs/                      diagnostic logs (append only)
//! └── sessions/<id>/
//!     ├── status.json            latest readiness state
//!     ├── transitions.jsonl      append-only transition log
//!     ├── announcement           one-shot message, deleted on consume
//!     └── orchestrator.pid       one orchestrator per session
//! ```

use std::path::{Path, PathBuf};

use crate::error::{Result, ShellmindError};

/// Environment variable overriding the storage root.
pub const HOME_ENV: &str = "SHELLMIND_HOME";

/// Central configuration for all shellmind storage paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    root: PathBuf,
}

impl StorageConfig {
    /// Resolves the root from `SHELLMIND_HOME`, falling back to `~/.shellmind`.
    pub fn from_env() -> Result<Self> {
        if let Some(root) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
            return Ok(Self::with_root(PathBuf::from(root)));
        }
        let home = dirs::home_dir().ok_or(ShellmindError::HomeDirNotFound)?;
        Ok(Self::with_root(home.join(".shellmind")))
    }

    /// Creates a StorageConfig with a custom root directory.
    /// Used for testing with temp directories.
    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Global Files
    // ─────────────────────────────────────────────────────────────────────────────

    /// Path to config.toml (user settings).
    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    /// Path to history.jsonl (accepted completions, shared by all terminals).
    pub fn history_file(&self) -> PathBuf {
        self.root.join("history.jsonl")
    }

    /// Path to the completion cache snapshot.
    pub fn cache_file(&self) -> PathBuf {
        self.cache_dir().join("completions.json")
    }

    /// Path to the static training table.
    pub fn training_table_file(&self) -> PathBuf {
        self.training_dir().join("commands.jsonl")
    }

    /// Path to the Modelfile used when importing the fine-tuned model.
    pub fn modelfile(&self) -> PathBuf {
        self.training_dir().join("Modelfile")
    }

    /// Log file for the model server when shellmind launches it.
    pub fn service_log_file(&self) -> PathBuf {
        self.logs_dir().join("service.log")
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Directories
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join("cache")
    }

    pub fn training_dir(&self) -> PathBuf {
        self.root.join("training")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.root.join("sessions")
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Per-Session Paths
    // ─────────────────────────────────────────────────────────────────────────────

    /// Directory holding one shell session's readiness files.
    /// Example: ~/.shellmind/sessions/01J9ZK3Q4M8W6Y2B7C5D0E1F2G/
    pub fn session_dir(&self, session_id: &str) -> PathBuf {
        self.sessions_dir().join(Self::encode_session_id(session_id))
    }

    pub fn status_file(&self, session_id: &str) -> PathBuf {
        self.session_dir(session_id).join("status.json")
    }

    pub fn transitions_file(&self, session_id: &str) -> PathBuf {
        self.session_dir(session_id).join("transitions.jsonl")
    }

    pub fn announcement_file(&self, session_id: &str) -> PathBuf {
        self.session_dir(session_id).join("announcement")
    }

    pub fn orchestrator_pid_file(&self, session_id: &str) -> PathBuf {
        self.session_dir(session_id).join("orchestrator.pid")
    }

    /// Makes a session id safe to use as a single path component.
    /// Anything outside `[A-Za-z0-9_-]` becomes `_`.
    pub fn encode_session_id(session_id: &str) -> String {
        let encoded: String = session_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        if encoded.is_empty() {
            "_".to_string()
        } else {
            encoded
        }
    }

    /// Ensures the root and its fixed subdirectories exist.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [
            self.root.clone(),
            self.cache_dir(),
            self.training_dir(),
            self.logs_dir(),
            self.sessions_dir(),
        ] {
            fs_err::create_dir_all(&dir)
                .map_err(|e| ShellmindError::io(format!("creating {}", dir.display()), e))?;
        }
        Ok(())
    }
}

/// Replaces `path` with `content` via temp file + rename in the same
/// directory. Readers see either the old file or the new one.
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    use std::io::Write;

    let parent = path.parent().ok_or_else(|| {
        ShellmindError::io(
            format!("{} has no parent directory", path.display()),
            std::io::Error::from(std::io::ErrorKind::InvalidInput),
        )
    })?;
    fs_err::create_dir_all(parent)
        .map_err(|e| ShellmindError::io(format!("creating {}", parent.display()), e))?;

    let mut temp_file = tempfile::NamedTempFile::new_in(parent)
        .map_err(|e| ShellmindError::io("creating temp file", e))?;
    temp_file
        .write_all(content)
        .map_err(|e| ShellmindError::io("writing temp file", e))?;
    temp_file
        .flush()
        .map_err(|e| ShellmindError::io("flushing temp file", e))?;
    temp_file
        .persist(path)
        .map_err(|e| ShellmindError::io(format!("replacing {}", path.display()), e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_atomic_replaces_content() {
        let tmp = tempdir().expect("temp dir");
        let path = tmp.path().join("nested").join("status.json");
        write_atomic(&path, b"one").expect("first write");
        write_atomic(&path, b"two").expect("second write");
        assert_eq!(fs_err::read_to_string(&path).expect("read"), "two");
        let leftovers = fs_err::read_dir(path.parent().unwrap())
            .expect("read dir")
            .count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_with_root_paths() {
        let config = StorageConfig::with_root(PathBuf::from("/tmp/sm"));
        assert_eq!(config.root(), Path::new("/tmp/sm"));
        assert_eq!(config.config_file(), PathBuf::from("/tmp/sm/config.toml"));
        assert_eq!(config.history_file(), PathBuf::from("/tmp/sm/history.jsonl"));
        assert_eq!(
            config.cache_file(),
            PathBuf::from("/tmp/sm/cache/completions.json")
        );
        assert_eq!(
            config.training_table_file(),
            PathBuf::from("/tmp/sm/training/commands.jsonl")
        );
    }

    #[test]
    fn test_session_paths() {
        let config = StorageConfig::with_root(PathBuf::from("/tmp/sm"));
        assert_eq!(
            config.status_file("abc"),
            PathBuf::from("/tmp/sm/sessions/abc/status.json")
        );
        assert_eq!(
            config.announcement_file("abc"),
            PathBuf::from("/tmp/sm/sessions/abc/announcement")
        );
    }

    #[test]
    fn test_encode_session_id_strips_separators() {
        assert_eq!(StorageConfig::encode_session_id("../etc"), "___etc");
        assert_eq!(StorageConfig::encode_session_id("tty/s003"), "tty_s003");
        assert_eq!(StorageConfig::encode_session_id("01J9-ab_c"), "01J9-ab_c");
        assert_eq!(StorageConfig::encode_session_id(""), "_");
    }

    #[test]
    fn test_ensure_dirs_creates_layout() {
        let tmp = tempdir().expect("temp dir");
        let config = StorageConfig::with_root(tmp.path().join("root"));
        config.ensure_dirs().expect("ensure dirs");
        assert!(config.cache_dir().is_dir());
        assert!(config.training_dir().is_dir());
        assert!(config.logs_dir().is_dir());
        assert!(config.sessions_dir().is_dir());
    }
}
