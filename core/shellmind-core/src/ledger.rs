//! Per-session readiness ledger and announcement mailbox.
//!
//! The orchestrator is the only writer. It appends every transition to
//! `transitions.jsonl` and mirrors the latest one into `status.json` with an
//! atomic replace, so readers never see a torn status.
//!
//! The announcement slot is single-shot in both directions:
//!
//! - **publish**: an `announced` marker is created with `create_new` before the
//!   message is written, so a second publish in the same session is refused.
//! - **consume**: the reader renames `announcement` to a claim file unique to
//!   its PID. `rename` succeeds for exactly one of any number of concurrent
//!   callers; the rest see `NotFound` and render nothing.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use fs_err::OpenOptions;

use crate::error::{Result, ShellmindError};
use crate::process::is_pid_alive;
use crate::readiness::{Announcement, ReadinessState, StatusRecord};
use crate::storage::{write_atomic, StorageConfig};

/// Fresh, sortable id for a shell session.
pub fn new_session_id() -> String {
    ulid::Ulid::new().to_string()
}

pub struct StatusLedger {
    storage: StorageConfig,
    session_id: String,
}

impl StatusLedger {
    pub fn new(storage: StorageConfig, session_id: impl Into<String>) -> Self {
        Self {
            storage,
            session_id: session_id.into(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn dir(&self) -> PathBuf {
        self.storage.session_dir(&self.session_id)
    }

    fn announced_marker(&self) -> PathBuf {
        self.dir().join("announced")
    }

    /// Clears any state left by an earlier session with the same id.
    pub fn reset(&self) -> Result<()> {
        let dir = self.dir();
        match fs_err::remove_dir_all(&dir) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(ShellmindError::io("clearing session directory", e)),
        }
        fs_err::create_dir_all(&dir)
            .map_err(|e| ShellmindError::io("creating session directory", e))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Status
    // ─────────────────────────────────────────────────────────────────────

    /// Latest recorded state. Falls back to the transition log if
    /// status.json is missing or unreadable.
    pub fn current(&self) -> Option<StatusRecord> {
        let status_path = self.storage.status_file(&self.session_id);
        fs_err::read_to_string(&status_path)
            .ok()
            .and_then(|content| serde_json::from_str::<StatusRecord>(&content).ok())
            .or_else(|| self.transitions().last().copied())
    }

    pub fn current_state(&self) -> Option<ReadinessState> {
        self.current().map(|r| r.state)
    }

    /// Every recorded transition, oldest first. Unparseable lines are skipped.
    pub fn transitions(&self) -> Vec<StatusRecord> {
        let path = self.storage.transitions_file(&self.session_id);
        let Ok(content) = fs_err::read_to_string(&path) else {
            return Vec::new();
        };
        content
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }

    pub fn record(&self, state: ReadinessState) -> Result<StatusRecord> {
        self.record_at(state, Utc::now())
    }

    /// Appends `state` if it is a legal successor of the current state.
    pub fn record_at(&self, state: ReadinessState, now: DateTime<Utc>) -> Result<StatusRecord> {
        let legal = match self.current_state() {
            None => state == ReadinessState::INITIAL,
            Some(current) => current.can_transition_to(state),
        };
        if !legal {
            return Err(ShellmindError::IllegalTransition {
                from: self
                    .current_state()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "none".to_string()),
                to: state.to_string(),
            });
        }

        let record = StatusRecord {
            state,
            timestamp: now.timestamp(),
        };
        let line = serde_json::to_string(&record)
            .map_err(|e| ShellmindError::json("serializing status record", e))?;

        fs_err::create_dir_all(self.dir())
            .map_err(|e| ShellmindError::io("creating session directory", e))?;
        append_line(&self.storage.transitions_file(&self.session_id), &line)?;
        write_atomic(&self.storage.status_file(&self.session_id), line.as_bytes())?;

        tracing::debug!(session = %self.session_id, state = %state, "Recorded readiness state");
        Ok(record)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Announcement
    // ─────────────────────────────────────────────────────────────────────

    /// Publishes the session's announcement. Returns false if one was
    /// already published.
    pub fn announce(&self, announcement: Announcement) -> Result<bool> {
        fs_err::create_dir_all(self.dir())
            .map_err(|e| ShellmindError::io("creating session directory", e))?;

        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.announced_marker())
        {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(ShellmindError::io("creating announcement marker", e)),
        }

        write_atomic(
            &self.storage.announcement_file(&self.session_id),
            announcement.message().as_bytes(),
        )?;
        tracing::info!(session = %self.session_id, %announcement, "Published announcement");
        Ok(true)
    }

    /// Reads the pending announcement without consuming it.
    pub fn peek_announcement(&self) -> Option<String> {
        fs_err::read_to_string(self.storage.announcement_file(&self.session_id))
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    /// Takes the pending announcement, if any. At most one caller across all
    /// processes ever receives it.
    pub fn consume_announcement(&self) -> Option<String> {
        let path = self.storage.announcement_file(&self.session_id);
        let claim = self
            .dir()
            .join(format!("announcement.claim.{}", std::process::id()));

        // Plain std rename: NotFound is the common case and needs no context.
        if std::fs::rename(&path, &claim).is_err() {
            return None;
        }
        let message = fs_err::read_to_string(&claim).ok();
        let _ = fs_err::remove_file(&claim);
        message
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Orchestrator Lock
    // ─────────────────────────────────────────────────────────────────────

    /// Claims the session's orchestrator slot for `pid`. A lock held by a
    /// dead process is replaced.
    pub fn acquire_orchestrator_lock(&self, pid: u32) -> Result<OrchestratorLock> {
        fs_err::create_dir_all(self.dir())
            .map_err(|e| ShellmindError::io("creating session directory", e))?;
        let path = self.storage.orchestrator_pid_file(&self.session_id);

        for _ in 0..2 {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(pid.to_string().as_bytes())
                        .map_err(|e| ShellmindError::io("writing orchestrator pid", e))?;
                    return Ok(OrchestratorLock { path, pid });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    let holder = read_pid(&path);
                    if holder.is_some_and(is_pid_alive) {
                        return Err(ShellmindError::AlreadyRunning(self.session_id.clone()));
                    }
                    tracing::debug!(?holder, "Replacing stale orchestrator lock");
                    let _ = fs_err::remove_file(&path);
                }
                Err(e) => return Err(ShellmindError::io("creating orchestrator lock", e)),
            }
        }
        Err(ShellmindError::AlreadyRunning(self.session_id.clone()))
    }
}

/// Pre-prompt side of the announcement. Once something has been shown,
/// later calls return `None` without touching the filesystem.
pub struct AnnouncementRenderer {
    ledger: StatusLedger,
    shown: bool,
}

impl AnnouncementRenderer {
    pub const PREFIX: &'static str = "shellmind: ";

    pub fn new(ledger: StatusLedger) -> Self {
        Self {
            ledger,
            shown: false,
        }
    }

    pub fn is_shown(&self) -> bool {
        self.shown
    }

    pub fn render(&mut self) -> Option<String> {
        if self.shown {
            return None;
        }
        let message = self.ledger.consume_announcement()?;
        self.shown = true;
        Some(format!("{}{}", Self::PREFIX, message))
    }
}

/// Held for the orchestrator's lifetime; removes the pid file on drop.
#[derive(Debug)]
pub struct OrchestratorLock {
    path: PathBuf,
    pid: u32,
}

impl OrchestratorLock {
    pub fn pid(&self) -> u32 {
        self.pid
    }
}

impl Drop for OrchestratorLock {
    fn drop(&mut self) {
        if read_pid(&self.path) == Some(self.pid) {
            let _ = fs_err::remove_file(&self.path);
        }
    }
}

fn read_pid(path: &Path) -> Option<u32> {
    fs_err::read_to_string(path).ok()?.trim().parse().ok()
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| ShellmindError::io("opening transition log", e))?;
    file.write_all(format!("{}\n", line).as_bytes())
        .map_err(|e| ShellmindError::io("appending transition log", e))
}

/// Removes session directories untouched for longer than `max_age`, skipping
/// any whose orchestrator is still alive. Returns the number removed.
pub fn sweep_stale_sessions(storage: &StorageConfig, max_age: Duration) -> usize {
    let Ok(entries) = fs_err::read_dir(storage.sessions_dir()) else {
        return 0;
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let age = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| modified.elapsed().ok());
        let Some(age) = age else { continue };
        if age < max_age {
            continue;
        }
        if read_pid(&path.join("orchestrator.pid")).is_some_and(is_pid_alive) {
            continue;
        }
        if fs_err::remove_dir_all(&path).is_ok() {
            removed += 1;
        }
    }
    if removed > 0 {
        tracing::debug!(removed, "Swept stale session directories");
    }
    removed
}
