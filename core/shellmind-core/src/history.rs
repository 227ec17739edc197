//! Durable log of accepted completions, shared by every terminal.
//!
//! The file is JSONL, opened with `O_APPEND`, and each record goes out in a
//! single `write_all` of one newline-terminated line, so concurrent writers
//! interleave whole records. On read, an unterminated trailing line is a
//! record still being written (or a torn one) and is discarded.
//!
//! Only the newest `capacity` entries are retained in memory. The file is
//! allowed to grow to twice that before it is compacted back down via
//! temp file + rename.

use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, ShellmindError};
use crate::resolver::SuggestionSource;
use crate::storage::write_atomic;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Unix seconds.
    pub timestamp: i64,
    pub prefix: String,
    pub suggestion: String,
    pub fingerprint: String,
    pub cwd: String,
    #[serde(default)]
    pub source: SuggestionSource,
}

impl HistoryEntry {
    /// First word of the accepted command (`git`, `docker`, ...).
    pub fn command_head(&self) -> &str {
        self.suggestion.split_whitespace().next().unwrap_or("")
    }
}

pub struct HistoryLedger {
    path: PathBuf,
    capacity: usize,
    entries: VecDeque<HistoryEntry>,
    file_lines: usize,
}

impl HistoryLedger {
    /// Replays `path`. A missing or unreadable file yields an empty ledger.
    pub fn open(path: PathBuf, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (entries, file_lines) = match fs_err::read_to_string(&path) {
            Ok(content) => parse_log(&content, capacity),
            Err(_) => (VecDeque::new(), 0),
        };
        Self {
            path,
            capacity,
            entries,
            file_lines,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries oldest first.
    pub fn entries(&self) -> impl DoubleEndedIterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn append(&mut self, entry: HistoryEntry) -> Result<()> {
        let mut line = serde_json::to_string(&entry)
            .map_err(|e| ShellmindError::json("serializing history entry", e))?;
        line.push('\n');

        if let Some(parent) = self.path.parent() {
            fs_err::create_dir_all(parent)
                .map_err(|e| ShellmindError::io("creating history directory", e))?;
        }
        let mut file = fs_err::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| ShellmindError::io("opening history log", e))?;
        file.write_all(line.as_bytes())
            .map_err(|e| ShellmindError::io("appending history log", e))?;

        self.entries.push_back(entry);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
        self.file_lines += 1;

        if self.file_lines > self.capacity * 2 {
            self.compact()?;
        }
        Ok(())
    }

    /// Rewrites the file with the newest `capacity` records. Re-reads first
    /// so records appended by other terminals since `open` are kept.
    fn compact(&mut self) -> Result<()> {
        let content = fs_err::read_to_string(&self.path)
            .map_err(|e| ShellmindError::io("reading history log", e))?;
        let (entries, _) = parse_log(&content, self.capacity);

        let mut out = String::new();
        for entry in &entries {
            let line = serde_json::to_string(entry)
                .map_err(|e| ShellmindError::json("serializing history entry", e))?;
            out.push_str(&line);
            out.push('\n');
        }
        write_atomic(&self.path, out.as_bytes())?;

        tracing::debug!(kept = entries.len(), "Compacted history log");
        self.file_lines = entries.len();
        self.entries = entries;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Statistics
    // ─────────────────────────────────────────────────────────────────────

    /// Most used command heads, highest count first. Ties go to the command
    /// used most recently.
    pub fn most_frequent(&self, n: usize) -> Vec<(String, usize)> {
        let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
        for (idx, entry) in self.entries.iter().enumerate() {
            let head = entry.command_head();
            if head.is_empty() {
                continue;
            }
            let slot = counts.entry(head).or_insert((0, idx));
            slot.0 += 1;
            slot.1 = idx;
        }
        let mut ranked: Vec<(&str, (usize, usize))> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then(b.1 .1.cmp(&a.1 .1)));
        ranked
            .into_iter()
            .take(n)
            .map(|(head, (count, _))| (head.to_string(), count))
            .collect()
    }

    /// The last `n` accepted commands, oldest first.
    pub fn recent_sequence(&self, n: usize) -> Vec<String> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries
            .iter()
            .skip(skip)
            .map(|e| e.suggestion.clone())
            .collect()
    }

    /// Distinct past commands sharing the buffer's first word, newest first.
    pub fn similar(&self, buffer: &str, n: usize) -> Vec<String> {
        let Some(head) = buffer.split_whitespace().next() else {
            return Vec::new();
        };
        let mut seen = Vec::new();
        for entry in self.entries.iter().rev() {
            if entry.command_head() == head && !seen.contains(&entry.suggestion) {
                seen.push(entry.suggestion.clone());
                if seen.len() == n {
                    break;
                }
            }
        }
        seen
    }
}

/// Parses complete lines, keeping the newest `capacity` valid records.
/// Returns the records and the number of complete lines seen.
fn parse_log(content: &str, capacity: usize) -> (VecDeque<HistoryEntry>, usize) {
    let complete = match content.rfind('\n') {
        Some(end) => &content[..end],
        None => "",
    };
    let mut entries = VecDeque::with_capacity(capacity);
    let mut lines = 0;
    for line in complete.split('\n') {
        if line.trim().is_empty() {
            continue;
        }
        lines += 1;
        match serde_json::from_str::<HistoryEntry>(line) {
            Ok(entry) => {
                entries.push_back(entry);
                if entries.len() > capacity {
                    entries.pop_front();
                }
            }
            Err(err) => tracing::debug!(error = %err, "Skipping malformed history line"),
        }
    }
    (entries, lines)
}
