//! Static prefix → command table.
//!
//! Loaded once from `training/commands.jsonl` (the same `{"input","output"}`
//! records the fine-tuning job consumes) and read-only afterwards. When no
//! file exists the built-in seed is used, so fallback mode always has
//! something to offer.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// One training example.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingExample {
    pub input: String,
    pub output: String,
}

impl TrainingExample {
    pub fn new(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
        }
    }
}

const SEED: &[(&str, &str)] = &[
    ("git comm", "git commit -m \"commit message\""),
    ("git add", "git add ."),
    ("git push", "git push origin main"),
    ("git pull", "git pull origin main"),
    ("git sta", "git status"),
    ("git che", "git checkout"),
    ("git log", "git log --oneline --graph"),
    ("docker run", "docker run -it --rm"),
    ("docker ps", "docker ps -a"),
    ("docker comp", "docker compose up -d"),
    ("npm run", "npm run dev"),
    ("npm i", "npm install"),
    ("python -m", "python -m venv venv"),
    ("pip inst", "pip install -r requirements.txt"),
    ("cargo b", "cargo build"),
    ("cargo t", "cargo test"),
    ("kubectl get", "kubectl get pods"),
    ("kubectl desc", "kubectl describe pod"),
    ("ls -", "ls -la"),
    ("grep -r", "grep -rn"),
    ("find .", "find . -name"),
    ("tar -x", "tar -xzf"),
    ("ssh-k", "ssh-keygen -t ed25519"),
    ("curl -X", "curl -X POST -H \"Content-Type: application/json\""),
];

#[derive(Debug, Clone, Default)]
pub struct TrainingTable {
    entries: BTreeMap<String, String>,
}

impl TrainingTable {
    pub fn seed() -> Self {
        Self::from_examples(
            SEED.iter()
                .map(|(input, output)| TrainingExample::new(*input, *output)),
        )
    }

    pub fn from_examples(examples: impl IntoIterator<Item = TrainingExample>) -> Self {
        let entries = examples
            .into_iter()
            .filter(|e| !e.input.trim().is_empty() && !e.output.trim().is_empty())
            .map(|e| (e.input.trim_end().to_string(), e.output))
            .collect();
        Self { entries }
    }

    /// Loads the JSONL table at `path`, falling back to the seed when the
    /// file is missing or holds no usable record.
    pub fn load(path: &Path) -> Self {
        let Ok(content) = fs_err::read_to_string(path) else {
            return Self::seed();
        };
        let table = Self::from_examples(
            content
                .lines()
                .filter_map(|line| serde_json::from_str::<TrainingExample>(line).ok()),
        );
        if table.is_empty() {
            tracing::warn!(path = %path.display(), "Training table empty; using seed");
            return Self::seed();
        }
        table
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Exact match first, then the longest key that prefixes `buffer` and
    /// whose command extends it. Each probe is one map lookup.
    pub fn lookup(&self, buffer: &str) -> Option<&str> {
        let key = buffer.trim_end();
        if let Some(output) = self.entries.get(key) {
            return Some(output.as_str());
        }

        let boundaries = key
            .char_indices()
            .map(|(i, _)| i)
            .skip(1)
            .collect::<Vec<_>>();
        boundaries.into_iter().rev().find_map(|end| {
            self.entries
                .get(&key[..end])
                .map(String::as_str)
                .filter(|output| output.starts_with(buffer) && output.len() > buffer.len())
        })
    }

    pub fn examples(&self) -> impl Iterator<Item = TrainingExample> + '_ {
        self.entries
            .iter()
            .map(|(input, output)| TrainingExample::new(input.clone(), output.clone()))
    }
}
