//! Training data, fine-tuning and model import.
//!
//! All of this is explicit-only: `shellmind generate-data`, `train` and
//! `setup` call in here, never the shell hooks or the orchestrator. The
//! fine-tuning job itself is opaque; shellmind hands it a data file and
//! imports whatever it produced through a Modelfile.

use std::path::Path;
use std::process::Command;
use std::time::Duration;

use crate::config::Config;
use crate::error::{Result, ShellmindError};
use crate::process::{run_with_timeout, which};
use crate::storage::write_atomic;
use crate::table::{TrainingExample, TrainingTable};

pub const TRAINING_DATA_ENV: &str = "SHELLMIND_TRAINING_DATA";

/// System prompt baked into the imported model.
pub const MODEL_SYSTEM_PROMPT: &str = "You are a shell command completion expert. \
Given a partial command, reply with the single most likely complete command. \
Reply with the command only.";

const PULL_TIMEOUT: Duration = Duration::from_secs(60 * 60);
const CREATE_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Partial inputs shorter than this get no shortened variant.
const VARIATION_MIN_CHARS: usize = 6;

const CATALOG: &[(&str, &[(&str, &str)])] = &[
    (
        "git",
        &[
            ("git comm", "git commit -m \"commit message\""),
            ("git add", "git add ."),
            ("git push", "git push origin main"),
            ("git pull", "git pull origin main"),
            ("git sta", "git status"),
            ("git stash p", "git stash pop"),
            ("git che", "git checkout"),
            ("git checkout -b", "git checkout -b feature/"),
            ("git log", "git log --oneline --graph"),
            ("git rebase -i", "git rebase -i HEAD~3"),
            ("git reset --s", "git reset --soft HEAD~1"),
            ("git diff --c", "git diff --cached"),
            ("git remote -", "git remote -v"),
        ],
    ),
    (
        "docker",
        &[
            ("docker run", "docker run -it --rm"),
            ("docker ps", "docker ps -a"),
            ("docker comp", "docker compose up -d"),
            ("docker compose do", "docker compose down"),
            ("docker build", "docker build -t app ."),
            ("docker exec", "docker exec -it"),
            ("docker logs", "docker logs -f"),
            ("docker system pr", "docker system prune -af"),
        ],
    ),
    (
        "node",
        &[
            ("npm run", "npm run dev"),
            ("npm i", "npm install"),
            ("npm install -D", "npm install --save-dev"),
            ("npm run bu", "npm run build"),
            ("yarn ad", "yarn add"),
            ("npx create-", "npx create-react-app"),
        ],
    ),
    (
        "python",
        &[
            ("python -m", "python -m venv venv"),
            ("python -m pyt", "python -m pytest -v"),
            ("pip inst", "pip install -r requirements.txt"),
            ("pip free", "pip freeze > requirements.txt"),
            ("source ven", "source venv/bin/activate"),
        ],
    ),
    (
        "rust",
        &[
            ("cargo b", "cargo build"),
            ("cargo t", "cargo test"),
            ("cargo r", "cargo run"),
            ("cargo clip", "cargo clippy --all-targets"),
            ("cargo fm", "cargo fmt --all"),
        ],
    ),
    (
        "system",
        &[
            ("ls -", "ls -la"),
            ("grep -r", "grep -rn"),
            ("find .", "find . -name"),
            ("tar -x", "tar -xzf"),
            ("tar -c", "tar -czf archive.tar.gz"),
            ("chmod +", "chmod +x"),
            ("du -s", "du -sh *"),
            ("df -", "df -h"),
            ("ps au", "ps aux | grep"),
            ("ssh-k", "ssh-keygen -t ed25519"),
            ("mkdir -", "mkdir -p"),
        ],
    ),
    (
        "kubernetes",
        &[
            ("kubectl get", "kubectl get pods"),
            ("kubectl get s", "kubectl get svc"),
            ("kubectl desc", "kubectl describe pod"),
            ("kubectl logs", "kubectl logs -f"),
            ("kubectl apply", "kubectl apply -f"),
            ("kubectl exec", "kubectl exec -it"),
        ],
    ),
    (
        "zsh",
        &[
            ("source ~/.z", "source ~/.zshrc"),
            ("history | g", "history | grep"),
            ("alias ", "alias ll='ls -la'"),
            ("export PA", "export PATH=\"$HOME/.local/bin:$PATH\""),
        ],
    ),
    (
        "http",
        &[
            ("curl -X", "curl -X POST -H \"Content-Type: application/json\""),
            ("curl -s", "curl -s http://localhost:8080/health"),
            ("wget -", "wget -qO-"),
            ("http GET", "http GET localhost:8080"),
        ],
    ),
];

/// Every built-in example, in category order.
pub fn catalog() -> Vec<TrainingExample> {
    CATALOG
        .iter()
        .flat_map(|(_, examples)| examples.iter())
        .map(|(input, output)| TrainingExample::new(*input, *output))
        .collect()
}

/// Adds a shortened variant (last character dropped) of each longer input,
/// skipping duplicates, and caps the result at `max`. Inputs are stored
/// end-trimmed, the form `TrainingTable` keys them by.
pub fn with_variations(examples: Vec<TrainingExample>, max: usize) -> Vec<TrainingExample> {
    fn push(mut example: TrainingExample, out: &mut Vec<TrainingExample>) {
        let trimmed = example.input.trim_end();
        if trimmed.len() != example.input.len() {
            example.input = trimmed.to_string();
        }
        if !out.iter().any(|e| e.input == example.input) {
            out.push(example);
        }
    }

    let mut out: Vec<TrainingExample> = Vec::with_capacity(examples.len() * 2);

    for example in examples {
        let shortened = (example.input.chars().count() >= VARIATION_MIN_CHARS).then(|| {
            let mut input = example.input.clone();
            input.pop();
            TrainingExample::new(input.trim_end(), example.output.clone())
        });
        push(example, &mut out);
        if let Some(variant) = shortened {
            push(variant, &mut out);
        }
    }
    out.truncate(max);
    out
}

/// Writes examples as JSONL, replacing any existing file.
pub fn write_training_data(path: &Path, examples: &[TrainingExample]) -> Result<usize> {
    let mut out = String::new();
    for example in examples {
        let line = serde_json::to_string(example)
            .map_err(|e| ShellmindError::json("serializing training example", e))?;
        out.push_str(&line);
        out.push('\n');
    }
    write_atomic(path, out.as_bytes())?;
    Ok(examples.len())
}

/// Regenerates the training table from the catalog. Returns the count written.
pub fn generate_training_data(config: &Config) -> Result<usize> {
    let examples = with_variations(catalog(), config.training.max_examples());
    let path = config.storage.training_table_file();
    let written = write_training_data(&path, &examples)?;
    tracing::info!(path = %path.display(), written, "Wrote training data");
    Ok(written)
}

pub fn modelfile(base_model: &str, adapter: Option<&str>, temperature: f32) -> String {
    let mut text = format!("FROM {}\n", base_model);
    if let Some(adapter) = adapter {
        text.push_str(&format!("ADAPTER {}\n", adapter));
    }
    text.push_str(&format!("SYSTEM \"\"\"{}\"\"\"\n", MODEL_SYSTEM_PROMPT));
    text.push_str(&format!("PARAMETER temperature {}\n", temperature));
    text.push_str("PARAMETER top_p 0.9\n");
    text.push_str("PARAMETER stop \"\\n\"\n");
    text
}

// ─────────────────────────────────────────────────────────────────────────────
// Collaborators
// ─────────────────────────────────────────────────────────────────────────────

/// The opaque fine-tuning job.
pub trait Trainer {
    fn train(&self, data: &Path) -> Result<()>;
}

/// Runs a configured command with the data path in `SHELLMIND_TRAINING_DATA`.
pub struct CommandTrainer {
    command: Vec<String>,
    timeout: Duration,
}

impl CommandTrainer {
    pub fn new(command: Vec<String>, timeout: Duration) -> Self {
        Self { command, timeout }
    }
}

impl Trainer for CommandTrainer {
    fn train(&self, data: &Path) -> Result<()> {
        let Some((program, args)) = self.command.split_first() else {
            return Ok(());
        };
        let output = run_with_timeout(
            Command::new(program).args(args).env(TRAINING_DATA_ENV, data),
            self.timeout,
        )?;
        if !output.success() {
            return Err(ShellmindError::CommandFailed {
                command: self.command.join(" "),
                details: output.stderr.trim().to_string(),
            });
        }
        Ok(())
    }
}

/// Model-management side of the service binary.
pub trait ModelImport {
    fn pull(&self, model: &str) -> Result<()>;
    fn create(&self, name: &str, modelfile: &Path) -> Result<()>;
}

/// `ollama pull` / `ollama create` through the CLI.
pub struct OllamaCli {
    binary: String,
}

impl OllamaCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn run(&self, args: &[&str], timeout: Duration) -> Result<()> {
        let binary =
            which(&self.binary).ok_or_else(|| ShellmindError::BinaryNotFound(self.binary.clone()))?;
        let output = run_with_timeout(Command::new(binary).args(args), timeout)?;
        if !output.success() {
            return Err(ShellmindError::CommandFailed {
                command: format!("{} {}", self.binary, args.join(" ")),
                details: output.stderr.trim().to_string(),
            });
        }
        Ok(())
    }
}

impl ModelImport for OllamaCli {
    fn pull(&self, model: &str) -> Result<()> {
        self.run(&["pull", model], PULL_TIMEOUT)
    }

    fn create(&self, name: &str, modelfile: &Path) -> Result<()> {
        let path = modelfile.to_string_lossy();
        self.run(&["create", name, "-f", path.as_ref()], CREATE_TIMEOUT)
    }
}

/// Writes the Modelfile and creates `config.model.name` from it.
pub fn import_model(config: &Config, importer: &dyn ModelImport) -> Result<()> {
    let text = modelfile(
        &config.model.base_model,
        config.training.adapter.as_deref(),
        config.model.temperature,
    );
    let path = config.storage.modelfile();
    write_atomic(&path, text.as_bytes())?;
    importer.create(&config.model.name, &path)?;
    tracing::info!(model = %config.model.name, "Imported model");
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainReport {
    pub examples: usize,
    pub fine_tuned: bool,
}

/// Full retraining: make sure training data exists, run the job (if one is
/// configured), then import the result.
pub fn retrain(
    config: &Config,
    trainer: &dyn Trainer,
    importer: &dyn ModelImport,
) -> Result<TrainReport> {
    let data = config.storage.training_table_file();
    if !data.exists() {
        generate_training_data(config)?;
    }
    let examples = TrainingTable::load(&data).len();

    let fine_tuned = !config.training.command.is_empty();
    if fine_tuned {
        tracing::info!(examples, "Starting fine-tuning job");
        trainer.train(&data)?;
    }
    import_model(config, importer)?;

    Ok(TrainReport {
        examples,
        fine_tuned,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageConfig;
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingImport {
        calls: RefCell<Vec<String>>,
    }

    impl ModelImport for RecordingImport {
        fn pull(&self, model: &str) -> Result<()> {
            self.calls.borrow_mut().push(format!("pull {model}"));
            Ok(())
        }
        fn create(&self, name: &str, modelfile: &Path) -> Result<()> {
            assert!(modelfile.exists());
            self.calls.borrow_mut().push(format!("create {name}"));
            Ok(())
        }
    }

    struct RecordingTrainer {
        seen: RefCell<Option<std::path::PathBuf>>,
    }

    impl Trainer for RecordingTrainer {
        fn train(&self, data: &Path) -> Result<()> {
            *self.seen.borrow_mut() = Some(data.to_path_buf());
            Ok(())
        }
    }

    #[test]
    fn catalog_covers_every_category_and_seed_prefix() {
        let examples = catalog();
        assert!(examples.len() > 50);
        assert!(examples
            .iter()
            .any(|e| e.input == "git comm" && e.output == "git commit -m \"commit message\""));
    }

    #[test]
    fn variations_drop_last_char_and_respect_cap() {
        let examples = vec![
            TrainingExample::new("docker ps", "docker ps -a"),
            TrainingExample::new("ls -", "ls -la"),
        ];
        let out = with_variations(examples.clone(), 500);
        let inputs: Vec<&str> = out.iter().map(|e| e.input.as_str()).collect();
        assert_eq!(inputs, vec!["docker ps", "docker p", "ls -"]);

        assert_eq!(with_variations(examples, 2).len(), 2);
    }

    #[test]
    fn trailing_space_input_and_its_variant_are_one_example() {
        let examples = vec![TrainingExample::new("alias ", "alias ll='ls -la'")];
        let out = with_variations(examples, 500);
        let inputs: Vec<&str> = out.iter().map(|e| e.input.as_str()).collect();
        assert_eq!(inputs, vec!["alias"]);
    }

    #[test]
    fn generated_data_loads_as_table() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let config = Config::defaults(StorageConfig::with_root(tmp.path().to_path_buf()));
        let written = generate_training_data(&config).expect("generate");
        assert!(written <= 500);

        let table = TrainingTable::load(&config.storage.training_table_file());
        assert_eq!(table.len(), written);
        assert_eq!(
            table.lookup("git comm"),
            Some("git commit -m \"commit message\"")
        );
    }

    #[test]
    fn modelfile_includes_adapter_only_when_configured() {
        let plain = modelfile("codellama:7b", None, 0.1);
        assert!(plain.starts_with("FROM codellama:7b\n"));
        assert!(!plain.contains("ADAPTER"));
        assert!(plain.contains("PARAMETER temperature 0.1"));

        let tuned = modelfile("codellama:7b", Some("./adapters/shell"), 0.1);
        assert!(tuned.contains("ADAPTER ./adapters/shell\n"));
    }

    #[test]
    fn retrain_without_job_imports_only() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let config = Config::defaults(StorageConfig::with_root(tmp.path().to_path_buf()));
        let trainer = RecordingTrainer {
            seen: RefCell::new(None),
        };
        let importer = RecordingImport::default();

        let report = retrain(&config, &trainer, &importer).expect("retrain");
        assert!(!report.fine_tuned);
        assert!(report.examples > 0);
        assert!(trainer.seen.borrow().is_none());
        assert_eq!(*importer.calls.borrow(), vec!["create zsh-assistant"]);
    }

    #[test]
    fn retrain_runs_configured_job_with_data_path() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let mut config = Config::defaults(StorageConfig::with_root(tmp.path().to_path_buf()));
        config.training.command = vec!["true".to_string()];
        let trainer = RecordingTrainer {
            seen: RefCell::new(None),
        };
        let importer = RecordingImport::default();

        let report = retrain(&config, &trainer, &importer).expect("retrain");
        assert!(report.fine_tuned);
        assert_eq!(
            trainer.seen.borrow().as_deref(),
            Some(config.storage.training_table_file().as_path())
        );
    }

    #[test]
    fn command_trainer_reports_failure() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let trainer = CommandTrainer::new(
            vec!["sh".to_string(), "-c".to_string(), "exit 3".to_string()],
            Duration::from_secs(5),
        );
        assert!(matches!(
            trainer.train(tmp.path()),
            Err(ShellmindError::CommandFailed { .. })
        ));
    }
}
