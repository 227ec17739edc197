//! shellmind: shell integration binary for AI-assisted command completion.
//!
//! Called by the zsh widget and hooks that `shellmind init zsh` prints, and
//! directly by the user for setup and maintenance.
//!
//! ## Subcommands
//!
//! - `complete`: One completion for the current buffer (bound to a key)
//! - `session-start`: New session id + detached readiness orchestrator
//! - `precmd`: Prints the session's readiness announcement once
//! - `orchestrate`: The readiness state machine (spawned internally)
//! - `status`, `models`, `setup`, `train`, `generate-data`, `commit-msg`:
//!   explicit, user-invoked commands
//!
//! Shell-facing subcommands never fail loudly: errors are logged and the
//! process exits 0 with empty output so the shell keeps working.

mod commit_msg;
mod complete;
mod init;
mod logging;
mod provision;
mod session;
mod status;

use clap::{Parser, Subcommand};
use shellmind_core::{Config, EnvOverrides, StorageConfig};

#[derive(Parser)]
#[command(name = "shellmind")]
#[command(about = "AI-assisted shell command completion backed by a local Ollama server")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Suggest a completion for the current buffer (prints nothing if none)
    Complete {
        /// Current command-line buffer
        #[arg(value_name = "BUFFER", allow_hyphen_values = true)]
        buffer: String,

        /// Shell session id from `session-start`
        #[arg(long, env = "SHELLMIND_SESSION")]
        session: Option<String>,

        /// Working directory for context (defaults to the current one)
        #[arg(long)]
        cwd: Option<std::path::PathBuf>,

        /// A recently run command, oldest first (repeatable)
        #[arg(long = "recent", value_name = "COMMAND")]
        recent: Vec<String>,
    },

    /// Start a shell session: print its id and launch readiness checks
    SessionStart {
        /// Reuse this id instead of generating one
        #[arg(long)]
        session: Option<String>,
    },

    /// Print the session's readiness announcement, once
    Precmd {
        #[arg(long, env = "SHELLMIND_SESSION")]
        session: String,
    },

    /// Readiness orchestrator (spawned by session-start)
    #[command(hide = true)]
    Orchestrate {
        #[arg(long)]
        session: String,
    },

    /// Show service, model and session readiness
    Status {
        #[arg(long, env = "SHELLMIND_SESSION")]
        session: Option<String>,

        /// Machine-readable output
        #[arg(long)]
        json: bool,
    },

    /// List models loaded on the server
    Models,

    /// Start the server, pull the base model and create the completion model
    Setup,

    /// Run the configured fine-tuning job and import the result
    Train,

    /// Regenerate the training table from the built-in catalog
    GenerateData {
        /// Cap on generated examples
        #[arg(long)]
        max: Option<usize>,
    },

    /// Suggest a commit message for staged (or unstaged) changes
    CommitMsg {
        /// Repository path (defaults to the current directory)
        #[arg(long)]
        repo: Option<std::path::PathBuf>,
    },

    /// Print shell integration code
    Init {
        #[arg(value_enum)]
        shell: init::Shell,
    },
}

fn main() {
    let storage = StorageConfig::from_env().ok();
    let _logging_guard = logging::init(storage.as_ref());
    let cli = Cli::parse();

    let config = match storage {
        Some(storage) => Config::load_lenient(storage, &EnvOverrides::from_env()),
        None => {
            tracing::error!("Home directory not found");
            if is_shell_facing(&cli.command) {
                return;
            }
            eprintln!("shellmind: home directory not found (set SHELLMIND_HOME)");
            std::process::exit(1);
        }
    };

    match cli.command {
        Commands::Complete {
            buffer,
            session,
            cwd,
            recent,
        } => {
            // Completion is non-critical: log errors but exit 0 with no output.
            complete::run(
                &config,
                complete::Request {
                    buffer: &buffer,
                    session: session.as_deref(),
                    cwd,
                    recent: &recent,
                },
            );
        }
        Commands::SessionStart { session } => {
            if let Err(e) = session::start(&config, session) {
                tracing::warn!(error = %e, "shellmind session-start failed");
            }
        }
        Commands::Precmd { session } => {
            session::precmd(&config, &session);
        }
        Commands::Orchestrate { session } => {
            session::orchestrate(&config, &session);
        }
        Commands::Status { session, json } => {
            exit_on_error("status", status::run(&config, session.as_deref(), json));
        }
        Commands::Models => {
            exit_on_error("models", status::models(&config));
        }
        Commands::Setup => {
            exit_on_error("setup", provision::setup(&config));
        }
        Commands::Train => {
            exit_on_error("train", provision::train(&config));
        }
        Commands::GenerateData { max } => {
            exit_on_error("generate-data", provision::generate_data(&config, max));
        }
        Commands::CommitMsg { repo } => {
            exit_on_error("commit-msg", commit_msg::run(&config, repo));
        }
        Commands::Init { shell } => {
            print!("{}", init::script(shell));
        }
    }
}

fn is_shell_facing(command: &Commands) -> bool {
    matches!(
        command,
        Commands::Complete { .. }
            | Commands::SessionStart { .. }
            | Commands::Precmd { .. }
            | Commands::Orchestrate { .. }
    )
}

fn exit_on_error(command: &str, result: shellmind_core::Result<()>) {
    if let Err(e) = result {
        tracing::error!(error = %e, command, "shellmind command failed");
        eprintln!("shellmind {}: {}", command, e);
        std::process::exit(1);
    }
}
