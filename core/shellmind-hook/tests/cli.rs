use std::path::Path;
use std::process::{Command, Output};
use std::thread;
use std::time::{Duration, Instant};

const UNREACHABLE_URL: &str = "http://127.0.0.1:9";

fn shellmind(home: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_shellmind"))
        .args(args)
        .env("SHELLMIND_HOME", home)
        .env("SHELLMIND_OLLAMA_URL", UNREACHABLE_URL)
        .env_remove("SHELLMIND_SESSION")
        .env_remove("SHELLMIND_MODEL")
        .output()
        .expect("run shellmind")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn write_config(home: &Path) {
    fs_err::write(
        home.join("config.toml"),
        r#"
[service]
binary = "shellmind-test-no-such-binary"
probe_timeout_ms = 200
retry_delay_ms = 10

[model]
warm_up = false
"#,
    )
    .expect("write config");
}

#[test]
fn complete_prints_seed_completion_without_server() {
    let home = tempfile::tempdir().expect("temp dir");
    let output = shellmind(home.path(), &["complete", "git comm"]);
    assert!(output.status.success());
    assert_eq!(stdout(&output), r#"git commit -m "commit message""#);
}

#[test]
fn complete_is_silent_for_short_buffer() {
    let home = tempfile::tempdir().expect("temp dir");
    let output = shellmind(home.path(), &["complete", "g"]);
    assert!(output.status.success());
    assert_eq!(stdout(&output), "");
}

#[test]
fn complete_is_silent_when_server_unreachable() {
    let home = tempfile::tempdir().expect("temp dir");
    let output = shellmind(home.path(), &["complete", "terraform pl"]);
    assert!(output.status.success());
    assert_eq!(stdout(&output), "");
}

#[test]
fn complete_survives_malformed_config() {
    let home = tempfile::tempdir().expect("temp dir");
    fs_err::write(home.path().join("config.toml"), "[service\nurl = ").expect("write config");
    let output = shellmind(home.path(), &["complete", "ls -"]);
    assert!(output.status.success());
    assert_eq!(stdout(&output), "ls -la");
}

#[test]
fn init_zsh_prints_integration() {
    let home = tempfile::tempdir().expect("temp dir");
    let output = shellmind(home.path(), &["init", "zsh"]);
    assert!(output.status.success());
    let script = String::from_utf8_lossy(&output.stdout);
    assert!(script.contains("bindkey"));
    assert!(script.contains("_shellmind_precmd"));
}

#[test]
fn precmd_without_announcement_prints_nothing() {
    let home = tempfile::tempdir().expect("temp dir");
    let output = shellmind(home.path(), &["precmd", "--session", "no-such-session"]);
    assert!(output.status.success());
    assert_eq!(stdout(&output), "");
}

#[test]
fn generate_data_writes_training_table() {
    let home = tempfile::tempdir().expect("temp dir");
    let output = shellmind(home.path(), &["generate-data", "--max", "20"]);
    assert!(output.status.success());
    let table = fs_err::read_to_string(home.path().join("training/commands.jsonl"))
        .expect("read training table");
    assert_eq!(table.lines().count(), 20);
}

#[test]
fn setup_fails_without_server_binary() {
    let home = tempfile::tempdir().expect("temp dir");
    write_config(home.path());
    let output = shellmind(home.path(), &["setup"]);
    assert!(!output.status.success());
}

#[test]
fn session_without_server_announces_fallback_once() {
    let home = tempfile::tempdir().expect("temp dir");
    write_config(home.path());

    let output = shellmind(home.path(), &["session-start"]);
    assert!(output.status.success());
    let session = stdout(&output);
    assert!(!session.is_empty());

    let announcement = home
        .path()
        .join("sessions")
        .join(&session)
        .join("announcement");
    let deadline = Instant::now() + Duration::from_secs(15);
    while !announcement.exists() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(50));
    }
    assert!(announcement.exists(), "orchestrator never announced");

    let first = shellmind(home.path(), &["precmd", "--session", &session]);
    assert_eq!(stdout(&first), "shellmind: fallback mode");
    let second = shellmind(home.path(), &["precmd", "--session", &session]);
    assert_eq!(stdout(&second), "");

    let status = fs_err::read_to_string(home.path().join("sessions").join(&session).join("status.json"))
        .expect("read status");
    assert!(status.contains("\"degraded\""));

    // "git comm" still resolves from the static table in a degraded session.
    let complete = shellmind(home.path(), &["complete", "--session", &session, "git comm"]);
    assert_eq!(stdout(&complete), r#"git commit -m "commit message""#);
}
