//! End-to-end tests running the real `goclaw` binary with an isolated HOME,
//! so the default config/history/store paths all land in a tempdir.

use std::path::Path;
use std::process::{Command, Output};

fn goclaw(home: &Path, args: &[&str]) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_goclaw"));
    cmd.args(args)
        .env("HOME", home)
        .env_remove("XDG_CONFIG_HOME")
        .current_dir(home);
    cmd
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn write_config(home: &Path, config: serde_json::Value) -> std::path::PathBuf {
    let dir = home.join(".goclaw");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("config.json");
    std::fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();
    path
}

fn minimal_config() -> serde_json::Value {
    serde_json::json!({
        "providers": [{ "name": "openai", "api_key": "sk-live-secret", "priority": 1 }],
    })
}

#[test]
fn help_lists_the_command_tree() {
    let home = tempfile::tempdir().unwrap();
    let output = goclaw(home.path(), &["--help"]).output().unwrap();
    assert!(output.status.success());
    let text = stdout(&output);
    for subcommand in ["gateway", "memory", "channels", "config", "onboard", "configure"] {
        assert!(text.contains(subcommand), "help should mention {subcommand}:\n{text}");
    }
}

#[test]
fn config_show_prints_redacted_snapshot() {
    let home = tempfile::tempdir().unwrap();
    write_config(home.path(), minimal_config());

    let output = goclaw(home.path(), &["config", "show"]).output().unwrap();
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let text = stdout(&output);
    assert!(text.contains("***redacted***"));
    assert!(!text.contains("sk-live-secret"));
}

#[test]
fn env_override_reaches_the_effective_config() {
    let home = tempfile::tempdir().unwrap();
    write_config(home.path(), minimal_config());

    let output = goclaw(home.path(), &["config", "show"])
        .env("GOSKILLS_GATEWAY_PORT", "9123")
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(stdout(&output).contains("9123"));
}

#[test]
fn invalid_config_fails_with_exit_code_one() {
    let home = tempfile::tempdir().unwrap();
    let path = write_config(home.path(), minimal_config());
    std::fs::write(&path, "not valid json {{{").unwrap();

    let output = goclaw(home.path(), &["config", "show"]).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn gateway_history_reports_empty_when_nothing_recorded() {
    let home = tempfile::tempdir().unwrap();
    write_config(home.path(), minimal_config());

    let output = goclaw(home.path(), &["gateway", "history"]).output().unwrap();
    assert!(output.status.success());
    assert!(stdout(&output).contains("no config history"));
}

#[test]
fn gateway_reload_records_a_history_entry() {
    let home = tempfile::tempdir().unwrap();
    write_config(home.path(), minimal_config());

    let reload = goclaw(home.path(), &["gateway", "reload"]).output().unwrap();
    assert!(reload.status.success(), "stderr: {}", String::from_utf8_lossy(&reload.stderr));

    let history = goclaw(home.path(), &["gateway", "history"]).output().unwrap();
    assert!(history.status.success());
    let text = stdout(&history);
    assert!(text.contains("[0]"), "expected a recorded entry:\n{text}");
    assert!(text.contains("Manual"));
}

#[test]
fn channels_status_flags_enabled_channel_without_credentials() {
    let home = tempfile::tempdir().unwrap();
    let mut config = minimal_config();
    config["channels"] = serde_json::json!({ "telegram": { "enabled": true, "account_id": "main" } });
    write_config(home.path(), config);

    let output = goclaw(home.path(), &["channels", "status"]).output().unwrap();
    assert!(output.status.success());
    assert!(stdout(&output).contains("missing credentials"));
}

#[test]
fn memory_backend_reports_sqlite_store() {
    let home = tempfile::tempdir().unwrap();
    write_config(home.path(), minimal_config());

    let output = goclaw(home.path(), &["memory", "backend"]).output().unwrap();
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("sqlite"));
    assert!(text.contains("store.db"));
}

#[test]
fn memory_status_counts_an_empty_store() {
    let home = tempfile::tempdir().unwrap();
    write_config(home.path(), minimal_config());

    let output = goclaw(home.path(), &["memory", "status"]).output().unwrap();
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout(&output).contains("records: 0"));
}

#[test]
fn onboard_prints_guidance_and_exits_zero() {
    let home = tempfile::tempdir().unwrap();
    let output = goclaw(home.path(), &["onboard"]).output().unwrap();
    assert!(output.status.success());
    assert!(stdout(&output).contains("config"));
}
