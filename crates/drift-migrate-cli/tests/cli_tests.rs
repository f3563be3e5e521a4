//! CLI integration tests for drift-migrate.
//!
//! These tests verify command-line argument parsing, help output,
//! and exit codes for error conditions that occur before any connection.

use assert_cmd::Command;
use predicates::prelude::*;
use drift_migrate::config::ConstantConfig;
use drift_migrate::{ConflictMode, TablePlanConfig};
use std::io::Write;

/// Get a command for the drift-migrate binary.
fn cmd() -> Command {
    Command::cargo_bin("drift-migrate").unwrap()
}

const VALID_CONFIG: &str = "\
source:
  host: localhost
  database: webui_old
  user: postgres
target:
  host: localhost
  database: webui_new
  user: postgres
migration:
  tables:
    - table: config
";

fn config_file(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{}", content).unwrap();
    file
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_shows_all_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("compare"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("health-check"));
}

#[test]
fn test_run_subcommand_help() {
    cmd()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--dry-run"))
        .stdout(predicate::str::contains("--source-schema"))
        .stdout(predicate::str::contains("--target-schema"))
        .stdout(predicate::str::contains("--batch-size"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("drift-migrate"));
}

// =============================================================================
// Global Flags Tests
// =============================================================================

#[test]
fn test_global_flag_defaults() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--shutdown-timeout"))
        .stdout(predicate::str::contains("[default: 60]"))
        .stdout(predicate::str::contains("--output-json"))
        .stdout(predicate::str::contains("--log-format"))
        .stdout(predicate::str::contains("[default: text]"))
        .stdout(predicate::str::contains("--verbosity"))
        .stdout(predicate::str::contains("[default: info]"))
        .stdout(predicate::str::contains("[default: config.yaml]"));
}

#[test]
fn test_short_config_flag() {
    cmd()
        .args(["-c", "some_config.yaml", "--help"])
        .assert()
        .success();
}

// =============================================================================
// Exit Code Tests
// =============================================================================

#[test]
fn test_missing_config_exits_with_code_7() {
    // Missing file is an IO error (code 7), not config error (code 1)
    cmd()
        .args(["--config", "nonexistent_config_file.yaml", "health-check"])
        .assert()
        .code(7);
}

#[test]
fn test_invalid_yaml_exits_with_code_1() {
    let file = config_file("invalid: yaml: content: [\n");

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(1);
}

#[test]
fn test_empty_config_exits_with_code_1() {
    let file = config_file("");

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(1);
}

#[test]
fn test_missing_required_fields_exits_with_code_1() {
    let file = config_file("source:\n  host: localhost\n");

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "compare"])
        .assert()
        .code(1);
}

#[test]
fn test_same_source_and_target_rejected() {
    let file = config_file(&VALID_CONFIG.replace("webui_new", "webui_old"));

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "run"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Configuration error"));
}

#[test]
fn test_zero_batch_size_override_rejected_before_connecting() {
    let file = config_file(VALID_CONFIG);

    cmd()
        .args([
            "--config",
            file.path().to_str().unwrap(),
            "run",
            "--batch-size",
            "0",
        ])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("batch_size"));
}

#[test]
fn test_unreachable_database_exits_with_code_2() {
    // Nothing listens on port 1.
    let file = config_file(
        "\
source:
  host: 127.0.0.1
  port: 1
  database: webui_old
  user: postgres
target:
  host: 127.0.0.1
  port: 1
  database: webui_new
  user: postgres
migration:
  connect_timeout_secs: 1
",
    );

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "compare"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Cannot connect"));
}

// =============================================================================
// Subcommand Existence Tests
// =============================================================================

#[test]
fn test_health_check_command_exists() {
    cmd()
        .args(["health-check", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Test database connections"));
}

#[test]
fn test_validate_command_exists() {
    cmd()
        .args(["validate", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Validate row counts"));
}

#[test]
fn test_compare_command_exists() {
    cmd()
        .args(["compare", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Compare source and target schemas"));
}

#[test]
fn test_no_subcommand_shows_help() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn test_example_config_is_valid() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config.example.yaml");
    let config = drift_migrate::Config::load(path).unwrap();
    let tables = &config.migration.tables;
    let names: Vec<&str> = tables.iter().map(|t| t.table.as_str()).collect();
    assert_eq!(
        names,
        vec!["group", "user", "chat", "channel", "channel_member", "knowledge", "message", "file"]
    );

    let source_columns = |table: &TablePlanConfig| -> Vec<String> {
        table.columns.iter().map(|c| c.source().to_string()).collect()
    };

    let chat = &tables[2];
    assert!(chat.is_authored());
    assert_eq!(chat.columns.len(), 11);
    assert!(!source_columns(chat).contains(&"template_id".to_string()));

    let member = &tables[4];
    assert_eq!(source_columns(member), vec!["id", "channel_id", "user_id", "created_at"]);
    let constants: Vec<&str> = member.constants.keys().map(String::as_str).collect();
    assert_eq!(
        constants,
        vec!["is_active", "is_channel_muted", "is_channel_pinned", "joined_at"]
    );
    assert!(matches!(
        member.constants.get("is_channel_muted"),
        Some(ConstantConfig::Value { value }) if *value == serde_json::json!(false)
    ));

    assert!(tables[3].is_authored());
    assert!(tables[6].is_authored());
    assert!(!tables[7].is_authored());
    assert_eq!(tables[7].mode, Some(ConflictMode::Merge));
}
