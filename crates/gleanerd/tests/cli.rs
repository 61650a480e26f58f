//! Integration tests for the gleaner binary.
//!
//! Every test runs in its own temporary directory with no reachable network services, so the
//! binary only ever sees refused connections.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

// Helper function to create a clean command instance
fn gleaner(dir: &Path) -> Command {
  let mut cmd = Command::cargo_bin("gleaner").unwrap();
  cmd.current_dir(dir).env_remove("GLEANER_MAIL_TOKEN").env_remove("GLEANER_RECIPIENTS");
  cmd
}

// Writes a configuration whose paths all live under `dir`
fn write_config(dir: &Path, digest: &str) -> anyhow::Result<std::path::PathBuf> {
  let path = dir.join("gleaner.toml");
  let content = format!(
    r#"
base_url = "http://127.0.0.1:1/api/query"
paper_dir = '{papers}'
database_path = '{db}'
request_timeout_secs = 2

[[searches]]
query = "all:jailbreak"

[digest]
{digest}
"#,
    papers = dir.join("papers").display(),
    db = dir.join("gleaner.db").display(),
  );
  std::fs::write(&path, content)?;
  Ok(path)
}

#[test]
fn test_help() {
  let dir = tempdir().unwrap();
  gleaner(dir.path())
    .arg("--help")
    .assert()
    .success()
    .stdout(predicate::str::contains("--config"));
}

#[test]
fn test_missing_config_fails() {
  let dir = tempdir().unwrap();
  gleaner(dir.path())
    .arg("--config")
    .arg(dir.path().join("absent.toml"))
    .assert()
    .failure()
    .stderr(predicate::str::contains("Configuration file not found"));
}

#[test]
fn test_missing_relay_token_fails_before_running() -> anyhow::Result<()> {
  let dir = tempdir()?;
  let config = write_config(
    dir.path(),
    "recipients = [\"reader@example.com\"]\nendpoint = \"http://127.0.0.1:1/send\"",
  )?;

  gleaner(dir.path())
    .arg("--config")
    .arg(&config)
    .assert()
    .failure()
    .stderr(predicate::str::contains("GLEANER_MAIL_TOKEN"));

  assert!(!dir.path().join("gleaner.db").exists());
  Ok(())
}

#[test]
fn test_offline_run_completes() -> anyhow::Result<()> {
  let dir = tempdir()?;
  let config = write_config(dir.path(), "")?;

  gleaner(dir.path())
    .arg("--config")
    .arg(&config)
    .assert()
    .success()
    .stdout(predicate::str::contains("Run complete"));

  assert!(dir.path().join("gleaner.db").is_file());
  assert!(!dir.path().join("gleaner.lock").exists());
  Ok(())
}

#[test]
fn test_held_lock_refuses_second_run() -> anyhow::Result<()> {
  let dir = tempdir()?;
  let config = write_config(dir.path(), "")?;
  std::fs::write(dir.path().join("gleaner.lock"), std::process::id().to_string())?;

  gleaner(dir.path()).arg("--config").arg(&config).assert().failure();

  assert!(dir.path().join("gleaner.lock").exists());
  Ok(())
}
