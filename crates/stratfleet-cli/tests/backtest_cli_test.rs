//! End-to-end CLI tests: run the built `stratfleet` binary against a
//! temporary project layout with a fake backtest tool.

use std::path::{Path, PathBuf};
use std::process::Command;

fn bin() -> &'static str {
    env!("CARGO_BIN_EXE_stratfleet")
}

/// Lay out a temp project: strategies dir, fake tool, and a config file
/// whose paths all point inside the temp dir. Returns the config path.
fn setup_project(dir: &Path, strategies: &[&str]) -> PathBuf {
    let strategies_dir = dir.join("strategies");
    std::fs::create_dir_all(&strategies_dir).unwrap();
    for name in strategies {
        std::fs::write(strategies_dir.join(format!("{name}.py")), "# strategy").unwrap();
    }

    let tool = dir.join("run_backtest.sh");
    std::fs::write(
        &tool,
        r#"#!/bin/sh
out=BACKTESTING_RESULT_001.json
printf '{"strategy_comparison": [' > "$out"
first=1
for name in $1; do
  [ "$first" = 1 ] || printf ',' >> "$out"
  printf '{"key": "%s", "total_profit_percent": 4.2}' "$name" >> "$out"
  first=0
done
printf ']}' >> "$out"
"#,
    )
    .unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    let config_path = dir.join("config.toml");
    std::fs::write(
        &config_path,
        format!(
            r#"
[paths]
strategies_dir = "{strategies}"
results_dir = "{results}"
working_dir = "{working}"

[backtest]
tool = "{tool}"
batch_size = 20
"#,
            strategies = strategies_dir.display(),
            results = dir.join("results").display(),
            working = dir.display(),
            tool = tool.display(),
        ),
    )
    .unwrap();
    config_path
}

#[test]
fn backtest_processes_discovered_strategies() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = setup_project(dir.path(), &["Alpha", "Beta"]);

    let output = Command::new(bin())
        .args(["backtest", "--config"])
        .arg(&config)
        .output()
        .expect("failed to run stratfleet");
    assert!(
        output.status.success(),
        "backtest failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    // Tracker records both strategies as successes in the legacy shape.
    let tracker: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("results/success_tracker.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(tracker["Alpha"], 1);
    assert_eq!(tracker["Beta"], 1);

    assert!(dir.path().join("results/Alpha_result.json").exists());
    assert!(dir.path().join("results/Beta_result.json").exists());
}

#[test]
fn second_backtest_run_has_nothing_pending() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = setup_project(dir.path(), &["Alpha"]);

    let run = |args: &[&str]| {
        Command::new(bin())
            .args(args)
            .args(["--config"])
            .arg(&config)
            .output()
            .expect("failed to run stratfleet")
    };

    assert!(run(&["backtest"]).status.success());
    let second = run(&["backtest"]);
    assert!(second.status.success());
    let stdout = String::from_utf8_lossy(&second.stdout);
    assert!(
        stdout.contains("Nothing pending"),
        "unexpected output: {stdout}"
    );
}

#[test]
fn status_summarizes_the_tracker() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = setup_project(dir.path(), &["Alpha", "Beta"]);

    assert!(
        Command::new(bin())
            .args(["backtest", "--config"])
            .arg(&config)
            .output()
            .unwrap()
            .status
            .success()
    );

    let output = Command::new(bin())
        .args(["status", "--config"])
        .arg(&config)
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Tracked strategies: 2"), "got: {stdout}");
    assert!(stdout.contains("success: 2"), "got: {stdout}");
}

#[test]
fn init_writes_a_loadable_default_config() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = dir.path().join("fresh/config.toml");

    let output = Command::new(bin())
        .args(["init", "--config"])
        .arg(&config)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "init failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(config.exists());

    // A second init without --force must refuse.
    let again = Command::new(bin())
        .args(["init", "--config"])
        .arg(&config)
        .output()
        .unwrap();
    assert!(!again.status.success());
}

#[test]
fn launch_without_configured_strategies_fails_cleanly() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = setup_project(dir.path(), &[]);

    let output = Command::new(bin())
        .args(["launch", "--config"])
        .arg(&config)
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("no [[live.strategies]] configured"),
        "got: {stderr}"
    );
}
