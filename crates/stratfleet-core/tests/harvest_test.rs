//! Artifact attribution tests: metadata deletion, lexicographic selection,
//! and exactly-once consumption.

use std::path::Path;

use stratfleet_core::harvest::{HarvestOutcome, Harvester, NO_RESULTS};
use stratfleet_core::status::{StatusStore, UnitStatus};

const PREFIX: &str = "BACKTESTING_RESULT";

fn names(v: &[&str]) -> Vec<String> {
    v.iter().map(|s| (*s).to_owned()).collect()
}

fn setup(dir: &Path, discovered: &[String]) -> (StatusStore, Harvester) {
    let results_dir = dir.join("results");
    let store = StatusStore::load(results_dir.join("success_tracker.json"), discovered).unwrap();
    (store, Harvester::new(dir, &results_dir, PREFIX))
}

fn write_artifact(dir: &Path, file_name: &str, keys: &[&str]) {
    let records: Vec<serde_json::Value> = keys
        .iter()
        .map(|k| serde_json::json!({"key": k, "total_profit_percent": 5.0}))
        .collect();
    let artifact = serde_json::json!({"strategy_comparison": records});
    std::fs::write(dir.join(file_name), artifact.to_string()).unwrap();
}

#[test]
fn attributes_records_and_deletes_consumed_artifact() {
    let dir = tempfile::TempDir::new().unwrap();
    let units = names(&["X", "Y", "Z"]);
    let (mut store, harvester) = setup(dir.path(), &units);

    let artifact = "BACKTESTING_RESULT_2024-01-01.json";
    write_artifact(dir.path(), artifact, &["X", "Y"]);

    let outcome = harvester.harvest_batch(&mut store, &units).unwrap();
    assert_eq!(
        outcome,
        HarvestOutcome::Applied {
            saved: 2,
            missing: 1
        }
    );

    assert_eq!(store.get("X"), Some(&UnitStatus::Success));
    assert_eq!(store.get("Y"), Some(&UnitStatus::Success));
    assert_eq!(
        store.get("Z"),
        Some(&UnitStatus::Error(NO_RESULTS.to_owned()))
    );

    assert!(dir.path().join("results/X_result.json").exists());
    assert!(dir.path().join("results/Y_result.json").exists());
    assert!(!dir.path().join("results/Z_result.json").exists());
    assert!(
        !dir.path().join(artifact).exists(),
        "consumed artifact must be deleted"
    );
}

#[test]
fn saved_result_contains_the_units_record() {
    let dir = tempfile::TempDir::new().unwrap();
    let units = names(&["X"]);
    let (mut store, harvester) = setup(dir.path(), &units);

    write_artifact(dir.path(), "BACKTESTING_RESULT_1.json", &["X"]);
    harvester.harvest_batch(&mut store, &units).unwrap();

    let saved: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("results/X_result.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(saved["key"], "X");
    assert_eq!(saved["total_profit_percent"], 5.0);
}

#[test]
fn metadata_companions_are_deleted_and_never_parsed() {
    let dir = tempfile::TempDir::new().unwrap();
    let units = names(&["X"]);
    let (mut store, harvester) = setup(dir.path(), &units);

    // The meta file sorts after the data file; if it were treated as data it
    // would be selected and fail to parse.
    std::fs::write(
        dir.path().join("BACKTESTING_RESULT_9.meta.json"),
        "not even json",
    )
    .unwrap();
    write_artifact(dir.path(), "BACKTESTING_RESULT_1.json", &["X"]);

    let outcome = harvester.harvest_batch(&mut store, &units).unwrap();
    assert_eq!(
        outcome,
        HarvestOutcome::Applied {
            saved: 1,
            missing: 0
        }
    );
    assert!(!dir.path().join("BACKTESTING_RESULT_9.meta.json").exists());
}

#[test]
fn selects_lexicographically_greatest_artifact() {
    let dir = tempfile::TempDir::new().unwrap();
    let units = names(&["X"]);
    let (mut store, harvester) = setup(dir.path(), &units);

    // The older artifact has the record; the newer one does not. Selecting
    // by name order must pick the newer file and report X as missing.
    write_artifact(dir.path(), "BACKTESTING_RESULT_2024-01-01.json", &["X"]);
    write_artifact(dir.path(), "BACKTESTING_RESULT_2024-06-01.json", &[]);

    harvester.harvest_batch(&mut store, &units).unwrap();
    assert_eq!(
        store.get("X"),
        Some(&UnitStatus::Error(NO_RESULTS.to_owned()))
    );
    assert!(
        !dir.path().join("BACKTESTING_RESULT_2024-06-01.json").exists(),
        "the selected artifact is consumed"
    );
    assert!(
        dir.path().join("BACKTESTING_RESULT_2024-01-01.json").exists(),
        "older artifacts are left alone"
    );
}

#[test]
fn no_artifacts_is_reported_without_touching_statuses() {
    let dir = tempfile::TempDir::new().unwrap();
    let units = names(&["X"]);
    let (mut store, harvester) = setup(dir.path(), &units);

    let outcome = harvester.harvest_batch(&mut store, &units).unwrap();
    assert_eq!(outcome, HarvestOutcome::NoArtifacts);
    assert_eq!(store.get("X"), Some(&UnitStatus::Pending));
}

#[test]
fn files_without_the_prefix_are_ignored() {
    let dir = tempfile::TempDir::new().unwrap();
    let units = names(&["X"]);
    let (mut store, harvester) = setup(dir.path(), &units);

    std::fs::write(dir.path().join("unrelated.json"), "{}").unwrap();
    let outcome = harvester.harvest_batch(&mut store, &units).unwrap();
    assert_eq!(outcome, HarvestOutcome::NoArtifacts);
    assert!(dir.path().join("unrelated.json").exists());
}

#[test]
fn unreadable_artifact_is_an_error() {
    let dir = tempfile::TempDir::new().unwrap();
    let units = names(&["X"]);
    let (mut store, harvester) = setup(dir.path(), &units);

    std::fs::write(dir.path().join("BACKTESTING_RESULT_1.json"), "{broken").unwrap();
    assert!(harvester.harvest_batch(&mut store, &units).is_err());
}

#[test]
fn overwrites_prior_result_for_the_same_unit() {
    let dir = tempfile::TempDir::new().unwrap();
    let units = names(&["X"]);
    let (mut store, harvester) = setup(dir.path(), &units);

    write_artifact(dir.path(), "BACKTESTING_RESULT_1.json", &["X"]);
    harvester.harvest_batch(&mut store, &units).unwrap();

    // A fresh artifact with different numbers replaces the saved result.
    let artifact = serde_json::json!({
        "strategy_comparison": [{"key": "X", "total_profit_percent": 9.9}]
    });
    std::fs::write(
        dir.path().join("BACKTESTING_RESULT_2.json"),
        artifact.to_string(),
    )
    .unwrap();
    harvester.harvest_batch(&mut store, &units).unwrap();

    let saved: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("results/X_result.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(saved["total_profit_percent"], 9.9);
}
