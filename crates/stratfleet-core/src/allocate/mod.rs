//! Exclusive resource allocation for live workers.
//!
//! Selection and allocation are pure functions of their input plus the
//! configured base port and directories: no hidden counters, so re-running
//! with the same profiles always reproduces the same assignments.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A live-run candidate as declared in the fleet config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyProfile {
    /// Strategy name; must be unique within the fleet.
    pub name: String,
    /// Candle timeframe the strategy operates on (e.g. `"1m"`, `"5m"`).
    pub timeframe: String,
    /// Fitness score used for ranking (backtested total profit percent).
    pub fitness: f64,
}

/// Exclusive resources assigned to one worker for the duration of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerAssignment {
    pub name: String,
    pub timeframe: String,
    /// Exclusive API listen port.
    pub port: u16,
    /// Path of the generated per-worker config file.
    pub config_path: PathBuf,
    /// Persistent-storage locator passed to the worker (`sqlite:///...`).
    pub db_url: String,
    /// Health-check endpoint (`http://<host>:<port>`).
    pub endpoint: String,
}

/// Fatal allocation problems. These indicate a configuration bug, not a
/// runtime condition to retry.
#[derive(Debug, Error)]
pub enum AllocationError {
    #[error("duplicate strategy name in selection: {0:?}")]
    DuplicateName(String),
    #[error("port range exhausted: base port {base} + {count} workers overflows")]
    PortRangeExhausted { base: u16, count: usize },
}

/// Inputs shared by every assignment in one allocation pass.
#[derive(Debug, Clone)]
pub struct AllocatorSettings {
    pub base_port: u16,
    pub host: String,
    pub configs_dir: PathBuf,
    pub db_dir: PathBuf,
}

/// Pick the top `max_parallel` profiles by fitness, descending.
///
/// The sort is stable, so profiles with equal fitness keep their declared
/// order.
pub fn select_top(profiles: &[StrategyProfile], max_parallel: usize) -> Vec<StrategyProfile> {
    let mut sorted = profiles.to_vec();
    sorted.sort_by(|a, b| {
        b.fitness
            .partial_cmp(&a.fitness)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    sorted.truncate(max_parallel);
    sorted
}

/// Assign each selected profile a strictly increasing port from the base,
/// plus its derived config path and storage locator.
pub fn allocate(
    selected: &[StrategyProfile],
    settings: &AllocatorSettings,
) -> Result<Vec<WorkerAssignment>, AllocationError> {
    let mut seen = HashSet::new();
    let mut assignments = Vec::with_capacity(selected.len());

    for (rank, profile) in selected.iter().enumerate() {
        if !seen.insert(profile.name.as_str()) {
            return Err(AllocationError::DuplicateName(profile.name.clone()));
        }

        let offset = u16::try_from(rank)
            .ok()
            .and_then(|r| settings.base_port.checked_add(r));
        let Some(port) = offset else {
            return Err(AllocationError::PortRangeExhausted {
                base: settings.base_port,
                count: selected.len(),
            });
        };

        let db_path = settings.db_dir.join(format!("{}.live.sqlite", profile.name));
        assignments.push(WorkerAssignment {
            name: profile.name.clone(),
            timeframe: profile.timeframe.clone(),
            port,
            config_path: settings
                .configs_dir
                .join(format!("config_{}.json", profile.name)),
            db_url: format!("sqlite:///{}", db_path.display()),
            endpoint: format!("http://{}:{}", settings.host, port),
        });
    }

    Ok(assignments)
}

/// Overlay worker-specific fields onto the shared base config.
///
/// Sets the strategy timeframe, the exclusive API listen port, and the
/// operating throttle interval. Missing intermediate objects are created so
/// a minimal base config still works.
pub fn overlay_config(base: &serde_json::Value, assignment: &WorkerAssignment) -> serde_json::Value {
    let mut obj = match base.clone() {
        serde_json::Value::Object(obj) => obj,
        _ => serde_json::Map::new(),
    };

    obj.insert(
        "timeframe".to_owned(),
        serde_json::json!(assignment.timeframe),
    );

    let api_server = obj
        .entry("api_server".to_owned())
        .or_insert_with(|| serde_json::json!({}));
    if let Some(api) = api_server.as_object_mut() {
        api.insert("listen_port".to_owned(), serde_json::json!(assignment.port));
    }

    let internals = obj
        .entry("internals".to_owned())
        .or_insert_with(|| serde_json::json!({}));
    if let Some(internals) = internals.as_object_mut() {
        internals.insert(
            "process_throttle_secs".to_owned(),
            serde_json::json!(throttle_secs(&assignment.timeframe)),
        );
    }

    serde_json::Value::Object(obj)
}

/// Operating interval derived from the timeframe: tighter timeframes poll
/// the exchange more often, coarser ones back off to stay under its rate
/// limit.
fn throttle_secs(timeframe: &str) -> u64 {
    match timeframe {
        "1m" => 5,
        "5m" => 7,
        _ => 10,
    }
}

/// Write the strategy -> endpoint mapping for external consumers.
///
/// The file is rewritten wholesale on every launch cycle: one entry per
/// assignment, never a partial update.
pub fn write_url_mappings(path: &Path, assignments: &[WorkerAssignment]) -> Result<()> {
    let mut map = serde_json::Map::with_capacity(assignments.len());
    for assignment in assignments {
        map.insert(
            assignment.name.clone(),
            serde_json::json!(assignment.endpoint),
        );
    }
    let contents = serde_json::to_string_pretty(&map)?;
    std::fs::write(path, contents)
        .with_context(|| format!("failed to write URL mappings to {}", path.display()))?;
    Ok(())
}
