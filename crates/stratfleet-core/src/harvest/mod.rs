//! Result artifact harvesting and attribution.
//!
//! The backtest tool drops artifacts named `<prefix>...json` into the shared
//! working directory, alongside `.meta.json` companions that carry no result
//! data. The harvester deletes the companions, picks the most recent real
//! artifact, attributes its records to the strategies of the batch that
//! produced it, and deletes the artifact once consumed.
//!
//! "Most recent" is defined as the lexicographically greatest file name; the
//! tool's timestamped naming scheme guarantees that name order is recency
//! order. Do not replace this with mtime-based selection without also
//! changing the tests that pin the contract.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::status::{StatusStore, UnitStatus};

/// Status message recorded for a strategy absent from the harvested records.
pub const NO_RESULTS: &str = "No results found";

/// What a harvest pass did for one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HarvestOutcome {
    /// An artifact was consumed; `saved` strategies got results, `missing`
    /// strategies were not present in the records.
    Applied { saved: usize, missing: usize },
    /// No candidate artifact was found; statuses were left untouched.
    NoArtifacts,
}

/// Locates, attributes, and consumes result artifacts.
#[derive(Debug, Clone)]
pub struct Harvester {
    working_dir: PathBuf,
    results_dir: PathBuf,
    artifact_prefix: String,
}

impl Harvester {
    pub fn new(
        working_dir: impl Into<PathBuf>,
        results_dir: impl Into<PathBuf>,
        artifact_prefix: impl Into<String>,
    ) -> Self {
        Self {
            working_dir: working_dir.into(),
            results_dir: results_dir.into(),
            artifact_prefix: artifact_prefix.into(),
        }
    }

    /// Harvest the latest artifact for one batch.
    ///
    /// Every strategy in `batch` ends up either `Success` (record found and
    /// saved to `<results_dir>/<name>_result.json`) or `Error("No results
    /// found")`. An unreadable or unparseable artifact is an error; the
    /// caller escalates it to a batch-level failure.
    pub fn harvest_batch(
        &self,
        store: &mut StatusStore,
        batch: &[String],
    ) -> Result<HarvestOutcome> {
        let Some(artifact) = self.latest_artifact()? else {
            warn!(
                prefix = %self.artifact_prefix,
                dir = %self.working_dir.display(),
                "no result artifacts found"
            );
            return Ok(HarvestOutcome::NoArtifacts);
        };

        let contents = std::fs::read_to_string(&artifact)
            .with_context(|| format!("failed to read artifact {}", artifact.display()))?;
        let parsed: serde_json::Value = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse artifact {}", artifact.display()))?;

        // Absent comparison section just means no strategy got results.
        let records = parsed
            .get("strategy_comparison")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        std::fs::create_dir_all(&self.results_dir).with_context(|| {
            format!(
                "failed to create results directory {}",
                self.results_dir.display()
            )
        })?;

        let mut saved = 0;
        let mut missing = 0;
        for name in batch {
            let record = records
                .iter()
                .find(|r| r.get("key").and_then(|k| k.as_str()) == Some(name));
            match record {
                Some(record) => {
                    let result_path = self.results_dir.join(format!("{name}_result.json"));
                    let pretty = serde_json::to_string_pretty(record)?;
                    std::fs::write(&result_path, pretty).with_context(|| {
                        format!("failed to write result file {}", result_path.display())
                    })?;
                    store.set(name, UnitStatus::Success)?;
                    saved += 1;
                    info!(strategy = %name, "results saved");
                }
                None => {
                    store.set(name, UnitStatus::Error(NO_RESULTS.to_owned()))?;
                    missing += 1;
                    warn!(strategy = %name, "no results found in artifact");
                }
            }
        }

        std::fs::remove_file(&artifact).with_context(|| {
            format!("failed to delete consumed artifact {}", artifact.display())
        })?;
        debug!(artifact = %artifact.display(), "deleted consumed artifact");

        Ok(HarvestOutcome::Applied { saved, missing })
    }

    /// Find the most recent candidate artifact, deleting `.meta.json`
    /// companions along the way. Returns `None` when no real artifact exists.
    fn latest_artifact(&self) -> Result<Option<PathBuf>> {
        let entries = std::fs::read_dir(&self.working_dir).with_context(|| {
            format!(
                "failed to scan working directory {}",
                self.working_dir.display()
            )
        })?;

        let mut candidates: Vec<String> = Vec::new();
        for entry in entries {
            let entry = entry?;
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if !name.starts_with(&self.artifact_prefix) {
                continue;
            }
            if name.ends_with(".meta.json") {
                let path = entry.path();
                std::fs::remove_file(&path).with_context(|| {
                    format!("failed to delete metadata companion {}", path.display())
                })?;
                debug!(file = %name, "deleted metadata companion");
            } else {
                candidates.push(name);
            }
        }

        // Lexicographic descending: the greatest name is the newest artifact.
        candidates.sort_unstable_by(|a, b| b.cmp(a));
        Ok(candidates
            .into_iter()
            .next()
            .map(|name| self.working_dir.join(name)))
    }
}
