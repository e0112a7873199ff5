//! Sequential batch scheduling over the pending strategy set.
//!
//! Batches never overlap: the external tool and the artifact harvest both
//! work through one shared working directory, so concurrent invocations
//! would make artifact attribution ambiguous. A failing batch marks its own
//! strategies and moves on; it never blocks or corrupts sibling batches.

use anyhow::{Result, ensure};
use tracing::{error, info};

use crate::harvest::Harvester;
use crate::invoke::ToolCommand;
use crate::status::{StatusStore, UnitStatus};

/// Counts reported after a scheduler run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Batches executed.
    pub batches: usize,
    /// Strategies whose results were harvested and saved.
    pub saved: usize,
    /// Strategies marked `Error` (tool failure, harvest failure, or missing
    /// from the harvested records).
    pub errored: usize,
}

/// Drives the external tool over fixed-size batches of pending strategies.
#[derive(Debug)]
pub struct BatchRunner {
    tool: ToolCommand,
    harvester: Harvester,
    batch_size: usize,
}

impl BatchRunner {
    pub fn new(tool: ToolCommand, harvester: Harvester, batch_size: usize) -> Self {
        Self {
            tool,
            harvester,
            batch_size,
        }
    }

    /// Run every batch in order, persisting status after each one.
    ///
    /// The pending list is partitioned contiguously without reordering, so
    /// for N pending strategies and batch size B there are exactly
    /// ceil(N/B) batches covering each strategy once.
    pub async fn run(&self, store: &mut StatusStore, pending: &[String]) -> Result<BatchSummary> {
        ensure!(self.batch_size >= 1, "batch size must be at least 1");

        let mut summary = BatchSummary::default();
        let total = pending.len().div_ceil(self.batch_size);

        for (i, batch) in pending.chunks(self.batch_size).enumerate() {
            info!(batch = i + 1, total, size = batch.len(), "running batch");
            summary.batches += 1;

            let outcome = self.tool.run(batch).await;
            if !outcome.success() {
                let message = outcome.error_text();
                error!(batch = i + 1, error = %message, "tool invocation failed");
                summary.errored += self.mark_batch_error(store, batch, &message)?;
                continue;
            }

            match self.harvester.harvest_batch(store, batch) {
                Ok(crate::harvest::HarvestOutcome::Applied { saved, missing }) => {
                    summary.saved += saved;
                    summary.errored += missing;
                }
                Ok(crate::harvest::HarvestOutcome::NoArtifacts) => {
                    // Statuses stay pending; a later run picks them up again.
                }
                Err(e) => {
                    // An unreadable artifact fails the whole batch, not part
                    // of it.
                    let message = format!("harvest failed: {e:#}");
                    error!(batch = i + 1, error = %message, "harvest failed");
                    summary.errored += self.mark_batch_error(store, batch, &message)?;
                }
            }
        }

        Ok(summary)
    }

    /// Mark every strategy in the batch as errored, persisting as it goes.
    fn mark_batch_error(
        &self,
        store: &mut StatusStore,
        batch: &[String],
        message: &str,
    ) -> Result<usize> {
        for name in batch {
            store.set(name, UnitStatus::Error(message.to_owned()))?;
        }
        Ok(batch.len())
    }
}
