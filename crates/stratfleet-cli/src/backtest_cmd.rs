//! `stratfleet backtest`: run the batch backtest pipeline.

use anyhow::{Context, Result};

use stratfleet_core::batch::BatchRunner;
use stratfleet_core::harvest::Harvester;
use stratfleet_core::invoke::ToolCommand;
use stratfleet_core::status::StatusStore;

use crate::config::ConfigFile;

/// Discover the strategy population: one name per file with the configured
/// extension, sorted for a reproducible discovery order.
pub fn discover_strategies(config: &ConfigFile) -> Result<Vec<String>> {
    let dir = &config.paths.strategies_dir;
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to list strategies directory {}", dir.display()))?;

    let mut names = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some(config.backtest.strategy_ext.as_str())
        {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_owned());
            }
        }
    }
    names.sort();
    Ok(names)
}

/// Load the tracker for the discovered population.
pub fn load_store(config: &ConfigFile) -> Result<StatusStore> {
    let discovered = discover_strategies(config)?;
    std::fs::create_dir_all(&config.paths.results_dir).with_context(|| {
        format!(
            "failed to create results directory {}",
            config.paths.results_dir.display()
        )
    })?;
    StatusStore::load(
        config.paths.results_dir.join("success_tracker.json"),
        &discovered,
    )
}

pub async fn run_backtest(
    config: &ConfigFile,
    retry_errors: bool,
    batch_size: Option<usize>,
) -> Result<()> {
    let mut store = load_store(config)?;
    let pending = store.pending(retry_errors)?;

    if pending.is_empty() {
        println!("Nothing pending; all strategies are processed.");
        return Ok(());
    }
    println!("{} strategies pending.", pending.len());

    let runner = BatchRunner::new(
        ToolCommand::new(&config.backtest.tool, &config.paths.working_dir),
        Harvester::new(
            &config.paths.working_dir,
            &config.paths.results_dir,
            &config.backtest.artifact_prefix,
        ),
        batch_size.unwrap_or(config.backtest.batch_size),
    );
    let summary = runner.run(&mut store, &pending).await?;

    println!(
        "Backtesting completed: {} batches, {} saved, {} errored. Results in {}",
        summary.batches,
        summary.saved,
        summary.errored,
        config.paths.results_dir.display()
    );
    Ok(())
}
