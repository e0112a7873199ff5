//! `stratfleet launch`: bring up (or tear down) the live worker fleet.

use std::time::Duration;

use anyhow::{Context, Result, ensure};

use stratfleet_core::allocate::{self, AllocatorSettings};
use stratfleet_core::health::{
    CycleConfig, CycleOutcome, HealthVerifier, ProbeBudget, run_with_retry,
};
use stratfleet_core::supervise::{LaunchDelay, Supervisor};

use crate::config::ConfigFile;

pub async fn run_launch(
    config: &ConfigFile,
    max_parallel: Option<usize>,
    kill: bool,
) -> Result<()> {
    let live = &config.live;
    let supervisor = Supervisor::new(&live.worker);

    if kill {
        let names: Vec<String> = live.strategies.iter().map(|s| s.name.clone()).collect();
        supervisor.terminate(&names).await?;
        println!("Terminated workers for {} strategies.", names.len());
        return Ok(());
    }

    ensure!(
        !live.strategies.is_empty(),
        "no [[live.strategies]] configured; nothing to launch"
    );

    let base_contents = std::fs::read_to_string(&config.paths.base_config).with_context(|| {
        format!(
            "failed to read base config {}",
            config.paths.base_config.display()
        )
    })?;
    let base: serde_json::Value = serde_json::from_str(&base_contents).with_context(|| {
        format!(
            "failed to parse base config {}",
            config.paths.base_config.display()
        )
    })?;

    std::fs::create_dir_all(&config.paths.configs_dir)?;
    std::fs::create_dir_all(&config.paths.db_dir)?;

    let selected = allocate::select_top(
        &live.strategies,
        max_parallel.unwrap_or(live.max_parallel),
    );
    let assignments = allocate::allocate(
        &selected,
        &AllocatorSettings {
            base_port: live.base_port,
            host: live.host.clone(),
            configs_dir: config.paths.configs_dir.clone(),
            db_dir: config.paths.db_dir.clone(),
        },
    )?;

    allocate::write_url_mappings(&config.paths.url_mappings, &assignments)?;
    println!("Launching {} strategies. API URLs:", assignments.len());
    for assignment in &assignments {
        println!("  {} -> {}", assignment.name, assignment.endpoint);
    }

    let jobs: Vec<_> = assignments
        .iter()
        .map(|a| (a.clone(), allocate::overlay_config(&base, a)))
        .collect();

    let verifier = HealthVerifier::new(ProbeBudget {
        timeout: Duration::from_secs(live.health_timeout_secs),
        retries: live.health_retries,
        poll_interval: Duration::from_secs(live.health_poll_secs),
    })?;
    let cycle_config = CycleConfig {
        max_cycles: live.max_cycles,
        settle: Duration::from_secs(live.settle_secs),
        concurrency: max_parallel.unwrap_or(live.max_parallel),
        delay: LaunchDelay {
            min_ms: live.launch_delay_ms_min,
            max_ms: live.launch_delay_ms_max,
        },
    };

    match run_with_retry(&supervisor, &verifier, &jobs, &cycle_config).await? {
        CycleOutcome::AllVerified => {
            println!("DONE: launched and verified {} workers.", jobs.len());
        }
        CycleOutcome::Unverified(down) => {
            println!(
                "WARNING: {} workers never verified after {} cycles: {}",
                down.len(),
                live.max_cycles,
                down.join(", ")
            );
        }
    }
    Ok(())
}
