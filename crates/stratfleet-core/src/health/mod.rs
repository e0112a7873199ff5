//! Worker health verification and bounded relaunch cycles.
//!
//! Each worker exposes an HTTP endpoint that answers 200 once the process is
//! up. Verification polls every endpoint within a retry budget; endpoints
//! are independent, so they are polled concurrently and no ordering between
//! them is guaranteed. A full launch cycle is allocate -> launch -> settle ->
//! verify, retried a bounded number of times for the workers that never came
//! up.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::allocate::WorkerAssignment;
use crate::supervise::{LaunchDelay, Supervisor};

/// Polling budget applied to every endpoint.
#[derive(Debug, Clone, Copy)]
pub struct ProbeBudget {
    /// Timeout for a single poll.
    pub timeout: Duration,
    /// Maximum polls per endpoint within one verification pass.
    pub retries: u32,
    /// Pause between consecutive polls of the same endpoint.
    pub poll_interval: Duration,
}

/// Result of one verification pass over a set of workers.
#[derive(Debug, Clone, Default)]
pub struct VerifyReport {
    /// Workers whose endpoint answered 2xx within the budget.
    pub up: Vec<String>,
    /// Workers that never answered.
    pub down: Vec<String>,
}

/// Outcome of a bounded run of launch cycles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Every worker verified within the cycle budget.
    AllVerified,
    /// The cycle budget ran out with these workers still unverified. The
    /// run still stands for the workers that did verify.
    Unverified(Vec<String>),
}

/// Polls worker endpoints and classifies them as up or down.
#[derive(Debug, Clone)]
pub struct HealthVerifier {
    client: reqwest::Client,
    budget: ProbeBudget,
}

impl HealthVerifier {
    pub fn new(budget: ProbeBudget) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(budget.timeout)
            .build()
            .context("failed to build health-check HTTP client")?;
        Ok(Self { client, budget })
    }

    /// Poll one endpoint until it answers 2xx or the retry budget runs out.
    async fn probe(&self, name: &str, endpoint: &str) -> bool {
        for attempt in 1..=self.budget.retries.max(1) {
            match self.client.get(endpoint).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!(strategy = %name, endpoint, attempt, "endpoint up");
                    return true;
                }
                Ok(response) => {
                    debug!(
                        strategy = %name,
                        endpoint,
                        attempt,
                        status = %response.status(),
                        "endpoint answered non-success"
                    );
                }
                Err(e) => {
                    debug!(strategy = %name, endpoint, attempt, error = %e, "endpoint unreachable");
                }
            }
            if attempt < self.budget.retries {
                tokio::time::sleep(self.budget.poll_interval).await;
            }
        }
        false
    }

    /// Verify every assignment's endpoint concurrently.
    ///
    /// One worker's failure never blocks another's verification.
    pub async fn verify(&self, assignments: &[WorkerAssignment]) -> VerifyReport {
        let probes = assignments
            .iter()
            .map(|a| async move { (a.name.clone(), self.probe(&a.name, &a.endpoint).await) });

        let mut report = VerifyReport::default();
        for (name, up) in join_all(probes).await {
            if up {
                report.up.push(name);
            } else {
                report.down.push(name);
            }
        }
        report
    }
}

/// Settings for a bounded run of launch cycles.
#[derive(Debug, Clone, Copy)]
pub struct CycleConfig {
    /// Maximum allocate-launch-verify passes.
    pub max_cycles: u32,
    /// Fixed wait between launching and the first poll, giving workers time
    /// to bind their ports.
    pub settle: Duration,
    /// Bounded dispatch pool size.
    pub concurrency: usize,
    /// Jitter between successive dispatches.
    pub delay: LaunchDelay,
}

/// Launch the fleet and drive verification cycles until every worker is up
/// or the cycle budget is exhausted.
///
/// The first cycle launches the whole fleet; later cycles tear down and
/// relaunch only the workers that are still down, reusing each worker's
/// original assignment so ports and paths stay deterministic across cycles.
pub async fn run_with_retry(
    supervisor: &Supervisor,
    verifier: &HealthVerifier,
    jobs: &[(WorkerAssignment, serde_json::Value)],
    config: &CycleConfig,
) -> Result<CycleOutcome> {
    if jobs.is_empty() {
        return Ok(CycleOutcome::AllVerified);
    }

    let mut to_launch: Vec<(WorkerAssignment, serde_json::Value)> = jobs.to_vec();

    for cycle in 1..=config.max_cycles.max(1) {
        info!(cycle, workers = to_launch.len(), "starting launch cycle");

        supervisor
            .launch_all(&to_launch, config.concurrency, config.delay)
            .await?;
        tokio::time::sleep(config.settle).await;

        let assignments: Vec<WorkerAssignment> =
            to_launch.iter().map(|(a, _)| a.clone()).collect();
        let report = verifier.verify(&assignments).await;

        if report.down.is_empty() {
            info!(cycle, "all workers verified");
            return Ok(CycleOutcome::AllVerified);
        }

        warn!(cycle, down = ?report.down, "workers failed verification");

        if cycle < config.max_cycles {
            // Refined retry: tear down and relaunch only the stragglers.
            supervisor.terminate(&report.down).await?;
            let down: HashSet<&str> = report.down.iter().map(String::as_str).collect();
            to_launch.retain(|(a, _)| down.contains(a.name.as_str()));
        } else {
            let mut unverified = report.down;
            unverified.sort();
            return Ok(CycleOutcome::Unverified(unverified));
        }
    }

    // Unreachable with max_cycles >= 1; kept for completeness.
    Ok(CycleOutcome::AllVerified)
}
