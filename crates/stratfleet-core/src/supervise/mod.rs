//! Worker process supervision.
//!
//! The supervisor owns the opaque process handles: call sites only see
//! `launch` / `launch_all` / `terminate`. Workers are long-running and
//! independent; a launch is fire-and-forget and the supervisor never blocks
//! on worker completion.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rand::Rng;
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, warn};

use crate::allocate::WorkerAssignment;

/// Inclusive bounds, in milliseconds, for the randomized delay between
/// successive worker dispatches. The jitter keeps a fleet launch from
/// bursting against the exchange's rate limit.
#[derive(Debug, Clone, Copy)]
pub struct LaunchDelay {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl LaunchDelay {
    fn sample(&self) -> Duration {
        let (lo, hi) = (self.min_ms.min(self.max_ms), self.min_ms.max(self.max_ms));
        Duration::from_millis(rand::rng().random_range(lo..=hi))
    }
}

/// Launches and terminates worker processes, tracking their handles by
/// strategy name.
#[derive(Debug, Clone)]
pub struct Supervisor {
    program: String,
    children: Arc<Mutex<HashMap<String, Child>>>,
}

impl Supervisor {
    /// `program` is the worker executable (e.g. `freqtrade`).
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            children: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Write the worker's config file and spawn it, fire-and-forget.
    ///
    /// The handle is tracked for later [`Supervisor::terminate`]; the worker
    /// is expected to run until torn down.
    pub async fn launch(
        &self,
        assignment: &WorkerAssignment,
        config: &serde_json::Value,
    ) -> Result<()> {
        if let Some(parent) = assignment.config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create config dir {}", parent.display()))?;
        }
        let contents = serde_json::to_string_pretty(config)?;
        std::fs::write(&assignment.config_path, contents).with_context(|| {
            format!(
                "failed to write worker config {}",
                assignment.config_path.display()
            )
        })?;

        info!(
            strategy = %assignment.name,
            port = assignment.port,
            "launching worker"
        );

        let child = Command::new(&self.program)
            .arg("trade")
            .arg("-c")
            .arg(&assignment.config_path)
            .arg("-s")
            .arg(&assignment.name)
            .arg("--db-url")
            .arg(&assignment.db_url)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .with_context(|| {
                format!(
                    "failed to spawn worker {:?} for strategy {}",
                    self.program, assignment.name
                )
            })?;

        self.children
            .lock()
            .await
            .insert(assignment.name.clone(), child);
        Ok(())
    }

    /// Dispatch all assignments through a bounded pool, with a randomized
    /// delay between successive dispatches.
    ///
    /// A failed launch is logged and does not stop the remaining dispatches;
    /// the health verifier reports the missing worker as down.
    pub async fn launch_all(
        &self,
        jobs: &[(WorkerAssignment, serde_json::Value)],
        concurrency: usize,
        delay: LaunchDelay,
    ) -> Result<()> {
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let mut handles = Vec::with_capacity(jobs.len());

        for (i, (assignment, config)) in jobs.iter().enumerate() {
            if i > 0 {
                let pause = delay.sample();
                debug!(delay_ms = pause.as_millis() as u64, "jitter before next dispatch");
                tokio::time::sleep(pause).await;
            }

            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .context("launch semaphore closed")?;
            let supervisor = self.clone();
            let assignment = assignment.clone();
            let config = config.clone();

            handles.push(tokio::spawn(async move {
                let result = supervisor.launch(&assignment, &config).await;
                drop(permit);
                if let Err(e) = &result {
                    warn!(strategy = %assignment.name, error = %e, "worker launch failed");
                }
                result.is_ok()
            }));
        }

        let mut launched = 0usize;
        for handle in handles {
            if handle.await.unwrap_or(false) {
                launched += 1;
            }
        }
        info!(launched, total = jobs.len(), "dispatched worker fleet");
        Ok(())
    }

    /// Names of the workers currently tracked by this supervisor.
    pub async fn tracked(&self) -> Vec<String> {
        self.children.lock().await.keys().cloned().collect()
    }

    /// Tear down the named workers, best-effort.
    ///
    /// Tracked children get SIGTERM (escalating to a kill if they linger);
    /// untracked survivors from earlier orchestrator runs are matched by
    /// command line. A missing process is not an error.
    pub async fn terminate(&self, names: &[String]) -> Result<()> {
        let mut doomed = Vec::new();
        {
            let mut children = self.children.lock().await;
            for name in names {
                if let Some(child) = children.remove(name) {
                    doomed.push((name.clone(), child));
                }
            }
        }

        for (name, mut child) in doomed {
            signal_term(&child);
            match tokio::time::timeout(Duration::from_secs(5), child.wait()).await {
                Ok(_) => debug!(strategy = %name, "worker exited"),
                Err(_) => {
                    warn!(strategy = %name, "worker ignored SIGTERM, killing");
                    let _ = child.kill().await;
                }
            }
        }

        // Catch workers left over from a previous run that we never tracked.
        for name in names {
            let pattern = format!("{} trade.*-s {}", self.program, name);
            let _ = Command::new("pkill")
                .arg("-f")
                .arg(&pattern)
                .status()
                .await;
        }

        info!(count = names.len(), "terminated workers");
        Ok(())
    }
}

#[cfg(unix)]
fn signal_term(child: &Child) {
    if let Some(pid) = child.id() {
        // SAFETY: sending a signal to a pid we own; failure is harmless.
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
    }
}

#[cfg(not(unix))]
fn signal_term(_child: &Child) {}
