//! Configuration file management for stratfleet.
//!
//! Provides a TOML-based config file at `~/.config/stratfleet/config.toml`
//! and a resolution chain for its location: CLI flag > `STRATFLEET_CONFIG`
//! env var > default path. A missing file resolves to the built-in defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use stratfleet_core::allocate::StrategyProfile;

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub paths: PathsSection,
    #[serde(default)]
    pub backtest: BacktestSection,
    #[serde(default)]
    pub live: LiveSection,
}

/// Directory and file locations shared by both pipelines.
#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsSection {
    /// Directory holding one strategy source file per strategy.
    pub strategies_dir: PathBuf,
    /// Where per-strategy result files and the tracker live.
    pub results_dir: PathBuf,
    /// Shared working directory the tool runs in and drops artifacts into.
    pub working_dir: PathBuf,
    /// Shared base config overlaid per worker.
    pub base_config: PathBuf,
    /// Where generated per-worker configs are written.
    pub configs_dir: PathBuf,
    /// Where per-worker sqlite databases live.
    pub db_dir: PathBuf,
    /// The strategy -> endpoint mapping file rewritten each launch cycle.
    pub url_mappings: PathBuf,
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            strategies_dir: PathBuf::from("user_data/strategies"),
            results_dir: PathBuf::from("user_data/backtest_results"),
            working_dir: PathBuf::from("."),
            base_config: PathBuf::from("user_data/configs/config_base.json"),
            configs_dir: PathBuf::from("user_data/configs/generated"),
            db_dir: PathBuf::from("user_data/db"),
            url_mappings: PathBuf::from("strategy_url_mappings.json"),
        }
    }
}

/// Batch backtesting settings.
#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestSection {
    /// The external backtest command.
    pub tool: String,
    /// File-name prefix of the artifacts the tool produces.
    pub artifact_prefix: String,
    /// File extension that identifies a strategy source file.
    pub strategy_ext: String,
    /// Default batch size.
    pub batch_size: usize,
}

impl Default for BacktestSection {
    fn default() -> Self {
        Self {
            tool: "./run_backtest.sh".to_owned(),
            artifact_prefix: "BACKTESTING_RESULT".to_owned(),
            strategy_ext: "py".to_owned(),
            batch_size: 20,
        }
    }
}

/// Live launcher settings, including the ranked fleet.
#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveSection {
    /// Worker executable.
    pub worker: String,
    /// Host part of worker endpoints.
    pub host: String,
    /// First port assigned; subsequent workers get base_port + rank.
    pub base_port: u16,
    /// Default worker count cap.
    pub max_parallel: usize,
    /// Inclusive bounds for the jitter between worker dispatches.
    pub launch_delay_ms_min: u64,
    pub launch_delay_ms_max: u64,
    /// Wait between launching and the first health poll.
    pub settle_secs: u64,
    /// Per-poll timeout.
    pub health_timeout_secs: u64,
    /// Polls per endpoint within one verification pass.
    pub health_retries: u32,
    /// Pause between consecutive polls of the same endpoint.
    pub health_poll_secs: u64,
    /// Maximum allocate-launch-verify cycles.
    pub max_cycles: u32,
    /// Ranked candidates for the live fleet.
    pub strategies: Vec<StrategyProfile>,
}

impl Default for LiveSection {
    fn default() -> Self {
        Self {
            worker: "freqtrade".to_owned(),
            host: "localhost".to_owned(),
            base_port: 6900,
            max_parallel: 12,
            launch_delay_ms_min: 1000,
            launch_delay_ms_max: 6000,
            settle_secs: 15,
            health_timeout_secs: 5,
            health_retries: 3,
            health_poll_secs: 2,
            max_cycles: 3,
            strategies: Vec::new(),
        }
    }
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the stratfleet config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/stratfleet` or
/// `~/.config/stratfleet`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("stratfleet");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("stratfleet")
}

/// Return the default path to the config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Resolve the config file location: CLI flag > `STRATFLEET_CONFIG` env >
/// default path.
pub fn resolve_path(cli_path: Option<&Path>) -> PathBuf {
    if let Some(path) = cli_path {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var("STRATFLEET_CONFIG") {
        return PathBuf::from(path);
    }
    config_path()
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load the config file at `path`, falling back to the defaults when it
/// does not exist.
pub fn load_config(path: &Path) -> Result<ConfigFile> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return Ok(ConfigFile::default());
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file at {}", path.display()))?;
    Ok(config)
}

/// Serialize and write the config file, creating parent dirs as needed.
pub fn save_config(path: &Path, config: &ConfigFile) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create config directory {}", parent.display()))?;
    }
    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;
    Ok(())
}

/// Execute `stratfleet init`: write a default config file.
pub fn cmd_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }
    save_config(path, &ConfigFile::default())?;
    println!("Config written to {}", path.display());
    println!("Next: fill in [paths], [backtest], and [[live.strategies]].");
    Ok(())
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
