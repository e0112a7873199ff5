//! `stratfleet status`: summarize the tracker.

use anyhow::Result;

use stratfleet_core::status::UnitStatus;

use crate::backtest_cmd::load_store;
use crate::config::ConfigFile;

pub fn run_status(config: &ConfigFile) -> Result<()> {
    let store = load_store(config)?;

    let mut pending = 0usize;
    let mut success = 0usize;
    let mut skipped = 0usize;
    let mut errors: Vec<(String, String)> = Vec::new();

    for (name, status) in store.iter() {
        match status {
            UnitStatus::Pending => pending += 1,
            UnitStatus::Success => success += 1,
            UnitStatus::Skipped => skipped += 1,
            UnitStatus::Error(msg) => errors.push((name.to_owned(), msg.clone())),
        }
    }

    println!("Tracked strategies: {}", store.len());
    println!("  pending: {pending}");
    println!("  success: {success}");
    println!("  error:   {}", errors.len());
    println!("  skipped: {skipped}");

    if !errors.is_empty() {
        println!("\nErrors:");
        for (name, msg) in &errors {
            // Keep the summary readable when the tool dumps long diagnostics.
            let short: String = msg.chars().take(120).collect();
            if short.len() < msg.len() {
                println!("  {name}: {short}...");
            } else {
                println!("  {name}: {short}");
            }
        }
        println!("\nRe-run with `stratfleet backtest --retry-errors` to retry them.");
    }

    Ok(())
}
