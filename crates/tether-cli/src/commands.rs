//! CLI command implementations.

use std::path::Path;

use anyhow::Context;
use tether_core::{OverflowPolicy, PoolConfig};
use thiserror::Error;

use crate::workload::{self, Workload, WorkloadReport};

/// CLI errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("unknown overflow policy: {0} (expected create or block)")]
    InvalidOverflow(String),

    #[error("--threads must be at least 1")]
    NoThreads,
}

/// Flag overrides applied on top of the loaded configuration.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub pool_max: Option<usize>,
    pub pool_min: Option<usize>,
    pub overflow: Option<String>,
    pub timeout_ms: Option<u64>,
}

/// Loads the effective configuration: defaults, then `path`, then the
/// environment, then command-line flags.
pub fn effective_config(
    path: Option<&Path>,
    overrides: &Overrides,
) -> anyhow::Result<PoolConfig> {
    let mut config = PoolConfig::load(path).context("failed to load pool configuration")?;

    if let Some(max) = overrides.pool_max {
        config.pool_max = max;
    }
    if let Some(min) = overrides.pool_min {
        config.pool_min = min;
    }
    if let Some(policy) = &overrides.overflow {
        config.overflow = OverflowPolicy::parse(policy)
            .ok_or_else(|| CliError::InvalidOverflow(policy.clone()))?;
    }
    if let Some(timeout) = overrides.timeout_ms {
        config.timeout_ms = timeout;
    }

    config.check().context("invalid pool configuration")?;
    Ok(config)
}

/// Run a synthetic workload and print the resulting pool statistics.
pub fn run(
    config_path: Option<&Path>,
    overrides: &Overrides,
    shape: &Workload,
    json: bool,
) -> anyhow::Result<()> {
    if shape.threads == 0 {
        return Err(CliError::NoThreads.into());
    }
    let config = effective_config(config_path, overrides)?;
    tracing::info!(?config, "effective configuration");

    let report = workload::run(config, shape)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_report(&report));
    }
    Ok(())
}

/// Print the effective configuration as JSON.
pub fn show_config(config_path: Option<&Path>, overrides: &Overrides) -> anyhow::Result<()> {
    let config = effective_config(config_path, overrides)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn render_report(report: &WorkloadReport) -> String {
    let stats = &report.stats;
    let mut out = String::new();
    out.push_str(&format!(
        "Ran {} units of work in {} ms ({} failed, {} cleanup failures)\n",
        report.units, report.elapsed_ms, report.failed_units, report.cleanup_failures
    ));
    out.push_str("Pool:\n");
    out.push_str(&format!("  max:              {}\n", stats.max));
    out.push_str(&format!("  idle:             {}\n", stats.idle));
    out.push_str(&format!("  checked out:      {}\n", stats.checked_out));
    out.push_str(&format!("  created:          {}\n", stats.created));
    out.push_str(&format!("  overflow created: {}\n", stats.overflow_created));
    out.push_str(&format!("  acquired:         {}\n", stats.acquired));
    out.push_str(&format!("  released:         {}\n", stats.released));
    out.push_str(&format!("  discarded:        {}\n", stats.discarded));
    out
}
