//! Tether CLI - drives synthetic workloads through a pooled component proxy.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;
mod logging;
mod workload;

use commands::Overrides;
use logging::{init_logging, level_for_verbosity, LogFormat};

/// Tether - pooled component proxies
#[derive(Parser, Debug)]
#[command(name = "tether")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Log format (pretty or json)
    #[arg(long, default_value = "pretty", global = true)]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a synthetic workload against a pooled component
    Run {
        /// Number of units of work
        #[arg(long, default_value_t = 1000)]
        units: u64,
        /// Worker threads
        #[arg(long, default_value_t = 4)]
        threads: usize,
        /// Proxy calls per unit of work
        #[arg(long, default_value_t = 8)]
        calls: usize,
        /// Fail every n-th unit of work
        #[arg(long)]
        fail_every: Option<u64>,
        #[command(flatten)]
        pool: PoolArgs,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the effective pool configuration
    Config {
        #[command(flatten)]
        pool: PoolArgs,
    },

    /// Show version information
    Version,
}

#[derive(clap::Args, Debug)]
struct PoolArgs {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Maximum number of pooled instances
    #[arg(long)]
    pool_max: Option<usize>,
    /// Instances created eagerly
    #[arg(long)]
    pool_min: Option<usize>,
    /// Overflow policy (create or block)
    #[arg(long)]
    overflow: Option<String>,
    /// Blocking acquire timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,
}

impl PoolArgs {
    fn overrides(&self) -> Overrides {
        Overrides {
            pool_max: self.pool_max,
            pool_min: self.pool_min,
            overflow: self.overflow.clone(),
            timeout_ms: self.timeout_ms,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    init_logging(
        level_for_verbosity(cli.verbose),
        LogFormat::parse(&cli.log_format),
    );

    let result = match cli.command {
        Commands::Run {
            units,
            threads,
            calls,
            fail_every,
            pool,
            json,
        } => commands::run(
            pool.config.as_deref(),
            &pool.overrides(),
            &workload::Workload {
                units,
                threads,
                calls,
                fail_every,
            },
            json,
        ),
        Commands::Config { pool } => {
            commands::show_config(pool.config.as_deref(), &pool.overrides())
        }
        Commands::Version => {
            println!("tether {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
