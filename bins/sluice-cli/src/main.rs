//! sluice: command-line driver for the weekly fee distributor.
//!
//! Runs JSON scenarios against in-memory collaborators, inspects persisted
//! distributor state, and prints the effective configuration.

mod scenario;

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tracing::{error, info};

use sluice_core::store::{DistributorStore, MemoryStore};
use sluice_node::{NodeConfig, RocksStore};

use crate::scenario::{Report, Simulation};

/// Weekly fee distribution over a decaying lock ledger.
#[derive(Parser, Debug)]
#[command(name = "sluice", version, about = "Weekly fee distributor driver")]
struct Cli {
    /// Configuration file (TOML). Missing files are ignored.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory for persistent state
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log output format ("text" or "json")
    #[arg(long, global = true)]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a JSON scenario and print its report.
    Simulate(SimulateArgs),
    /// Print persisted distributor state.
    Inspect(InspectArgs),
    /// Print the effective configuration.
    Config,
}

#[derive(Args, Debug)]
struct SimulateArgs {
    /// Scenario file.
    scenario: PathBuf,

    /// Keep distributor state in a new RocksDB store under the data directory.
    #[arg(long)]
    persist: bool,

    /// Exit with an error if any step failed.
    #[arg(long)]
    strict: bool,

    /// Pretty-print the report.
    #[arg(long)]
    pretty: bool,
}

#[derive(Args, Debug)]
struct InspectArgs {
    /// First week to list (inclusive).
    #[arg(long, default_value_t = 0)]
    from: u64,

    /// Last week to list (exclusive).
    #[arg(long, default_value_t = u64::MAX)]
    to: u64,
}

impl Cli {
    /// Resolve the configuration, with flags taking precedence.
    fn node_config(&self) -> Result<NodeConfig> {
        let mut config = NodeConfig::load(self.config.as_deref()).context("failed to load configuration")?;
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.log_format = format.clone();
        }
        Ok(config)
    }
}

fn main() {
    let cli = Cli::parse();
    let config = match cli.node_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e:#}");
            process::exit(2);
        }
    };
    init_logging(&config.log_level, &config.log_format);

    if let Err(e) = run(cli.command, config) {
        error!(error = %e, "command failed");
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn run(command: Commands, config: NodeConfig) -> Result<()> {
    match command {
        Commands::Simulate(args) => simulate(args, &config),
        Commands::Inspect(args) => inspect(args, &config),
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn simulate(args: SimulateArgs, config: &NodeConfig) -> Result<()> {
    let text = fs::read_to_string(&args.scenario)
        .with_context(|| format!("failed to read {}", args.scenario.display()))?;
    let scenario = scenario::parse(&text)?;
    let params = scenario.params.unwrap_or(config.params);
    if let Err(e) = params.validate() {
        bail!("invalid distributor parameters: {e}");
    }
    info!(scenario = %args.scenario.display(), steps = scenario.steps.len(), persist = args.persist, "running scenario");

    let report = if args.persist {
        fs::create_dir_all(&config.data_dir)
            .with_context(|| format!("failed to create {}", config.data_dir.display()))?;
        let store = open_fresh_store(&config.db_path(), scenario.start_time)?;
        run_with(&scenario, config, store, params)?
    } else {
        run_with(&scenario, config, MemoryStore::new(scenario.start_time), params)?
    };

    let out = if args.pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{out}");

    if args.strict && report.failed_steps() > 0 {
        bail!("{} scenario step(s) failed", report.failed_steps());
    }
    Ok(())
}

fn run_with<S: DistributorStore>(
    scenario: &scenario::Scenario,
    config: &NodeConfig,
    store: S,
    params: sluice_distributor::DistributorParams,
) -> Result<Report> {
    Simulation::new(scenario, config.distributor, store, params)?.run(scenario)
}

/// Open a new store at `path`. Scenarios start from empty collaborators, so
/// state left by an earlier run would not match them.
fn open_fresh_store(path: &Path, start_time: u64) -> Result<RocksStore> {
    if path.exists() {
        bail!(
            "distributor state already exists at {}; choose another --data-dir or remove it",
            path.display()
        );
    }
    Ok(RocksStore::open(path, start_time)?)
}

fn inspect(args: InspectArgs, config: &NodeConfig) -> Result<()> {
    let path = config.db_path();
    if !path.exists() {
        bail!("no distributor state at {}", path.display());
    }
    let store = RocksStore::open(&path, config.start_time)?;
    let state = json!({
        "path": path,
        "globals": store.globals()?,
        "weeks": store.week_table(args.from, args.to)?,
        "accounts": store
            .accounts()?
            .into_iter()
            .map(|(account, cursor)| json!({ "account": account, "cursor": cursor }))
            .collect::<Vec<_>>(),
    });
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}

/// Initialize tracing subscriber with the given log level and output format.
///
/// Logs go to stderr so reports on stdout stay machine readable.
fn init_logging(level_str: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_str));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_level(true).with_writer(std::io::stderr))
            .init();
    }
}
