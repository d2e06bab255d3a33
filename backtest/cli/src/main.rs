//! Backtest CLI - Submit and Follow Backtest Jobs
//!
//! Command-line client for the backtest service. Submits strategy
//! configurations, follows a job's result stream until it finishes and
//! keeps a local history of completed runs.
//!
//! # Usage
//!
//! ```bash
//! # Submit with the default strategy and follow the stream
//! backtest run
//!
//! # Submit a strategy file without following
//! backtest run --config strategy.toml --no-follow
//!
//! # Follow a job submitted elsewhere
//! backtest watch 3f6c2a
//!
//! # List or clear saved runs
//! backtest history
//! backtest history --clear
//!
//! # Verbose logging
//! RUST_LOG=debug backtest run
//! ```
//!
//! # Signals
//!
//! - `SIGINT` (Ctrl+C): close the stream and exit

mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use backtest_core::{load_config, load_config_from_path, ClientConfig, ConfigOverrides};

/// Backtest CLI - submit strategies and watch results stream in
#[derive(Parser, Debug)]
#[command(name = "backtest")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Client configuration file
    #[arg(long, env = "BACKTEST_CLIENT_CONFIG", value_name = "FILE", global = true)]
    client_config: Option<PathBuf>,

    /// Service base URL
    #[arg(long, value_name = "URL", global = true)]
    api_base: Option<String>,

    /// API version path segment
    #[arg(long, value_name = "VERSION", global = true)]
    api_version: Option<String>,

    /// Close a silent stream after this many seconds (0 = never)
    #[arg(long, value_name = "SECS", global = true)]
    idle_timeout: Option<u64>,

    /// Debug logging for the client and core
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a backtest and follow its results
    Run {
        /// Strategy configuration (TOML, or JSON by extension)
        #[arg(short = 'c', long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Print the job id and exit without following the stream
        #[arg(long)]
        no_follow: bool,
    },

    /// Follow the results of an existing job
    Watch {
        /// Job id returned by the service
        job_id: String,
    },

    /// Submit a training request
    Train {
        /// Strategy configuration (TOML, or JSON by extension)
        #[arg(short = 'c', long, value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// List saved runs
    History {
        /// Delete all saved runs
        #[arg(long)]
        clear: bool,
    },

    /// Print the merged strategy configuration
    Config {
        /// Strategy configuration to merge with defaults
        #[arg(short = 'c', long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::new();
        if let Some(base) = &self.api_base {
            overrides = overrides.with_api_base(base.clone());
        }
        if let Some(version) = &self.api_version {
            overrides = overrides.with_api_version(version.clone());
        }
        if let Some(secs) = self.idle_timeout {
            overrides = overrides.with_idle_timeout_secs(secs);
        }
        overrides
    }

    fn client_config(&self) -> Result<ClientConfig> {
        let mut config = match &self.client_config {
            Some(path) => load_config_from_path(Some(path.clone())),
            None => load_config(),
        }
        .context("Failed to load client configuration")?;

        self.overrides().apply(&mut config);
        config.validate().context("Invalid client configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("backtest_cli={level}").parse()?)
                .add_directive(format!("backtest_core={level}").parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let client = args.client_config()?;
    tracing::debug!(
        source = %client.source(),
        api_base = %client.api_base,
        api_version = %client.api_version,
        "Client configuration loaded"
    );

    match args.command {
        Command::Run { config, no_follow } => {
            let strategy = commands::load_strategy(config.as_deref()).await?;
            commands::run(&client, strategy, !no_follow).await
        }
        Command::Watch { job_id } => commands::watch(&client, &job_id).await,
        Command::Train { config } => {
            let strategy = commands::load_strategy(config.as_deref()).await?;
            commands::train(&client, &strategy).await
        }
        Command::History { clear } => commands::history(&client, clear).await,
        Command::Config { config } => {
            let strategy = commands::load_strategy(config.as_deref()).await?;
            print!("{}", strategy.to_toml_string()?);
            Ok(())
        }
    }
}
