//! stiffd — the stiffgrid simulator.
//!
//! Runs a group of balancing processes inside one binary, each on its own
//! tokio task, connected through an in-process channel mesh. Every process
//! owns a slice of a synthetic field with a hot region on the low ranks, so
//! the first steps are badly imbalanced and the balancer has work to do.
//!
//! # Usage
//!
//! ```text
//! stiffd simulate --procs 4 --cells 128 --steps 20 --variant tdac
//! stiffd print-config > stiffgrid.toml
//! ```

mod simulate;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use stiff_core::BalanceConfig;
use tracing_subscriber::EnvFilter;

use crate::simulate::SimulateArgs;

#[derive(Parser)]
#[command(name = "stiffd", about = "stiffgrid chemistry load-balancing simulator")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run balanced chemistry steps over a synthetic field.
    Simulate(SimulateArgs),

    /// Print the effective balancing configuration as TOML.
    PrintConfig {
        /// Configuration file to load and validate first.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,stiffd=debug"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Simulate(args) => {
            let summaries = simulate::run(&args).await?;
            if args.summary_json {
                for summary in &summaries {
                    println!("{}", serde_json::to_string(summary)?);
                }
            }
            Ok(())
        }
        Command::PrintConfig { config } => {
            let config = match config {
                Some(path) => BalanceConfig::from_file(&path)?,
                None => BalanceConfig::default(),
            };
            config.validate()?;
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}
