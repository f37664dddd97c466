//! graphfield CLI - run force-directed layouts from the command line.
//!
//! Graph files are JSON with flat `point_positions` and `links` arrays plus
//! optional per-point and per-link attributes.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::Level;

mod commands;
mod config;

use commands::config as config_cmd;
use commands::run::{Backend, RunOptions};

/// graphfield CLI - lay out graphs with a force simulation.
#[derive(Parser, Debug)]
#[command(
    name = "gf",
    author,
    version,
    about = "graphfield: force-directed graph layout",
    long_about = None
)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Config file to use instead of the platform default.
    #[arg(long, global = true, env = "GF_CONFIG")]
    config: Option<PathBuf>,

    /// Override an option for this invocation (repeatable), e.g. `--set gravity=0.5`.
    #[arg(long = "set", global = true, value_name = "KEY=VALUE")]
    overrides: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Simulate a graph file until it settles and write the layout.
    Run {
        /// Graph JSON file.
        graph: PathBuf,

        /// Output file for the layout (stdout when omitted).
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Stop after this many ticks even if not settled.
        #[arg(long, default_value_t = 10_000)]
        max_ticks: u64,

        /// Starting alpha.
        #[arg(long, default_value_t = 1.0)]
        alpha: f32,

        /// Where the simulation runs.
        #[arg(long, value_enum, default_value = "cpu")]
        backend: Backend,
    },

    /// Write a deterministic random graph file.
    Generate {
        /// Number of points.
        #[arg(short, long, default_value_t = 1000)]
        points: usize,

        /// Number of links.
        #[arg(short, long, default_value_t = 1500)]
        links: usize,

        /// Random seed.
        #[arg(long, default_value_t = 0)]
        seed: u64,

        /// Output file (stdout when omitted).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Manage the simulation configuration.
    #[command(subcommand)]
    Config(ConfigCommands),
}

/// Configuration subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show the effective configuration.
    Show,

    /// Set an option in the config file.
    Set {
        /// Option name, e.g. `repulsionTheta`.
        key: String,
        /// New value.
        value: String,
    },

    /// Get an option of the effective configuration.
    Get {
        /// Option name.
        key: String,
    },

    /// Reset the config file to defaults.
    Reset,

    /// Show path to config file.
    Path,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.quiet {
        Level::ERROR
    } else if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = config::config_path(cli.config.as_deref());

    match cli.command {
        Commands::Run {
            graph,
            output,
            max_ticks,
            alpha,
            backend,
        } => {
            let config = config::load(config_path.as_deref(), &cli.overrides)?;
            let options = RunOptions {
                graph,
                output,
                max_ticks,
                alpha,
                backend,
            };
            let layout = commands::run::execute(config, &options)?;
            if !cli.quiet {
                eprintln!(
                    "{} {} points after {} ticks (alpha {:.4})",
                    if layout.settled { "✅ Settled" } else { "⏹  Stopped" },
                    layout.positions.len(),
                    layout.ticks,
                    layout.alpha
                );
            }
        }

        Commands::Generate {
            points,
            links,
            seed,
            output,
        } => {
            let config = config::load(config_path.as_deref(), &cli.overrides)?;
            let space_size = config.validated().space_size;
            commands::generate::execute(points, links, space_size, seed, output.as_deref())?;
        }

        Commands::Config(command) => match command {
            ConfigCommands::Show => {
                let config = config::load(config_path.as_deref(), &cli.overrides)?;
                config_cmd::show(&config, config_path.as_deref())?;
            }
            ConfigCommands::Get { key } => {
                let config = config::load(config_path.as_deref(), &cli.overrides)?;
                config_cmd::get(&config, &key)?;
            }
            ConfigCommands::Set { key, value } => {
                let path = config_path.context("No config file path available")?;
                config_cmd::set(&path, &key, &value)?;
            }
            ConfigCommands::Reset => {
                let path = config_path.context("No config file path available")?;
                config_cmd::reset(&path)?;
            }
            ConfigCommands::Path => match &config_path {
                Some(path) => println!("{}", path.display()),
                None => println!("(no config file path available)"),
            },
        },
    }

    Ok(())
}
