//! trsp
//!
//! Builds Triton model repositories from a configuration document.
//!
//! # Commands
//!
//! - `build`: validate the configuration and write the repository
//! - `validate`: validate only, optionally exporting the normalized document

use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::{fmt, EnvFilter};

mod commands;

/// Triton model repository builder
#[derive(Parser)]
#[command(name = "trsp")]
#[command(version)]
#[command(about = "Build Triton model repositories from a configuration document")]
#[command(propagate_version = true)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a configuration and write the model repository
    Build(commands::BuildArgs),
    /// Validate a configuration without building anything
    Validate(commands::ValidateArgs),
}

fn main() {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Build(args) => commands::build(args),
        Commands::Validate(args) => commands::validate(args),
    };

    if let Err(err) = result {
        error!("{err:#}");
        std::process::exit(1);
    }
}
