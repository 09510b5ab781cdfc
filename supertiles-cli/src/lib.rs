//! Command-line interface for building clustered MBTiles tilesets.
#![forbid(unsafe_code)]

use clap::{Parser, Subcommand};

mod error;
mod generate;

pub use error::CliError;
use generate::{GenerateArgs, execute_generate};

pub(crate) const ARG_INPUT: &str = "input";
pub(crate) const ARG_OUTPUT: &str = "output";
pub(crate) const ARG_FILTER: &str = "filter";
pub(crate) const ENV_INPUT: &str = "SUPERTILES_CMDS_GENERATE_INPUT";
pub(crate) const ENV_OUTPUT: &str = "SUPERTILES_CMDS_GENERATE_OUTPUT";

/// Run the CLI with the current process arguments and environment.
///
/// Help and version requests are printed by clap and end the process.
///
/// # Errors
/// Returns [`CliError`] when arguments or configuration are invalid or the
/// tileset cannot be generated.
pub fn run() -> Result<(), CliError> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if !err.use_stderr() => err.exit(),
        Err(err) => return Err(CliError::ArgumentParsing(err)),
    };
    match cli.command {
        Command::Generate(args) => {
            let config = args.into_config()?;
            init_logging(config.log_performance)?;
            execute_generate(&config)?;
        }
    }
    Ok(())
}

/// `RUST_LOG` wins over the default level.
fn init_logging(log_performance: bool) -> Result<(), CliError> {
    let level = if log_performance { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .try_init()
        .map_err(CliError::Logging)
}

#[derive(Debug, Parser)]
#[command(
    name = "supertiles",
    about = "Package clustered GeoJSON points as an MBTiles vector tileset",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Cluster a GeoJSON point collection and write every zoom level to MBTiles.
    Generate(GenerateArgs),
}

#[cfg(test)]
mod tests;
