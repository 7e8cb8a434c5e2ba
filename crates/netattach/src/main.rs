mod commands;
mod error;
mod logging;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use netattach_operations::Config;
use netattach_operations::config::DEFAULT_CONFIG_FILE;
use tracing::debug;

use crate::commands::Commands;
use crate::error::{CliError, Result};
use crate::logging::LogLevel;

/// State file used when neither `--state` nor the configuration names one.
const DEFAULT_STATE_FILE: &str = "netattach-state.toml";

#[derive(Parser)]
#[command(name = "netattach")]
#[command(about = "Attach containers to tenant networks", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file; defaults apply when it does not exist
    #[arg(long, short = 'c', global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// State file of the local backend (overrides `state-file` in the configuration)
    #[arg(long, global = true)]
    state: Option<PathBuf>,

    /// Log level for netattach crates (overrides RUST_LOG)
    #[arg(long, global = true, value_enum)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Commands,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = logging::init_tracing(cli.log_level)
        .and_then(|()| load_config(&cli.config, cli.state))
        .and_then(|config| cli.command.execute(&config));

    if let Err(e) = result {
        print_error(&e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn load_config(path: &Path, state: Option<PathBuf>) -> Result<Config> {
    let config = Config::load_or_default(path).map_err(CliError::Config)?;
    let state_file = state
        .or_else(|| config.state_file.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_FILE));
    debug!(
        config = %path.display(),
        state_file = %state_file.display(),
        bridge = %config.bridge,
        "configuration loaded"
    );
    Ok(config.with_state_file(state_file))
}

fn print_error(error: &CliError) {
    eprintln!("error: {error}");

    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        eprintln!("caused by: {cause}");
        source = std::error::Error::source(cause);
    }
}
