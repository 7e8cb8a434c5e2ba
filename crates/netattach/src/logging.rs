use std::fmt;
use std::io;

use clap::ValueEnum as _;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt as _, util::SubscriberInitExt as _};

use crate::error::{CliError, Result};

const CRATES: [&str; 4] = [
    "netattach",
    "netattach_operations",
    "netattach_saga",
    "netattach_exclusion",
];

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = self.to_possible_value().ok_or(fmt::Error)?;
        f.write_str(value.get_name())
    }
}

/// Filter for an explicit `--log-level`: our crates at that level,
/// everything else at `warn`.
fn level_filter(level: LogLevel) -> String {
    let mut directives: Vec<String> = CRATES
        .iter()
        .map(|krate| format!("{krate}={level}"))
        .collect();
    directives.push("warn".to_string());
    directives.join(",")
}

/// Installs the global subscriber, writing to stderr so command output on
/// stdout stays machine readable.
///
/// `--log-level` wins over `RUST_LOG`; with neither, only warnings and
/// errors are shown.
pub(crate) fn init_tracing(level: Option<LogLevel>) -> Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::new(level_filter(level)),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_target(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|_| CliError::TracingInit)
}
