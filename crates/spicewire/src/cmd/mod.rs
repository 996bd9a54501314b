use std::time::Duration;

use clap::{Args, Subcommand};
use spicewire_transport::Target;

use crate::exit::{transport_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod connect;
pub mod info;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a full session and print channel events until Ctrl-C.
    Connect(ConnectArgs),
    /// Link the main channel and print what the server reports.
    Info(InfoArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Connect(args) => connect::run(args, format),
        Command::Info(args) => info::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ConnectArgs {
    /// Server: host:port, spice://host:port or unix:/path.
    pub target: String,
    /// Ticket password.
    #[arg(long, env = "SPICE_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
    /// Link handshake timeout per channel (e.g. 30s, 500ms).
    #[arg(long, default_value = "30s")]
    pub timeout: String,
    /// Also print channel payloads (display, cursor, playback, port traffic).
    #[arg(long)]
    pub payloads: bool,
    /// Disconnect after printing N events.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Server: host:port, spice://host:port or unix:/path.
    pub target: String,
    /// Ticket password.
    #[arg(long, env = "SPICE_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
    /// Time allowed for the link and the server's channel list (e.g. 5s, 500ms).
    #[arg(long, default_value = "10s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) fn parse_target(input: &str) -> CliResult<Target> {
    input
        .parse()
        .map_err(|err| transport_error("invalid target", err))
}

pub(crate) fn parse_timeout(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "timeout must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid timeout value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "timeout must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
