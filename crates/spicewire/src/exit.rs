use std::fmt;
use std::io;

use spicewire_channel::ChannelError;
use spicewire_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        _ => TRANSPORT_ERROR,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Connect { source, .. } | TransportError::Io(source) => {
            io_error(context, source)
        }
        TransportError::InvalidTarget(_) | TransportError::PathTooLong { .. } => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn channel_error(context: &str, err: ChannelError) -> CliError {
    let code = match &err {
        ChannelError::Transport(_) | ChannelError::ConnectionRefused(_) => TRANSPORT_ERROR,
        ChannelError::Frame(_)
        | ChannelError::ProtocolMismatch(_)
        | ChannelError::LinkRejected(_)
        | ChannelError::Encryption(_) => DATA_INVALID,
        ChannelError::PermissionDenied
        | ChannelError::BadCredential
        | ChannelError::AuthFailed(_) => PERMISSION_DENIED,
        ChannelError::Timeout(_) => TIMEOUT,
        ChannelError::Disconnected(_) => FAILURE,
        ChannelError::NotReady(_) | ChannelError::Worker(_) => INTERNAL,
    };
    match err {
        ChannelError::Transport(err) => transport_error(context, err),
        other => CliError::new(code, format!("{context}: {other}")),
    }
}
