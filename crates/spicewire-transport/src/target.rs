use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Result, TransportError};
use crate::stream::WireStream;

/// Port used when a target does not name one.
pub const DEFAULT_PORT: u16 = 5900;

const SPICE_SCHEME: &str = "spice://";
const UNIX_PREFIX: &str = "unix:";

/// Where a channel connects to.
///
/// Accepted forms:
/// - `host:port`, `[v6addr]:port`, or a bare `host` (port 5900)
/// - `spice://host:port`
/// - `unix:/path/to/socket`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// A TCP endpoint.
    Tcp { host: String, port: u16 },
    /// A filesystem-path Unix domain socket.
    Unix(PathBuf),
}

impl Target {
    /// Build a TCP target.
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Open a blocking stream to this target.
    ///
    /// `timeout` bounds the TCP connect; Unix sockets connect immediately or fail.
    pub fn connect(&self, timeout: Option<Duration>) -> Result<WireStream> {
        match self {
            Self::Tcp { host, port } => crate::tcp::connect(host, *port, timeout),
            #[cfg(unix)]
            Self::Unix(path) => crate::uds::connect(path),
            #[cfg(not(unix))]
            Self::Unix(path) => Err(TransportError::Connect {
                target: path.display().to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::Unsupported,
                    "unix domain sockets are not available on this platform",
                ),
            }),
        }
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match self {
            Self::Tcp { .. } => "tcp",
            Self::Unix(_) => "unix-domain-socket",
        }
    }
}

impl FromStr for Target {
    type Err = TransportError;

    fn from_str(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(TransportError::InvalidTarget(input.to_string()));
        }

        if let Some(path) = trimmed.strip_prefix(UNIX_PREFIX) {
            let path = path.trim_start_matches("//");
            if path.is_empty() {
                return Err(TransportError::InvalidTarget(input.to_string()));
            }
            return Ok(Self::Unix(PathBuf::from(path)));
        }

        let rest = trimmed.strip_prefix(SPICE_SCHEME).unwrap_or(trimmed);
        let rest = rest.trim_end_matches('/');
        parse_host_port(rest).ok_or_else(|| TransportError::InvalidTarget(input.to_string()))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp { host, port } if host.contains(':') => write!(f, "[{host}]:{port}"),
            Self::Tcp { host, port } => write!(f, "{host}:{port}"),
            Self::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

fn parse_host_port(input: &str) -> Option<Target> {
    if input.is_empty() {
        return None;
    }

    // Bracketed IPv6 literal, with or without a port.
    if let Some(rest) = input.strip_prefix('[') {
        let (host, after) = rest.split_once(']')?;
        if host.is_empty() {
            return None;
        }
        let port = match after.strip_prefix(':') {
            Some(port) => port.parse().ok()?,
            None if after.is_empty() => DEFAULT_PORT,
            None => return None,
        };
        return Some(Target::tcp(host, port));
    }

    match input.rsplit_once(':') {
        // More than one colon without brackets is ambiguous.
        Some((host, _)) if host.contains(':') => None,
        Some((host, port)) if !host.is_empty() => Some(Target::tcp(host, port.parse().ok()?)),
        Some(_) => None,
        None => Some(Target::tcp(input, DEFAULT_PORT)),
    }
}
