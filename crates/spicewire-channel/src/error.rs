use std::time::Duration;

use spicewire_frame::LinkError;

use crate::state::ConnectionState;

/// Errors that end a channel connection.
///
/// Every variant is fatal to the connection that raised it. Messages nobody
/// handles are logged and never surface here.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] spicewire_transport::TransportError),

    /// Wire structure could not be encoded or decoded.
    #[error("frame error: {0}")]
    Frame(#[from] spicewire_frame::FrameError),

    /// The transport closed or failed before it ever opened.
    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    /// The server does not speak this protocol or version.
    #[error("protocol mismatch: {0}")]
    ProtocolMismatch(String),

    /// The server answered the link message with an error code.
    #[error("link rejected: {0}")]
    LinkRejected(LinkError),

    /// The server refused the ticket.
    #[error("permission denied (bad credential)")]
    PermissionDenied,

    /// The server closed the connection while the ticket was being checked.
    #[error("bad credential: server closed during authentication")]
    BadCredential,

    /// The server answered the ticket with an unexpected code.
    #[error("authentication failed: {0}")]
    AuthFailed(LinkError),

    /// The link did not complete within the connect timeout.
    #[error("connection timed out after {0:?}")]
    Timeout(Duration),

    /// The transport went away after the link completed.
    #[error("unexpected close while {0}")]
    Disconnected(ConnectionState),

    /// The credential could not be encrypted with the server key.
    #[error("ticket encryption failed: {0}")]
    Encryption(String),

    /// The operation needs an established channel.
    #[error("channel not ready (state {0})")]
    NotReady(ConnectionState),

    /// A channel thread could not be started or panicked.
    #[error("channel worker failed: {0}")]
    Worker(String),
}

pub type Result<T> = std::result::Result<T, ChannelError>;
