use std::fmt;

use serde::Serialize;

/// Lifecycle of one channel connection.
///
/// ```text
/// connecting ─open─▶ start ─header─▶ link ─reply─▶ ticket ─auth ok─▶ ready ─close()─▶ closing
///      │               │               │              │
///      └───────────────┴───────────────┴──────────────┴──────▶ error
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Transport is opening.
    Connecting,
    /// Link message sent, waiting for the server's link header.
    Start,
    /// Waiting for the link reply body.
    Link,
    /// Ticket sent, waiting for the auth verdict.
    Ticket,
    /// Linked; relaying mini-header messages.
    Ready,
    /// Failed. Terminal.
    Error,
    /// Shut down by the caller. Terminal.
    Closing,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Start => "start",
            Self::Link => "link",
            Self::Ticket => "ticket",
            Self::Ready => "ready",
            Self::Error => "error",
            Self::Closing => "closing",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Error | Self::Closing)
    }

    /// True while the link handshake is still running.
    pub fn is_handshaking(self) -> bool {
        matches!(
            self,
            Self::Connecting | Self::Start | Self::Link | Self::Ticket
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
