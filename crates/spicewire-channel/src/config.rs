use std::fmt;
use std::time::Duration;

use spicewire_frame::{ChannelId, DEFAULT_MAX_MESSAGE};

use crate::caps::MediaSupport;

/// How long a channel may take to reach `ready`.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-channel connection settings.
#[derive(Clone)]
pub struct ConnectionConfig {
    /// Channel category and index to open.
    pub channel: ChannelId,
    /// Session id from the main channel; 0 for the main channel itself.
    pub connection_id: u32,
    /// Ticket password. Treated as a secret and redacted in debug output.
    pub password: Option<String>,
    /// Deadline for the whole link handshake, armed at creation.
    pub connect_timeout: Duration,
    /// Largest message payload accepted from the server.
    pub max_message_size: usize,
    /// Media decoders available to the host.
    pub media: MediaSupport,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            channel: ChannelId::main(),
            connection_id: 0,
            password: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_message_size: DEFAULT_MAX_MESSAGE,
            media: MediaSupport::default(),
        }
    }
}

impl ConnectionConfig {
    /// Default settings for `channel`.
    pub fn for_channel(channel: ChannelId) -> Self {
        Self {
            channel,
            ..Self::default()
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Settings for a child channel of the session this config belongs to.
    pub fn child(&self, channel: ChannelId, session_id: u32) -> Self {
        Self {
            channel,
            connection_id: session_id,
            ..self.clone()
        }
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("ConnectionConfig");
        dbg.field("channel", &self.channel)
            .field("connection_id", &self.connection_id);
        if let Some(password) = &self.password {
            dbg.field(
                "password",
                &format_args!("<redacted:{} bytes>", password.len()),
            );
        } else {
            dbg.field("password", &Option::<String>::None);
        }
        dbg.field("connect_timeout", &self.connect_timeout)
            .field("max_message_size", &self.max_message_size)
            .field("media", &self.media)
            .finish()
    }
}
