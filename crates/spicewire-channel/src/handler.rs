use bytes::Bytes;
use spicewire_frame::messages::common::NotifySeverity;
use spicewire_frame::messages::main::{MainInit, MouseMode};
use spicewire_frame::{ChannelId, MiniMessage, WireMessage};

use crate::error::Result;

/// Something a channel observed that the host application may act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// The link handshake completed.
    Ready { channel: ChannelId },
    /// Main channel session parameters.
    MainInit(MainInit),
    /// Channels the server offers; the session opens one connection per entry.
    ChannelsList(Vec<ChannelId>),
    /// Current and supported mouse modes changed.
    MouseMode(MouseMode),
    AgentConnected { tokens: u32 },
    AgentDisconnected,
    /// A complete message from the guest agent.
    AgentMessage { msg_type: u32, data: Bytes },
    /// Server keyboard lock state (scroll/num/caps).
    KeyModifiers(u16),
    /// The server returned motion credit.
    MotionAck,
    /// A server notification, already logged at its severity.
    Notify {
        severity: NotifySeverity,
        message: String,
    },
    /// A channel-specific message for an external consumer (renderer, audio, port).
    Payload {
        channel: ChannelId,
        message: MiniMessage,
    },
}

/// Messages and events produced while handling one input.
///
/// Handlers never write to the transport directly; the connection drains this
/// after each call, in order.
#[derive(Debug, Default)]
pub struct Outbound {
    messages: Vec<MiniMessage>,
    events: Vec<ChannelEvent>,
    successes: Vec<&'static str>,
}

impl Outbound {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a typed message.
    pub fn send<M: WireMessage>(&mut self, message: &M) {
        self.messages.push(message.to_message());
    }

    /// Queue a raw message.
    pub fn send_raw(&mut self, msg_type: u16, payload: impl Into<Bytes>) {
        self.messages.push(MiniMessage::new(msg_type, payload));
    }

    pub fn push_message(&mut self, message: MiniMessage) {
        self.messages.push(message);
    }

    pub fn emit(&mut self, event: ChannelEvent) {
        self.events.push(event);
    }

    /// Pass a milestone to the connection's success callback.
    pub fn report_success(&mut self, what: &'static str) {
        self.successes.push(what);
    }

    pub fn messages(&self) -> &[MiniMessage] {
        &self.messages
    }

    pub fn events(&self) -> &[ChannelEvent] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.events.is_empty() && self.successes.is_empty()
    }

    pub(crate) fn take_messages(&mut self) -> Vec<MiniMessage> {
        std::mem::take(&mut self.messages)
    }

    pub(crate) fn take_events(&mut self) -> Vec<ChannelEvent> {
        std::mem::take(&mut self.events)
    }

    pub(crate) fn take_successes(&mut self) -> Vec<&'static str> {
        std::mem::take(&mut self.successes)
    }
}

/// Channel-specific message handling, installed once per connection.
pub trait ChannelHandler: Send {
    /// Called when the ticket is accepted, before the connection reports `ready`.
    fn on_linked(&mut self, out: &mut Outbound) -> Result<()> {
        let _ = out;
        Ok(())
    }

    /// Handle a message no common handler claimed. Returns whether it was claimed.
    fn handle(&mut self, msg: &MiniMessage, out: &mut Outbound) -> Result<bool>;
}
