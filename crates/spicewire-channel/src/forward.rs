//! Handlers that pass channel-specific messages through to the host.

use spicewire_frame::messages::display::DisplayInit;
use spicewire_frame::msg_type::FIRST_CHANNEL_MESSAGE;
use spicewire_frame::{ChannelId, MiniMessage};
use tracing::{debug, trace};

use crate::error::Result;
use crate::handler::{ChannelEvent, ChannelHandler, Outbound};

/// Claims every channel-specific message and emits it as a payload event.
///
/// Used for cursor, playback, record, port and any channel without a
/// dedicated handler; decoding is left to the consumer.
#[derive(Debug, Clone)]
pub struct ForwardHandler {
    channel: ChannelId,
    forwarded: u64,
}

impl ForwardHandler {
    pub fn new(channel: ChannelId) -> Self {
        Self {
            channel,
            forwarded: 0,
        }
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    /// Messages passed to the host so far.
    pub fn forwarded(&self) -> u64 {
        self.forwarded
    }
}

impl ChannelHandler for ForwardHandler {
    fn handle(&mut self, msg: &MiniMessage, out: &mut Outbound) -> Result<bool> {
        if msg.msg_type < FIRST_CHANNEL_MESSAGE {
            return Ok(false);
        }
        trace!(channel = %self.channel, msg_type = msg.msg_type, "forwarding");
        self.forwarded += 1;
        out.emit(ChannelEvent::Payload {
            channel: self.channel,
            message: msg.clone(),
        });
        Ok(true)
    }
}

/// Display channel: announces its caches, then forwards drawing commands.
#[derive(Debug, Clone)]
pub struct DisplayHandler {
    init: DisplayInit,
    inner: ForwardHandler,
}

impl DisplayHandler {
    pub fn new(channel: ChannelId) -> Self {
        Self::with_init(channel, DisplayInit::default())
    }

    /// Use custom cache settings in the init message.
    pub fn with_init(channel: ChannelId, init: DisplayInit) -> Self {
        Self {
            init,
            inner: ForwardHandler::new(channel),
        }
    }

    pub fn forwarded(&self) -> u64 {
        self.inner.forwarded()
    }
}

impl ChannelHandler for DisplayHandler {
    fn on_linked(&mut self, out: &mut Outbound) -> Result<()> {
        debug!(
            channel = %self.inner.channel(),
            cache_size = self.init.pixmap_cache_size,
            "sending display init"
        );
        out.send(&self.init);
        Ok(())
    }

    fn handle(&mut self, msg: &MiniMessage, out: &mut Outbound) -> Result<bool> {
        self.inner.handle(msg, out)
    }
}

#[cfg(test)]
mod tests {
    use spicewire_frame::msg_type::{display, server};
    use spicewire_frame::{ChannelType, WireMessage};

    use super::*;

    #[test]
    fn display_sends_init_on_link() {
        let mut handler = DisplayHandler::new(ChannelId::new(ChannelType::Display, 0));
        let mut out = Outbound::new();
        handler.on_linked(&mut out).expect("on_linked");

        let init = &out.messages()[0];
        assert_eq!(init.msg_type, display::CLIENT_INIT);
        assert_eq!(init.payload.len(), DisplayInit::SIZE);
        assert_eq!(
            DisplayInit::decode(&init.payload).expect("init"),
            DisplayInit::default()
        );
    }

    #[test]
    fn forwards_channel_messages_only() {
        let channel = ChannelId::new(ChannelType::Cursor, 0);
        let mut handler = ForwardHandler::new(channel);
        let mut out = Outbound::new();

        let cursor_set = MiniMessage::new(102, vec![1, 2, 3]);
        assert!(handler.handle(&cursor_set, &mut out).expect("forward"));
        assert!(!handler
            .handle(&MiniMessage::empty(server::WAIT_FOR_CHANNELS), &mut out)
            .expect("common type"));

        assert_eq!(handler.forwarded(), 1);
        assert_eq!(
            out.events(),
            &[ChannelEvent::Payload {
                channel,
                message: cursor_set,
            }]
        );
    }
}
