//! Handlers shared by every channel: ack window, ping and notify.

use spicewire_frame::messages::common::{pong_payload, AckSync, Notify, NotifySeverity, SetAck};
use spicewire_frame::msg_type::{client, server};
use spicewire_frame::{ChannelId, MiniMessage, WireMessage};
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::handler::{ChannelEvent, Outbound};

/// Acknowledgement window announced by the server.
///
/// Once a window is set, every `window` dispatched messages the client owes
/// the server one `ACK`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AckWindow {
    generation: u32,
    window: u32,
    until_ack: u32,
}

impl AckWindow {
    /// Install a new window and restart the countdown.
    pub fn set(&mut self, generation: u32, window: u32) {
        self.generation = generation;
        self.window = window;
        self.until_ack = window;
    }

    pub fn is_active(&self) -> bool {
        self.window > 0
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn window(&self) -> u32 {
        self.window
    }

    /// Messages left before the next ack is due.
    pub fn until_ack(&self) -> u32 {
        self.until_ack
    }

    /// Count one dispatched message. Returns true when an ack is due.
    pub fn record(&mut self) -> bool {
        if !self.is_active() {
            return false;
        }
        self.until_ack = self.until_ack.saturating_sub(1);
        if self.until_ack == 0 {
            self.until_ack = self.window;
            return true;
        }
        false
    }
}

/// Offer `msg` to the common handlers. Returns whether one claimed it.
pub fn handle_common(
    channel: ChannelId,
    msg: &MiniMessage,
    ack: &mut AckWindow,
    out: &mut Outbound,
) -> Result<bool> {
    match msg.msg_type {
        server::SET_ACK => {
            let set = SetAck::decode(&msg.payload)?;
            ack.set(set.generation, set.window);
            debug!(%channel, generation = set.generation, window = set.window, "ack window set");
            out.send(&AckSync {
                generation: set.generation,
            });
            Ok(true)
        }
        server::PING => {
            out.send_raw(client::PONG, pong_payload(&msg.payload));
            Ok(true)
        }
        server::NOTIFY => {
            let notify = Notify::decode(&msg.payload)?;
            log_notify(channel, &notify);
            out.emit(ChannelEvent::Notify {
                severity: notify.severity,
                message: notify.message,
            });
            Ok(true)
        }
        _ => Ok(false),
    }
}

fn log_notify(channel: ChannelId, notify: &Notify) {
    let message = notify.message.as_str();
    match notify.severity {
        NotifySeverity::Error => error!(%channel, what = notify.what, "server: {message}"),
        NotifySeverity::Warn => warn!(%channel, what = notify.what, "server: {message}"),
        NotifySeverity::Info => info!(%channel, what = notify.what, "server: {message}"),
        NotifySeverity::Other(raw) => {
            debug!(%channel, severity = raw, "server notification: {message}")
        }
    }
}
