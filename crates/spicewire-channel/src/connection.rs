//! One channel connection as a sans-IO state machine.
//!
//! The connection never touches a socket. A driver feeds it transport events
//! ([`Connection::on_open`], [`Connection::on_data`], [`Connection::on_close`],
//! [`Connection::on_transport_error`]) plus the clock ([`Connection::poll_timeout`]),
//! and writes out whatever frames it queues ([`Connection::flush_to`]).
//!
//! Inbound bytes flow through a [`WireReader`]: link header, link reply and
//! auth reply during the handshake, then alternating mini headers and payloads.

use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use spicewire_frame::caps::common;
use spicewire_frame::link::{AUTH_REPLY_SIZE, LINK_HEADER_SIZE, VERSION_MAJOR};
use spicewire_frame::msg_type::client;
use spicewire_frame::{
    AuthReply, AuthTicket, CapabilitySet, ChannelId, LinkError, LinkHeader, LinkMess, LinkReply,
    MiniHeader, MiniMessage, WireMessage, WireReader, MINI_HEADER_SIZE,
};
use spicewire_transport::{Transport, TransportError};
use tracing::{debug, error, info, trace, warn};

use crate::builtin::BuiltinHandler;
use crate::caps::{CapabilityProbe, StandardCaps};
use crate::common::{handle_common, AckWindow};
use crate::config::ConnectionConfig;
use crate::error::{ChannelError, Result};
use crate::handler::{ChannelEvent, ChannelHandler, Outbound};
use crate::state::ConnectionState;
use crate::ticket::{default_encryptor, ticket_plaintext, TicketEncryptor};

/// Callback for fatal errors. When set, errors are reported here instead of
/// being returned from the event entry points.
pub type ErrorCallback = Box<dyn FnMut(&ChannelError) + Send>;

/// Callback for success notifications ("linked", "connected").
pub type SuccessCallback = Box<dyn FnMut(&str) + Send>;

/// Capabilities the server announced in its link reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerCaps {
    pub common: CapabilitySet,
    pub channel: CapabilitySet,
}

/// A single channel connection driven by transport events.
pub struct Connection<H = BuiltinHandler> {
    config: ConnectionConfig,
    state: ConnectionState,
    handler: H,
    reader: WireReader<MiniHeader>,
    probe: Box<dyn CapabilityProbe>,
    encryptor: Box<dyn TicketEncryptor>,
    ack: AckWindow,
    deadline: Option<Instant>,
    server_caps: Option<ServerCaps>,
    scratch: Outbound,
    outbox: VecDeque<Bytes>,
    events: VecDeque<ChannelEvent>,
    messages_sent: u64,
    messages_received: u64,
    unhandled: u64,
    close_requested: bool,
    on_error: Option<ErrorCallback>,
    on_success: Option<SuccessCallback>,
}

impl<H: ChannelHandler> Connection<H> {
    /// Create a connection in `connecting`, arming the connect timer now.
    pub fn new(config: ConnectionConfig, handler: H) -> Self {
        Self::new_at(config, handler, Instant::now())
    }

    /// Like [`Connection::new`] with an explicit creation time.
    pub fn new_at(config: ConnectionConfig, handler: H, now: Instant) -> Self {
        let probe = Box::new(StandardCaps::new(config.media));
        let deadline = now.checked_add(config.connect_timeout);
        Self {
            config,
            state: ConnectionState::Connecting,
            handler,
            reader: WireReader::new(),
            probe,
            encryptor: default_encryptor(),
            ack: AckWindow::default(),
            deadline,
            server_caps: None,
            scratch: Outbound::new(),
            outbox: VecDeque::new(),
            events: VecDeque::new(),
            messages_sent: 0,
            messages_received: 0,
            unhandled: 0,
            close_requested: false,
            on_error: None,
            on_success: None,
        }
    }

    pub fn with_encryptor(self, encryptor: impl TicketEncryptor + 'static) -> Self {
        self.with_boxed_encryptor(Box::new(encryptor))
    }

    pub fn with_boxed_encryptor(mut self, encryptor: Box<dyn TicketEncryptor>) -> Self {
        self.encryptor = encryptor;
        self
    }

    pub fn with_probe(mut self, probe: impl CapabilityProbe + 'static) -> Self {
        self.probe = Box::new(probe);
        self
    }

    pub fn set_on_error(&mut self, callback: impl FnMut(&ChannelError) + Send + 'static) {
        self.on_error = Some(Box::new(callback));
    }

    pub fn set_on_success(&mut self, callback: impl FnMut(&str) + Send + 'static) {
        self.on_success = Some(Box::new(callback));
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn channel(&self) -> ChannelId {
        self.config.channel
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == ConnectionState::Ready
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn ack_window(&self) -> AckWindow {
        self.ack
    }

    /// Capabilities from the link reply, once received.
    pub fn server_caps(&self) -> Option<&ServerCaps> {
        self.server_caps.as_ref()
    }

    /// When the connect timer fires, if it is still armed.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Mini messages sent since the link completed.
    pub fn messages_sent(&self) -> u64 {
        self.messages_sent
    }

    pub fn messages_received(&self) -> u64 {
        self.messages_received
    }

    /// Messages neither a common nor the channel handler claimed.
    pub fn unhandled_messages(&self) -> u64 {
        self.unhandled
    }

    /// True once the transport should be torn down.
    pub fn wants_close(&self) -> bool {
        self.close_requested
    }

    /// Transport opened: send the link message and wait for the server header.
    pub fn on_open(&mut self) -> Result<()> {
        if self.state != ConnectionState::Connecting {
            debug!(channel = %self.channel(), state = %self.state, "open ignored");
            return Ok(());
        }

        let link = LinkMess {
            connection_id: self.config.connection_id,
            channel: self.config.channel,
            common_caps: self.probe.common_caps(),
            channel_caps: self.probe.channel_caps(self.config.channel.kind),
        };
        let mut frame = BytesMut::new();
        if let Err(err) = link.encode_with_header(&mut frame) {
            return self.fail(err.into());
        }
        self.outbox.push_back(frame.freeze());

        self.reader.request(LINK_HEADER_SIZE);
        self.transition(ConnectionState::Start);
        Ok(())
    }

    /// Transport delivered bytes.
    pub fn on_data(&mut self, chunk: Bytes) -> Result<()> {
        if self.state.is_terminal() {
            trace!(channel = %self.channel(), bytes = chunk.len(), "data after close dropped");
            return Ok(());
        }
        self.reader.push(chunk);

        while let Some((frame, header)) = self.reader.next_frame() {
            self.process_inbound(frame, header)?;
            if self.state.is_terminal() {
                break;
            }
        }
        Ok(())
    }

    /// Transport closed by the peer.
    pub fn on_close(&mut self) -> Result<()> {
        let cause = match self.state {
            ConnectionState::Error | ConnectionState::Closing => return Ok(()),
            ConnectionState::Connecting => {
                ChannelError::ConnectionRefused("transport closed before opening".to_string())
            }
            ConnectionState::Start | ConnectionState::Link => {
                ChannelError::ProtocolMismatch("server closed during link".to_string())
            }
            ConnectionState::Ticket => ChannelError::BadCredential,
            ConnectionState::Ready => ChannelError::Disconnected(ConnectionState::Ready),
        };
        self.fail(cause)
    }

    /// Transport failed.
    pub fn on_transport_error(&mut self, err: TransportError) -> Result<()> {
        if self.state.is_terminal() {
            debug!(channel = %self.channel(), error = %err, "transport error after close");
            return Ok(());
        }
        let cause = if self.state == ConnectionState::Connecting {
            ChannelError::ConnectionRefused(err.to_string())
        } else {
            ChannelError::Transport(err)
        };
        self.fail(cause)
    }

    /// Fire the connect timer if `now` is past the deadline.
    pub fn poll_timeout(&mut self, now: Instant) -> Result<()> {
        match self.deadline {
            Some(deadline) if now >= deadline && self.state.is_handshaking() => {
                let timeout = self.config.connect_timeout;
                self.fail(ChannelError::Timeout(timeout))
            }
            _ => Ok(()),
        }
    }

    /// Shut down on the caller's request. Never reported as an error.
    pub fn close(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        info!(channel = %self.channel(), state = %self.state, "closing channel");
        self.deadline = None;
        self.reader.clear_header();
        self.reader.request(0);
        self.close_requested = true;
        self.transition(ConnectionState::Closing);
    }

    /// Send a typed message on a ready channel.
    pub fn send<M: WireMessage>(&mut self, message: &M) -> Result<()> {
        self.send_message(message.to_message())
    }

    /// Send a raw message on a ready channel.
    pub fn send_message(&mut self, message: MiniMessage) -> Result<()> {
        self.ensure_ready()?;
        self.queue_message(&message)
    }

    /// Run `f` against the channel handler and send what it queues.
    pub fn with_handler<R>(
        &mut self,
        f: impl FnOnce(&mut H, &mut Outbound) -> Result<R>,
    ) -> Result<R> {
        self.ensure_ready()?;
        let mut out = std::mem::take(&mut self.scratch);
        let result = f(&mut self.handler, &mut out);
        self.scratch = out;
        let flushed = self.flush_scratch();
        let value = result?;
        flushed?;
        Ok(value)
    }

    /// Remove and return all queued outbound frames.
    pub fn take_outbox(&mut self) -> Vec<Bytes> {
        self.outbox.drain(..).collect()
    }

    pub fn has_outbound(&self) -> bool {
        !self.outbox.is_empty()
    }

    /// Write every queued frame to `transport`, one frame per call.
    ///
    /// A transport failure is routed through the error path like any other.
    pub fn flush_to<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<usize> {
        let mut written = 0;
        while let Some(frame) = self.outbox.pop_front() {
            if let Err(err) = transport.send(&frame) {
                self.outbox.clear();
                self.on_transport_error(err)?;
                return Ok(written);
            }
            written += 1;
        }
        Ok(written)
    }

    pub fn poll_event(&mut self) -> Option<ChannelEvent> {
        self.events.pop_front()
    }

    pub fn drain_events(&mut self) -> Vec<ChannelEvent> {
        self.events.drain(..).collect()
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.state != ConnectionState::Ready {
            return Err(ChannelError::NotReady(self.state));
        }
        Ok(())
    }

    fn transition(&mut self, next: ConnectionState) {
        debug!(channel = %self.channel(), from = %self.state, to = %next, "state change");
        self.state = next;
    }

    /// Single fatal-error path: log, mark failed, then callback or return.
    fn fail(&mut self, err: ChannelError) -> Result<()> {
        error!(channel = %self.channel(), state = %self.state, error = %err, "channel failed");
        self.transition(ConnectionState::Error);
        self.deadline = None;
        self.reader.clear_header();
        self.reader.request(0);
        self.close_requested = true;

        match self.on_error.as_mut() {
            Some(callback) => {
                callback(&err);
                Ok(())
            }
            None => Err(err),
        }
    }

    fn process_inbound(&mut self, frame: Bytes, header: Option<MiniHeader>) -> Result<()> {
        trace!(channel = %self.channel(), state = %self.state, bytes = frame.len(), "frame");
        match self.state {
            ConnectionState::Start => self.on_link_header(&frame),
            ConnectionState::Link => self.on_link_reply(&frame),
            ConnectionState::Ticket => self.on_auth_reply(&frame),
            ConnectionState::Ready => match header {
                None => self.on_mini_header(&frame),
                Some(header) => {
                    self.reader.request(MINI_HEADER_SIZE);
                    self.dispatch(MiniMessage::new(header.msg_type, frame))
                }
            },
            ConnectionState::Connecting | ConnectionState::Error | ConnectionState::Closing => {
                Ok(())
            }
        }
    }

    fn on_link_header(&mut self, frame: &[u8]) -> Result<()> {
        let header = match LinkHeader::decode(frame) {
            Ok(header) => header,
            Err(err) => return self.fail(err.into()),
        };
        if !header.has_valid_magic() {
            let magic = header.magic;
            return self.fail(ChannelError::ProtocolMismatch(format!(
                "magic mismatch: {magic:02x?}"
            )));
        }
        if header.major_version != VERSION_MAJOR {
            return self.fail(ChannelError::ProtocolMismatch(format!(
                "server speaks version {}.{}",
                header.major_version, header.minor_version
            )));
        }
        if header.minor_version != spicewire_frame::link::VERSION_MINOR {
            debug!(
                channel = %self.channel(),
                minor = header.minor_version,
                "server minor version differs"
            );
        }

        let size = header.size as usize;
        if size == 0 || size > self.config.max_message_size {
            return self.fail(ChannelError::ProtocolMismatch(format!(
                "implausible link reply size {size}"
            )));
        }
        self.reader.request(size);
        self.transition(ConnectionState::Link);
        Ok(())
    }

    fn on_link_reply(&mut self, frame: &[u8]) -> Result<()> {
        let reply = match LinkReply::decode(frame) {
            Ok(reply) => reply,
            Err(err) => return self.fail(err.into()),
        };
        if !reply.error.is_ok() {
            return self.fail(ChannelError::LinkRejected(reply.error));
        }
        if !reply.common_caps.has(common::AUTH_SPICE) && !reply.common_caps.is_empty() {
            warn!(channel = %self.channel(), "server does not list spice auth");
        }
        self.server_caps = Some(ServerCaps {
            common: reply.common_caps,
            channel: reply.channel_caps,
        });

        let plaintext = ticket_plaintext(self.config.password.as_deref());
        let encrypted = match self.encryptor.encrypt(&reply.pub_key, &plaintext) {
            Ok(encrypted) => encrypted,
            Err(err) => return self.fail(err),
        };
        let ticket = AuthTicket {
            mechanism: common::AUTH_SPICE,
            encrypted: Bytes::from(encrypted),
        };
        let mut out = BytesMut::new();
        if let Err(err) = ticket.encode(&mut out) {
            return self.fail(err.into());
        }
        self.outbox.push_back(out.freeze());

        self.reader.request(AUTH_REPLY_SIZE);
        self.transition(ConnectionState::Ticket);
        Ok(())
    }

    fn on_auth_reply(&mut self, frame: &[u8]) -> Result<()> {
        let reply = match AuthReply::decode(frame) {
            Ok(reply) => reply,
            Err(err) => return self.fail(err.into()),
        };
        match reply.code {
            LinkError::OK => {}
            LinkError::PERMISSION_DENIED => return self.fail(ChannelError::PermissionDenied),
            code => return self.fail(ChannelError::AuthFailed(code)),
        }

        let mut out = std::mem::take(&mut self.scratch);
        let linked = self.handler.on_linked(&mut out);
        self.scratch = out;
        if let Err(err) = linked {
            return self.fail(err);
        }

        self.deadline = None;
        self.reader.request(MINI_HEADER_SIZE);
        self.transition(ConnectionState::Ready);
        info!(channel = %self.channel(), "channel linked");

        let channel = self.channel();
        self.events.push_back(ChannelEvent::Ready { channel });
        if let Some(callback) = self.on_success.as_mut() {
            callback("linked");
        }
        // Messages queued by on_linked go out before anything else.
        if let Err(err) = self.flush_scratch() {
            return self.fail(err);
        }
        Ok(())
    }

    fn on_mini_header(&mut self, frame: &[u8]) -> Result<()> {
        let header = match MiniHeader::decode(frame) {
            Ok(header) => header,
            Err(err) => return self.fail(err.into()),
        };
        if let Err(err) = header.check_size(self.config.max_message_size) {
            return self.fail(err.into());
        }

        if header.size == 0 {
            self.reader.request(MINI_HEADER_SIZE);
            return self.dispatch(MiniMessage::empty(header.msg_type));
        }
        self.reader.request(header.size as usize);
        self.reader.save_header(header);
        Ok(())
    }

    fn dispatch(&mut self, msg: MiniMessage) -> Result<()> {
        self.messages_received += 1;
        let channel = self.channel();
        debug!(%channel, msg_type = msg.msg_type, size = msg.payload.len(), "<< message");

        let mut out = std::mem::take(&mut self.scratch);
        let claimed = match handle_common(channel, &msg, &mut self.ack, &mut out) {
            Ok(false) => self.handler.handle(&msg, &mut out),
            other => other,
        };
        self.scratch = out;

        let claimed = match claimed {
            Ok(claimed) => claimed,
            Err(err) => return self.fail(err),
        };
        if let Err(err) = self.flush_scratch() {
            return self.fail(err);
        }

        if !claimed {
            self.unhandled += 1;
            warn!(%channel, msg_type = msg.msg_type, "no handler for message");
        }

        // Every received message counts, SET_ACK and unclaimed ones included.
        if self.ack.record() {
            trace!(%channel, "sending ack");
            if let Err(err) = self.queue_message(&MiniMessage::empty(client::ACK)) {
                return self.fail(err);
            }
        }
        Ok(())
    }

    fn flush_scratch(&mut self) -> Result<()> {
        for message in self.scratch.take_messages() {
            self.queue_message(&message)?;
        }
        self.events.extend(self.scratch.take_events());
        let successes = self.scratch.take_successes();
        if let Some(callback) = self.on_success.as_mut() {
            for what in successes {
                callback(what);
            }
        }
        Ok(())
    }

    /// Serialize one message into one contiguous frame.
    fn queue_message(&mut self, message: &MiniMessage) -> Result<()> {
        let frame = message.to_frame()?;
        self.messages_sent += 1;
        debug!(
            channel = %self.channel(),
            msg_type = message.msg_type,
            size = message.payload.len(),
            ">> message"
        );
        self.outbox.push_back(frame);
        Ok(())
    }
}

impl Connection<BuiltinHandler> {
    /// A connection with the standard handler for its channel type.
    pub fn builtin(config: ConnectionConfig) -> Self {
        let handler = BuiltinHandler::for_channel(config.channel);
        Self::new(config, handler)
    }
}

impl<H> Connection<H> {
    /// Time left before the connect timer fires.
    pub fn time_until_deadline(&self, now: Instant) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(now))
    }
}

impl<H> fmt::Debug for Connection<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("ack", &self.ack)
            .field("reader", &self.reader)
            .field("outbox", &self.outbox.len())
            .field("events", &self.events.len())
            .field("messages_sent", &self.messages_sent)
            .finish()
    }
}
