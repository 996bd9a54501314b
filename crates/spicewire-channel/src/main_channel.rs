//! Main channel: session setup, mouse mode negotiation, channel list and the
//! guest agent tunnel.

use std::collections::{BTreeSet, VecDeque};

use bytes::{Bytes, BytesMut};
use spicewire_frame::messages::agent::{
    agent_type, chunk_agent_message, AgentMessage, AnnounceCapabilities, MonitorsConfig,
    AGENT_HEADER_SIZE,
};
use spicewire_frame::messages::main::{
    mouse_mode, AgentStart, AgentTokens, ChannelsList, MainInit, MouseMode, MouseModeRequest,
};
use spicewire_frame::msg_type::main as ty;
use spicewire_frame::{ChannelId, FrameError, MiniMessage, WireMessage, DEFAULT_MAX_MESSAGE};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::handler::{ChannelEvent, ChannelHandler, Outbound};

/// Main channel messages this client recognizes but does not act on.
const UNIMPLEMENTED: &[u16] = &[
    ty::MIGRATE_BEGIN,
    ty::MIGRATE_CANCEL,
    ty::MULTI_MEDIA_TIME,
    ty::MIGRATE_SWITCH_HOST,
    ty::MIGRATE_END,
    ty::NAME,
    ty::UUID,
    ty::MIGRATE_BEGIN_SEAMLESS,
    ty::MIGRATE_DST_SEAMLESS_ACK,
    ty::MIGRATE_DST_SEAMLESS_NACK,
];

/// Token-gated outbound queue and inbound reassembly for the guest agent.
#[derive(Debug, Default)]
struct AgentLink {
    connected: bool,
    tokens: u32,
    queue: VecDeque<Bytes>,
    inbound: BytesMut,
}

impl AgentLink {
    /// Send queued chunks while tokens last. One token per chunk.
    fn flush(&mut self, out: &mut Outbound) {
        if !self.connected {
            return;
        }
        while self.tokens > 0 {
            let Some(chunk) = self.queue.pop_front() else {
                break;
            };
            out.send_raw(ty::CLIENT_AGENT_DATA, chunk);
            self.tokens -= 1;
        }
        if !self.queue.is_empty() {
            debug!(queued = self.queue.len(), "agent tokens exhausted");
        }
    }

    /// Append a server chunk and split off every complete agent message.
    fn reassemble(&mut self, chunk: &[u8]) -> Result<Vec<AgentMessage>> {
        self.inbound.extend_from_slice(chunk);
        let mut complete = Vec::new();
        while self.inbound.len() >= AGENT_HEADER_SIZE {
            let mut size = [0u8; 4];
            size.copy_from_slice(&self.inbound[16..AGENT_HEADER_SIZE]);
            let total = AGENT_HEADER_SIZE + u32::from_le_bytes(size) as usize;
            if total > DEFAULT_MAX_MESSAGE {
                self.inbound.clear();
                return Err(FrameError::PayloadTooLarge {
                    size: total,
                    max: DEFAULT_MAX_MESSAGE,
                }
                .into());
            }
            if self.inbound.len() < total {
                break;
            }
            let raw = self.inbound.split_to(total);
            complete.push(AgentMessage::decode(&raw)?);
        }
        Ok(complete)
    }
}

/// Handler for the main channel.
#[derive(Debug, Default)]
pub struct MainHandler {
    init: Option<MainInit>,
    mouse_mode: u32,
    supported_mouse_modes: u32,
    channels: Vec<ChannelId>,
    agent: AgentLink,
    warned: BTreeSet<u16>,
}

impl MainHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Session id from `MAIN_INIT`; every child channel links with it.
    pub fn session_id(&self) -> Option<u32> {
        self.init.map(|init| init.session_id)
    }

    pub fn init(&self) -> Option<&MainInit> {
        self.init.as_ref()
    }

    /// Current mouse mode (`mouse_mode::SERVER` or `mouse_mode::CLIENT`).
    pub fn mouse_mode(&self) -> u32 {
        self.mouse_mode
    }

    pub fn supported_mouse_modes(&self) -> u32 {
        self.supported_mouse_modes
    }

    /// Channels from the last `CHANNELS_LIST`.
    pub fn channels(&self) -> &[ChannelId] {
        &self.channels
    }

    pub fn agent_connected(&self) -> bool {
        self.agent.connected
    }

    pub fn agent_tokens(&self) -> u32 {
        self.agent.tokens
    }

    /// Agent chunks waiting for tokens.
    pub fn queued_agent_chunks(&self) -> usize {
        self.agent.queue.len()
    }

    /// Chunk `message` into `AGENT_DATA` messages and send what tokens allow.
    ///
    /// Messages are dropped while no agent is connected.
    pub fn send_agent_message(&mut self, message: &AgentMessage, out: &mut Outbound) -> Result<()> {
        if !self.agent.connected {
            warn!(agent_type = message.msg_type, "no agent connected; message dropped");
            return Ok(());
        }
        self.agent.queue.extend(chunk_agent_message(message)?);
        self.agent.flush(out);
        Ok(())
    }

    /// Ask the guest to resize its single monitor.
    pub fn request_resize(&mut self, width: u32, height: u32, out: &mut Outbound) -> Result<()> {
        debug!(width, height, "requesting monitor resize");
        self.send_agent_message(&MonitorsConfig::single(width, height).to_agent_message(), out)
    }

    fn on_init(&mut self, init: MainInit, out: &mut Outbound) {
        info!(
            session_id = init.session_id,
            agent_connected = init.agent_connected,
            "main channel initialized"
        );
        self.init = Some(init);
        self.agent.tokens = init.agent_tokens;
        out.emit(ChannelEvent::MainInit(init));
        out.report_success("connected");

        self.on_mouse_mode(init.current_mouse_mode, init.supported_mouse_modes, out);
        if init.agent_connected != 0 {
            self.connect_agent(out);
        }
        out.send_raw(ty::CLIENT_ATTACH_CHANNELS, Bytes::new());
    }

    fn on_mouse_mode(&mut self, current: u32, supported: u32, out: &mut Outbound) {
        debug!(current, supported, "mouse mode");
        self.mouse_mode = current;
        self.supported_mouse_modes = supported;
        if current != mouse_mode::CLIENT && supported & mouse_mode::CLIENT != 0 {
            out.send(&MouseModeRequest {
                mode: mouse_mode::CLIENT as u16,
            });
        }
        out.emit(ChannelEvent::MouseMode(MouseMode {
            supported: supported as u16,
            current: current as u16,
        }));
    }

    fn connect_agent(&mut self, out: &mut Outbound) {
        info!(tokens = self.agent.tokens, "agent connected");
        self.agent.connected = true;
        out.send(&AgentStart::UNLIMITED);
        out.emit(ChannelEvent::AgentConnected {
            tokens: self.agent.tokens,
        });
        self.announce_capabilities(true, out);
    }

    fn announce_capabilities(&mut self, request: bool, out: &mut Outbound) {
        let announce = AnnounceCapabilities::client_default(request).to_agent_message();
        // A 28-byte message always fits one chunk.
        if let Ok(chunks) = chunk_agent_message(&announce) {
            self.agent.queue.extend(chunks);
        }
        self.agent.flush(out);
    }

    fn on_agent_data(&mut self, payload: &[u8], out: &mut Outbound) -> Result<()> {
        for message in self.agent.reassemble(payload)? {
            debug!(agent_type = message.msg_type, size = message.data.len(), "agent message");
            if message.msg_type == agent_type::ANNOUNCE_CAPABILITIES {
                let caps = AnnounceCapabilities::decode(&message.data)?;
                if caps.request {
                    self.announce_capabilities(false, out);
                }
            }
            out.emit(ChannelEvent::AgentMessage {
                msg_type: message.msg_type,
                data: message.data,
            });
        }
        Ok(())
    }
}

impl ChannelHandler for MainHandler {
    fn handle(&mut self, msg: &MiniMessage, out: &mut Outbound) -> Result<bool> {
        match msg.msg_type {
            ty::INIT => self.on_init(MainInit::decode(&msg.payload)?, out),
            ty::MOUSE_MODE => {
                let mode = MouseMode::decode(&msg.payload)?;
                self.on_mouse_mode(u32::from(mode.current), u32::from(mode.supported), out);
            }
            ty::CHANNELS_LIST => {
                let list = ChannelsList::decode(&msg.payload)?;
                info!(count = list.channels.len(), "server channel list");
                self.channels = list.channels.clone();
                out.emit(ChannelEvent::ChannelsList(list.channels));
            }
            ty::AGENT_CONNECTED => self.connect_agent(out),
            ty::AGENT_CONNECTED_TOKENS => {
                self.agent.tokens = AgentTokens::decode(&msg.payload)?.num_tokens;
                self.connect_agent(out);
            }
            ty::AGENT_TOKEN => {
                let tokens = AgentTokens::decode(&msg.payload)?.num_tokens;
                self.agent.tokens = self.agent.tokens.saturating_add(tokens);
                self.agent.flush(out);
            }
            ty::AGENT_DISCONNECTED => {
                info!("agent disconnected");
                self.agent.connected = false;
                self.agent.inbound.clear();
                out.emit(ChannelEvent::AgentDisconnected);
            }
            ty::AGENT_DATA => self.on_agent_data(&msg.payload, out)?,
            other if UNIMPLEMENTED.contains(&other) => {
                if self.warned.insert(other) {
                    warn!(msg_type = other, "main channel message not implemented");
                }
            }
            _ => return Ok(false),
        }
        Ok(true)
    }
}
