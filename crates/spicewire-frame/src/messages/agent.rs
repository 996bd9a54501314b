//! Guest agent messages carried inside main-channel `AGENT_DATA`.
//!
//! An agent message has its own 20-byte header and may be split across several
//! `AGENT_DATA` messages; see [`chunk_agent_message`].

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{ensure, FrameError, Result};

pub const AGENT_PROTOCOL: u32 = 1;

/// Agent header: protocol (4) + type (4) + opaque (8) + size (4).
pub const AGENT_HEADER_SIZE: usize = 20;

/// Largest `AGENT_DATA` payload the agent accepts.
pub const AGENT_MAX_DATA_SIZE: usize = 2048;

/// Largest chunk this client sends per `AGENT_DATA` message.
pub const AGENT_CHUNK_SIZE: usize = AGENT_MAX_DATA_SIZE - 6;

pub mod agent_type {
    pub const MOUSE_STATE: u32 = 1;
    pub const MONITORS_CONFIG: u32 = 2;
    pub const REPLY: u32 = 3;
    pub const CLIPBOARD: u32 = 4;
    pub const DISPLAY_CONFIG: u32 = 5;
    pub const ANNOUNCE_CAPABILITIES: u32 = 6;
}

pub mod agent_cap {
    pub const MOUSE_STATE: u32 = 0;
    pub const MONITORS_CONFIG: u32 = 1;
    pub const REPLY: u32 = 2;
}

/// A complete agent message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentMessage {
    pub protocol: u32,
    pub msg_type: u32,
    pub opaque: u64,
    pub data: Bytes,
}

impl AgentMessage {
    pub fn new(msg_type: u32, data: impl Into<Bytes>) -> Self {
        Self {
            protocol: AGENT_PROTOCOL,
            msg_type,
            opaque: 0,
            data: data.into(),
        }
    }

    pub fn encoded_len(&self) -> usize {
        AGENT_HEADER_SIZE + self.data.len()
    }

    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let size = u32::try_from(self.data.len()).map_err(|_| FrameError::PayloadTooLarge {
            size: self.data.len(),
            max: u32::MAX as usize,
        })?;
        dst.reserve(self.encoded_len());
        dst.put_u32_le(self.protocol);
        dst.put_u32_le(self.msg_type);
        dst.put_u64_le(self.opaque);
        dst.put_u32_le(size);
        dst.put_slice(&self.data);
        Ok(())
    }

    /// Decode a fully reassembled agent message.
    pub fn decode(mut src: &[u8]) -> Result<Self> {
        ensure("agent header", src.len(), AGENT_HEADER_SIZE)?;
        let protocol = src.get_u32_le();
        let msg_type = src.get_u32_le();
        let opaque = src.get_u64_le();
        let size = src.get_u32_le() as usize;
        ensure("agent data", src.len(), size)?;
        Ok(Self {
            protocol,
            msg_type,
            opaque,
            data: Bytes::copy_from_slice(&src[..size]),
        })
    }
}

/// Split an encoded agent message into `AGENT_DATA`-sized chunks.
pub fn chunk_agent_message(message: &AgentMessage) -> Result<Vec<Bytes>> {
    let mut encoded = BytesMut::new();
    message.encode(&mut encoded)?;
    let mut encoded = encoded.freeze();

    let mut chunks = Vec::with_capacity(encoded.len().div_ceil(AGENT_CHUNK_SIZE));
    while !encoded.is_empty() {
        let n = encoded.len().min(AGENT_CHUNK_SIZE);
        chunks.push(encoded.split_to(n));
    }
    Ok(chunks)
}

/// Capability announcement sent to the agent when the session starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnnounceCapabilities {
    pub request: bool,
    pub caps: u32,
}

impl AnnounceCapabilities {
    /// The capabilities this client supports.
    pub fn client_default(request: bool) -> Self {
        Self {
            request,
            caps: (1 << agent_cap::MOUSE_STATE)
                | (1 << agent_cap::MONITORS_CONFIG)
                | (1 << agent_cap::REPLY),
        }
    }

    pub fn to_agent_message(&self) -> AgentMessage {
        let mut data = BytesMut::with_capacity(8);
        data.put_u32_le(u32::from(self.request));
        data.put_u32_le(self.caps);
        AgentMessage::new(agent_type::ANNOUNCE_CAPABILITIES, data.freeze())
    }

    pub fn decode(mut src: &[u8]) -> Result<Self> {
        ensure("announce capabilities", src.len(), 8)?;
        Ok(Self {
            request: src.get_u32_le() != 0,
            caps: src.get_u32_le(),
        })
    }
}

/// Request that the guest resize its single monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorsConfig {
    pub flags: u32,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub x: u32,
    pub y: u32,
}

impl MonitorsConfig {
    pub const SIZE: usize = 28;

    pub fn single(width: u32, height: u32) -> Self {
        Self {
            flags: 0,
            width,
            height,
            depth: 32,
            x: 0,
            y: 0,
        }
    }

    pub fn to_agent_message(&self) -> AgentMessage {
        let mut data = BytesMut::with_capacity(Self::SIZE);
        data.put_u32_le(1);
        data.put_u32_le(self.flags);
        data.put_u32_le(self.height);
        data.put_u32_le(self.width);
        data.put_u32_le(self.depth);
        data.put_u32_le(self.x);
        data.put_u32_le(self.y);
        AgentMessage::new(agent_type::MONITORS_CONFIG, data.freeze())
    }
}
