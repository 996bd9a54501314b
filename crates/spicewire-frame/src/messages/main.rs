use bytes::{Buf, BufMut, BytesMut};
use serde::Serialize;

use crate::channel::{ChannelId, ChannelType};
use crate::error::{ensure, FrameError, Result};
use crate::messages::WireMessage;
use crate::msg_type::main as ty;

/// Mouse mode flags.
pub mod mouse_mode {
    pub const SERVER: u32 = 1;
    pub const CLIENT: u32 = 2;
}

/// Session parameters sent once the main channel is up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MainInit {
    pub session_id: u32,
    pub display_channels_hint: u32,
    pub supported_mouse_modes: u32,
    pub current_mouse_mode: u32,
    pub agent_connected: u32,
    pub agent_tokens: u32,
    pub multi_media_time: u32,
    pub ram_hint: u32,
}

impl MainInit {
    pub const SIZE: usize = 32;

    /// True if client-side mouse mode is supported but not yet active.
    pub fn wants_client_mouse(&self) -> bool {
        self.supported_mouse_modes & mouse_mode::CLIENT != 0
            && self.current_mouse_mode != mouse_mode::CLIENT
    }
}

impl WireMessage for MainInit {
    const MSG_TYPE: u16 = ty::INIT;

    fn encode(&self, dst: &mut BytesMut) {
        for value in [
            self.session_id,
            self.display_channels_hint,
            self.supported_mouse_modes,
            self.current_mouse_mode,
            self.agent_connected,
            self.agent_tokens,
            self.multi_media_time,
            self.ram_hint,
        ] {
            dst.put_u32_le(value);
        }
    }

    fn decode(mut src: &[u8]) -> Result<Self> {
        ensure("main init", src.len(), Self::SIZE)?;
        Ok(Self {
            session_id: src.get_u32_le(),
            display_channels_hint: src.get_u32_le(),
            supported_mouse_modes: src.get_u32_le(),
            current_mouse_mode: src.get_u32_le(),
            agent_connected: src.get_u32_le(),
            agent_tokens: src.get_u32_le(),
            multi_media_time: src.get_u32_le(),
            ram_hint: src.get_u32_le(),
        })
    }
}

/// Channels the server offers for this session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelsList {
    pub channels: Vec<ChannelId>,
}

impl WireMessage for ChannelsList {
    const MSG_TYPE: u16 = ty::CHANNELS_LIST;

    fn encode(&self, dst: &mut BytesMut) {
        dst.put_u32_le(self.channels.len() as u32);
        for channel in &self.channels {
            dst.put_u8(channel.kind.as_u8());
            dst.put_u8(channel.id);
        }
    }

    fn decode(mut src: &[u8]) -> Result<Self> {
        ensure("channels list", src.len(), 4)?;
        let count = src.get_u32_le() as usize;
        let bytes = count.checked_mul(2).ok_or(FrameError::CountOverflow {
            what: "channels list",
            count,
        })?;
        ensure("channels list entries", src.len(), bytes)?;

        let channels = (0..count)
            .map(|_| {
                let kind = ChannelType::from(src.get_u8());
                ChannelId::new(kind, src.get_u8())
            })
            .collect();
        Ok(Self { channels })
    }
}

/// Server report of supported and active mouse modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MouseMode {
    pub supported: u16,
    pub current: u16,
}

impl WireMessage for MouseMode {
    const MSG_TYPE: u16 = ty::MOUSE_MODE;

    fn encode(&self, dst: &mut BytesMut) {
        dst.put_u16_le(self.supported);
        dst.put_u16_le(self.current);
    }

    fn decode(mut src: &[u8]) -> Result<Self> {
        ensure("mouse mode", src.len(), 4)?;
        Ok(Self {
            supported: src.get_u16_le(),
            current: src.get_u16_le(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseModeRequest {
    pub mode: u16,
}

impl WireMessage for MouseModeRequest {
    const MSG_TYPE: u16 = ty::CLIENT_MOUSE_MODE_REQUEST;

    fn encode(&self, dst: &mut BytesMut) {
        dst.put_u16_le(self.mode);
    }

    fn decode(mut src: &[u8]) -> Result<Self> {
        ensure("mouse mode request", src.len(), 2)?;
        Ok(Self {
            mode: src.get_u16_le(),
        })
    }
}

/// Agent token grant. Used by both `AGENT_TOKEN` and `AGENT_CONNECTED_TOKENS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentTokens {
    pub num_tokens: u32,
}

impl WireMessage for AgentTokens {
    const MSG_TYPE: u16 = ty::AGENT_TOKEN;

    fn encode(&self, dst: &mut BytesMut) {
        dst.put_u32_le(self.num_tokens);
    }

    fn decode(mut src: &[u8]) -> Result<Self> {
        ensure("agent tokens", src.len(), 4)?;
        Ok(Self {
            num_tokens: src.get_u32_le(),
        })
    }
}

/// Client opening of the agent stream, granting the server tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentStart {
    pub num_tokens: u32,
}

impl AgentStart {
    /// Grant the maximum the protocol can express.
    pub const UNLIMITED: Self = Self {
        num_tokens: u32::MAX,
    };
}

impl WireMessage for AgentStart {
    const MSG_TYPE: u16 = ty::CLIENT_AGENT_START;

    fn encode(&self, dst: &mut BytesMut) {
        dst.put_u32_le(self.num_tokens);
    }

    fn decode(mut src: &[u8]) -> Result<Self> {
        ensure("agent start", src.len(), 4)?;
        Ok(Self {
            num_tokens: src.get_u32_le(),
        })
    }
}
