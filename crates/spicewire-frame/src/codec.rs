use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{ensure, FrameError, Result};

/// Mini header: type (2) + size (4) = 6 bytes.
pub const MINI_HEADER_SIZE: usize = 6;

/// Default maximum message payload accepted from a server: 16 MiB.
pub const DEFAULT_MAX_MESSAGE: usize = 16 * 1024 * 1024;

/// Steady-state message envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MiniHeader {
    pub msg_type: u16,
    pub size: u32,
}

impl MiniHeader {
    pub fn decode(mut src: &[u8]) -> Result<Self> {
        ensure("mini header", src.len(), MINI_HEADER_SIZE)?;
        Ok(Self {
            msg_type: src.get_u16_le(),
            size: src.get_u32_le(),
        })
    }

    /// Fail if the announced payload exceeds `max`.
    pub fn check_size(&self, max: usize) -> Result<()> {
        let size = self.size as usize;
        if size > max {
            return Err(FrameError::PayloadTooLarge { size, max });
        }
        Ok(())
    }
}

/// A decoded message: type plus its complete payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MiniMessage {
    pub msg_type: u16,
    pub payload: Bytes,
}

impl MiniMessage {
    pub fn new(msg_type: u16, payload: impl Into<Bytes>) -> Self {
        Self {
            msg_type,
            payload: payload.into(),
        }
    }

    /// A message with no payload.
    pub fn empty(msg_type: u16) -> Self {
        Self::new(msg_type, Bytes::new())
    }

    /// The total wire size of this message (header + payload).
    pub fn wire_size(&self) -> usize {
        MINI_HEADER_SIZE + self.payload.len()
    }

    /// Serialize into one contiguous frame.
    pub fn to_frame(&self) -> Result<Bytes> {
        let mut dst = BytesMut::with_capacity(self.wire_size());
        encode_message(self.msg_type, &self.payload, &mut dst)?;
        Ok(dst.freeze())
    }
}

/// Encode a message into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬──────────────┬──────────────────┐
/// │ Type (2B LE) │ Size (4B LE) │ Payload          │
/// │              │              │ (Size bytes)     │
/// └──────────────┴──────────────┴──────────────────┘
/// ```
pub fn encode_message(msg_type: u16, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    let size = u32::try_from(payload.len()).map_err(|_| FrameError::PayloadTooLarge {
        size: payload.len(),
        max: u32::MAX as usize,
    })?;
    dst.reserve(MINI_HEADER_SIZE + payload.len());
    dst.put_u16_le(msg_type);
    dst.put_u32_le(size);
    dst.put_slice(payload);
    Ok(())
}
