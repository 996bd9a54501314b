use bytes::{Buf, BufMut, BytesMut};

use crate::error::{ensure, Result};
use crate::messages::WireMessage;
use crate::msg_type::display as ty;

/// Image cache size advertised to the server: 100 MiB.
pub const DEFAULT_PIXMAP_CACHE_SIZE: u64 = 100 * 1024 * 1024;

/// Cache parameters the client sends once the display channel is linked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayInit {
    pub pixmap_cache_id: u8,
    pub pixmap_cache_size: u64,
    pub glz_dictionary_id: u8,
    pub glz_dictionary_window_size: u32,
}

impl DisplayInit {
    pub const SIZE: usize = 14;
}

impl Default for DisplayInit {
    fn default() -> Self {
        Self {
            pixmap_cache_id: 1,
            pixmap_cache_size: DEFAULT_PIXMAP_CACHE_SIZE,
            glz_dictionary_id: 0,
            glz_dictionary_window_size: 0,
        }
    }
}

impl WireMessage for DisplayInit {
    const MSG_TYPE: u16 = ty::CLIENT_INIT;

    fn encode(&self, dst: &mut BytesMut) {
        dst.put_u8(self.pixmap_cache_id);
        dst.put_u64_le(self.pixmap_cache_size);
        dst.put_u8(self.glz_dictionary_id);
        dst.put_u32_le(self.glz_dictionary_window_size);
    }

    fn decode(mut src: &[u8]) -> Result<Self> {
        ensure("display init", src.len(), Self::SIZE)?;
        Ok(Self {
            pixmap_cache_id: src.get_u8(),
            pixmap_cache_size: src.get_u64_le(),
            glz_dictionary_id: src.get_u8(),
            glz_dictionary_window_size: src.get_u32_le(),
        })
    }
}
