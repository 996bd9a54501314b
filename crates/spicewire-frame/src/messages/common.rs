use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{ensure, Result};
use crate::messages::WireMessage;
use crate::msg_type::{client, server};

/// Bytes of a ping payload echoed back in the pong: id (4) + timestamp (8).
pub const PONG_ECHO_LEN: usize = 12;

/// Server announcement of the acknowledgement window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetAck {
    pub generation: u32,
    pub window: u32,
}

impl WireMessage for SetAck {
    const MSG_TYPE: u16 = server::SET_ACK;

    fn encode(&self, dst: &mut BytesMut) {
        dst.put_u32_le(self.generation);
        dst.put_u32_le(self.window);
    }

    fn decode(mut src: &[u8]) -> Result<Self> {
        ensure("set ack", src.len(), 8)?;
        Ok(Self {
            generation: src.get_u32_le(),
            window: src.get_u32_le(),
        })
    }
}

/// Client reply to [`SetAck`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckSync {
    pub generation: u32,
}

impl WireMessage for AckSync {
    const MSG_TYPE: u16 = client::ACK_SYNC;

    fn encode(&self, dst: &mut BytesMut) {
        dst.put_u32_le(self.generation);
    }

    fn decode(mut src: &[u8]) -> Result<Self> {
        ensure("ack sync", src.len(), 4)?;
        Ok(Self {
            generation: src.get_u32_le(),
        })
    }
}

/// Keep-alive probe. `data` is optional padding used for bandwidth estimation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ping {
    pub id: u32,
    pub timestamp: u64,
    pub data: Bytes,
}

impl WireMessage for Ping {
    const MSG_TYPE: u16 = server::PING;

    fn encode(&self, dst: &mut BytesMut) {
        dst.put_u32_le(self.id);
        dst.put_u64_le(self.timestamp);
        dst.put_slice(&self.data);
    }

    fn decode(mut src: &[u8]) -> Result<Self> {
        ensure("ping", src.len(), PONG_ECHO_LEN)?;
        let id = src.get_u32_le();
        let timestamp = src.get_u64_le();
        Ok(Self {
            id,
            timestamp,
            data: Bytes::copy_from_slice(src),
        })
    }
}

/// Pong payload for a ping: at most the first [`PONG_ECHO_LEN`] bytes.
pub fn pong_payload(ping_payload: &Bytes) -> Bytes {
    ping_payload.slice(..ping_payload.len().min(PONG_ECHO_LEN))
}

/// Severity carried by a server notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifySeverity {
    Info,
    Warn,
    Error,
    Other(u32),
}

impl From<u32> for NotifySeverity {
    fn from(raw: u32) -> Self {
        match raw {
            0 => Self::Info,
            1 => Self::Warn,
            2 => Self::Error,
            other => Self::Other(other),
        }
    }
}

impl From<NotifySeverity> for u32 {
    fn from(severity: NotifySeverity) -> Self {
        match severity {
            NotifySeverity::Info => 0,
            NotifySeverity::Warn => 1,
            NotifySeverity::Error => 2,
            NotifySeverity::Other(raw) => raw,
        }
    }
}

impl fmt::Display for NotifySeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => f.write_str("info"),
            Self::Warn => f.write_str("warn"),
            Self::Error => f.write_str("error"),
            Self::Other(raw) => write!(f, "severity({raw})"),
        }
    }
}

/// Human-readable server notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notify {
    pub time_stamp: u64,
    pub severity: NotifySeverity,
    pub visibility: u32,
    pub what: u32,
    pub message: String,
}

impl WireMessage for Notify {
    const MSG_TYPE: u16 = server::NOTIFY;

    fn encode(&self, dst: &mut BytesMut) {
        dst.put_u64_le(self.time_stamp);
        dst.put_u32_le(self.severity.into());
        dst.put_u32_le(self.visibility);
        dst.put_u32_le(self.what);
        dst.put_u32_le(self.message.len() as u32);
        dst.put_slice(self.message.as_bytes());
        dst.put_u8(0);
    }

    fn decode(mut src: &[u8]) -> Result<Self> {
        ensure("notify", src.len(), 24)?;
        let time_stamp = src.get_u64_le();
        let severity = NotifySeverity::from(src.get_u32_le());
        let visibility = src.get_u32_le();
        let what = src.get_u32_le();
        let len = src.get_u32_le() as usize;
        ensure("notify message", src.len(), len)?;
        let text = &src[..len];
        let text = text.strip_suffix(&[0]).unwrap_or(text);
        Ok(Self {
            time_stamp,
            severity,
            visibility,
            what,
            message: String::from_utf8_lossy(text).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pong_echoes_at_most_twelve_bytes() {
        let ping = Ping {
            id: 9,
            timestamp: 0x0102_0304_0506_0708,
            data: Bytes::from(vec![0xCC; 256]),
        }
        .to_message();
        assert_eq!(ping.payload.len(), 12 + 256);

        let pong = pong_payload(&ping.payload);
        assert_eq!(pong.as_ref(), &ping.payload[..12]);
        assert!(pong_payload(&Bytes::from_static(b"abc")).as_ref() == b"abc");
        assert!(pong_payload(&Bytes::new()).is_empty());
    }

    #[test]
    fn ping_keeps_trailing_data() {
        let mut buf = BytesMut::new();
        buf.put_u32_le(3);
        buf.put_u64_le(77);
        buf.put_slice(b"pad");
        let ping = Ping::decode(&buf).expect("ping should decode");
        assert_eq!((ping.id, ping.timestamp), (3, 77));
        assert_eq!(ping.data.as_ref(), b"pad");
    }

    #[test]
    fn notify_strips_terminator_and_maps_severity() {
        let notify = Notify {
            time_stamp: 1,
            severity: NotifySeverity::Warn,
            visibility: 0,
            what: 0,
            message: "agent missing".to_string(),
        };
        let msg = notify.to_message();
        assert_eq!(msg.msg_type, server::NOTIFY);

        let mut wire = BytesMut::new();
        wire.put_u64_le(1);
        wire.put_u32_le(1);
        wire.put_u32_le(0);
        wire.put_u32_le(0);
        wire.put_u32_le(14);
        wire.put_slice(b"agent missing\0");

        let decoded = Notify::decode(&wire).expect("notify should decode");
        assert_eq!(decoded, notify);
    }

    #[test]
    fn notify_with_overlong_length_is_truncated() {
        let mut wire = BytesMut::new();
        wire.put_u64_le(0);
        wire.put_u32_le(2);
        wire.put_u32_le(0);
        wire.put_u32_le(0);
        wire.put_u32_le(100);
        wire.put_slice(b"short");
        assert!(Notify::decode(&wire).is_err());
    }

    #[test]
    fn set_ack_layout() {
        let msg = SetAck {
            generation: 5,
            window: 20,
        }
        .to_message();
        assert_eq!(msg.msg_type, 3);
        assert_eq!(msg.payload.as_ref(), &[5, 0, 0, 0, 20, 0, 0, 0]);
    }
}
