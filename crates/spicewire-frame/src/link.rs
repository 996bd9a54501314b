//! Structures exchanged once per channel while the link is being established.
//!
//! Wire format (all integers little-endian):
//! ```text
//! LinkHeader  ┌───────────┬────────────┬────────────┬───────────┐
//!   16 bytes  │ "REDQ"    │ major u32  │ minor u32  │ size u32  │
//!             └───────────┴────────────┴────────────┴───────────┘
//! LinkMess    ┌──────────┬────────┬──────┬────────────┬─────────────┬─────────────┬──────┐
//!             │ conn u32 │ type u8│ id u8│ ncommon u32│ nchannel u32│ caps_off u32│ caps │
//!             └──────────┴────────┴──────┴────────────┴─────────────┴─────────────┴──────┘
//! LinkReply   ┌───────────┬──────────────┬────────────┬─────────────┬─────────────┬──────┐
//!             │ error u32 │ pubkey [162] │ ncommon u32│ nchannel u32│ caps_off u32│ caps │
//!             └───────────┴──────────────┴────────────┴─────────────┴─────────────┴──────┘
//! AuthTicket  mechanism u32 + 128-byte encrypted ticket (zero padded)
//! AuthReply   code u32
//! ```
//!
//! `caps_off` is measured from the start of the message that carries it, so a
//! sender may leave padding between the fixed fields and the capability words.

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::caps::CapabilitySet;
use crate::channel::{ChannelId, ChannelType};
use crate::error::{ensure, FrameError, Result};

/// Magic bytes opening every link header.
pub const MAGIC: [u8; 4] = *b"REDQ";
pub const VERSION_MAJOR: u32 = 2;
pub const VERSION_MINOR: u32 = 2;

pub const LINK_HEADER_SIZE: usize = 16;
/// Fixed part of a link message; capability words follow.
pub const LINK_MESS_FIXED_SIZE: usize = 18;
/// DER-encoded RSA-1024 public key carried in the link reply.
pub const TICKET_PUBKEY_BYTES: usize = 162;
pub const LINK_REPLY_FIXED_SIZE: usize = 4 + TICKET_PUBKEY_BYTES + 12;
/// Size of the RSA-OAEP ciphertext field of the auth ticket.
pub const ENCRYPTED_TICKET_SIZE: usize = 1024 / 8;
pub const AUTH_TICKET_SIZE: usize = 4 + ENCRYPTED_TICKET_SIZE;
pub const AUTH_REPLY_SIZE: usize = 4;

/// Link/auth result code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkError(pub u32);

impl LinkError {
    pub const OK: Self = Self(0);
    pub const ERROR: Self = Self(1);
    pub const INVALID_MAGIC: Self = Self(2);
    pub const INVALID_DATA: Self = Self(3);
    pub const VERSION_MISMATCH: Self = Self(4);
    pub const NEED_SECURED: Self = Self(5);
    pub const NEED_UNSECURED: Self = Self(6);
    pub const PERMISSION_DENIED: Self = Self(7);
    pub const BAD_CONNECTION_ID: Self = Self(8);
    pub const CHANNEL_NOT_AVAILABLE: Self = Self(9);

    pub fn is_ok(self) -> bool {
        self == Self::OK
    }

    pub fn describe(self) -> &'static str {
        match self.0 {
            0 => "ok",
            1 => "error",
            2 => "invalid magic",
            3 => "invalid data",
            4 => "version mismatch",
            5 => "need secured connection",
            6 => "need unsecured connection",
            7 => "permission denied",
            8 => "bad connection id",
            9 => "channel not available",
            _ => "unknown link error",
        }
    }
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.describe(), self.0)
    }
}

/// Fixed 16-byte link preamble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkHeader {
    pub magic: [u8; 4],
    pub major_version: u32,
    pub minor_version: u32,
    /// Size of the link message or reply that follows.
    pub size: u32,
}

impl LinkHeader {
    /// Header announcing a body of `size` bytes at this client's version.
    pub fn new(size: u32) -> Self {
        Self {
            magic: MAGIC,
            major_version: VERSION_MAJOR,
            minor_version: VERSION_MINOR,
            size,
        }
    }

    pub fn has_valid_magic(&self) -> bool {
        self.magic == MAGIC
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(LINK_HEADER_SIZE);
        dst.put_slice(&self.magic);
        dst.put_u32_le(self.major_version);
        dst.put_u32_le(self.minor_version);
        dst.put_u32_le(self.size);
    }

    pub fn decode(mut src: &[u8]) -> Result<Self> {
        ensure("link header", src.len(), LINK_HEADER_SIZE)?;
        let mut magic = [0u8; 4];
        src.copy_to_slice(&mut magic);
        Ok(Self {
            magic,
            major_version: src.get_u32_le(),
            minor_version: src.get_u32_le(),
            size: src.get_u32_le(),
        })
    }
}

/// Client link request: which channel to open and what the client supports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkMess {
    pub connection_id: u32,
    pub channel: ChannelId,
    pub common_caps: CapabilitySet,
    pub channel_caps: CapabilitySet,
}

impl LinkMess {
    /// Encoded length of the message body (excluding the link header).
    pub fn encoded_len(&self) -> usize {
        LINK_MESS_FIXED_SIZE
            + 4 * (self.common_caps.words().len() + self.channel_caps.words().len())
    }

    /// Encode the body with capability words packed right after the fixed fields.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let num_common = word_count("common caps", &self.common_caps)?;
        let num_channel = word_count("channel caps", &self.channel_caps)?;

        dst.reserve(self.encoded_len());
        dst.put_u32_le(self.connection_id);
        dst.put_u8(self.channel.kind.as_u8());
        dst.put_u8(self.channel.id);
        dst.put_u32_le(num_common);
        dst.put_u32_le(num_channel);
        dst.put_u32_le(LINK_MESS_FIXED_SIZE as u32);
        put_caps(dst, &self.common_caps, &self.channel_caps);
        Ok(())
    }

    /// Encode a link header followed by this message, as sent on the wire.
    pub fn encode_with_header(&self, dst: &mut BytesMut) -> Result<()> {
        let size = self.encoded_len();
        let size = u32::try_from(size).map_err(|_| FrameError::CountOverflow {
            what: "link message",
            count: size,
        })?;
        LinkHeader::new(size).encode(dst);
        self.encode(dst)
    }

    pub fn decode(src: &[u8]) -> Result<Self> {
        ensure("link message", src.len(), LINK_MESS_FIXED_SIZE)?;
        let mut cursor = src;
        let connection_id = cursor.get_u32_le();
        let kind = ChannelType::from(cursor.get_u8());
        let id = cursor.get_u8();
        let num_common = cursor.get_u32_le();
        let num_channel = cursor.get_u32_le();
        let caps_offset = cursor.get_u32_le();
        let (common_caps, channel_caps) = read_caps(src, caps_offset, num_common, num_channel)?;

        Ok(Self {
            connection_id,
            channel: ChannelId::new(kind, id),
            common_caps,
            channel_caps,
        })
    }
}

/// Server answer to a [`LinkMess`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkReply {
    pub error: LinkError,
    /// DER SubjectPublicKeyInfo used to encrypt the ticket.
    pub pub_key: Bytes,
    pub common_caps: CapabilitySet,
    pub channel_caps: CapabilitySet,
}

impl LinkReply {
    pub fn encoded_len(&self) -> usize {
        LINK_REPLY_FIXED_SIZE + 4 * (self.common_caps.words().len() + self.channel_caps.words().len())
    }

    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        if self.pub_key.len() > TICKET_PUBKEY_BYTES {
            return Err(FrameError::PayloadTooLarge {
                size: self.pub_key.len(),
                max: TICKET_PUBKEY_BYTES,
            });
        }
        let num_common = word_count("common caps", &self.common_caps)?;
        let num_channel = word_count("channel caps", &self.channel_caps)?;

        dst.reserve(self.encoded_len());
        dst.put_u32_le(self.error.0);
        dst.put_slice(&self.pub_key);
        dst.put_bytes(0, TICKET_PUBKEY_BYTES - self.pub_key.len());
        dst.put_u32_le(num_common);
        dst.put_u32_le(num_channel);
        dst.put_u32_le(LINK_REPLY_FIXED_SIZE as u32);
        put_caps(dst, &self.common_caps, &self.channel_caps);
        Ok(())
    }

    /// Decode a reply body.
    ///
    /// A reply carrying a non-zero error code only needs its first word; the
    /// remaining fields are left empty when the server omits them.
    pub fn decode(src: &[u8]) -> Result<Self> {
        ensure("link reply", src.len(), 4)?;
        let mut cursor = src;
        let error = LinkError(cursor.get_u32_le());
        if !error.is_ok() && src.len() < LINK_REPLY_FIXED_SIZE {
            return Ok(Self {
                error,
                pub_key: Bytes::new(),
                common_caps: CapabilitySet::new(),
                channel_caps: CapabilitySet::new(),
            });
        }

        ensure("link reply", src.len(), LINK_REPLY_FIXED_SIZE)?;
        let pub_key = Bytes::copy_from_slice(&cursor[..TICKET_PUBKEY_BYTES]);
        cursor.advance(TICKET_PUBKEY_BYTES);
        let num_common = cursor.get_u32_le();
        let num_channel = cursor.get_u32_le();
        let caps_offset = cursor.get_u32_le();
        let (common_caps, channel_caps) = read_caps(src, caps_offset, num_common, num_channel)?;

        Ok(Self {
            error,
            pub_key,
            common_caps,
            channel_caps,
        })
    }
}

/// Client credential submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthTicket {
    pub mechanism: u32,
    pub encrypted: Bytes,
}

impl AuthTicket {
    /// Encode mechanism plus the fixed-length ciphertext field.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        if self.encrypted.len() > ENCRYPTED_TICKET_SIZE {
            return Err(FrameError::PayloadTooLarge {
                size: self.encrypted.len(),
                max: ENCRYPTED_TICKET_SIZE,
            });
        }
        dst.reserve(AUTH_TICKET_SIZE);
        dst.put_u32_le(self.mechanism);
        dst.put_slice(&self.encrypted);
        dst.put_bytes(0, ENCRYPTED_TICKET_SIZE - self.encrypted.len());
        Ok(())
    }

    pub fn decode(mut src: &[u8]) -> Result<Self> {
        ensure("auth ticket", src.len(), AUTH_TICKET_SIZE)?;
        let mechanism = src.get_u32_le();
        Ok(Self {
            mechanism,
            encrypted: Bytes::copy_from_slice(&src[..ENCRYPTED_TICKET_SIZE]),
        })
    }
}

/// Final verdict on the ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthReply {
    pub code: LinkError,
}

impl AuthReply {
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_u32_le(self.code.0);
    }

    pub fn decode(mut src: &[u8]) -> Result<Self> {
        ensure("auth reply", src.len(), AUTH_REPLY_SIZE)?;
        Ok(Self {
            code: LinkError(src.get_u32_le()),
        })
    }
}

fn word_count(what: &'static str, caps: &CapabilitySet) -> Result<u32> {
    let count = caps.words().len();
    u32::try_from(count).map_err(|_| FrameError::CountOverflow { what, count })
}

fn put_caps(dst: &mut BytesMut, common: &CapabilitySet, channel: &CapabilitySet) {
    for word in common.words().iter().chain(channel.words()) {
        dst.put_u32_le(*word);
    }
}

fn read_caps(
    message: &[u8],
    caps_offset: u32,
    num_common: u32,
    num_channel: u32,
) -> Result<(CapabilitySet, CapabilitySet)> {
    let offset = caps_offset as usize;
    let count = (num_common as usize)
        .checked_add(num_channel as usize)
        .unwrap_or(usize::MAX);
    let out_of_bounds = || FrameError::CapsOutOfBounds {
        offset,
        count,
        len: message.len(),
    };

    let end = count
        .checked_mul(4)
        .and_then(|bytes| bytes.checked_add(offset))
        .ok_or_else(out_of_bounds)?;
    if end > message.len() {
        return Err(out_of_bounds());
    }

    let mut cursor = &message[offset..end];
    let common = (0..num_common).map(|_| cursor.get_u32_le()).collect();
    let channel = (0..num_channel).map(|_| cursor.get_u32_le()).collect();
    Ok((
        CapabilitySet::from_words(common),
        CapabilitySet::from_words(channel),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::{common, main};

    fn sample_mess() -> LinkMess {
        LinkMess {
            connection_id: 0x1234_5678,
            channel: ChannelId::new(ChannelType::Display, 0),
            common_caps: CapabilitySet::new()
                .with(common::PROTOCOL_AUTH_SELECTION)
                .with(common::MINI_HEADER),
            channel_caps: CapabilitySet::from_words(vec![0x315]),
        }
    }

    #[test]
    fn link_message_layout_is_bit_exact() {
        let mut buf = BytesMut::new();
        sample_mess()
            .encode_with_header(&mut buf)
            .expect("link message should encode");

        assert_eq!(buf.len(), LINK_HEADER_SIZE + LINK_MESS_FIXED_SIZE + 8);
        assert_eq!(&buf[0..4], b"REDQ");
        assert_eq!(&buf[4..8], &2u32.to_le_bytes());
        assert_eq!(&buf[8..12], &2u32.to_le_bytes());
        assert_eq!(&buf[12..16], &26u32.to_le_bytes());
        assert_eq!(&buf[16..20], &0x1234_5678u32.to_le_bytes());
        assert_eq!(buf[20], 2);
        assert_eq!(buf[21], 0);
        assert_eq!(&buf[22..26], &1u32.to_le_bytes());
        assert_eq!(&buf[26..30], &1u32.to_le_bytes());
        assert_eq!(&buf[30..34], &18u32.to_le_bytes());
        assert_eq!(&buf[34..38], &0x9u32.to_le_bytes());
        assert_eq!(&buf[38..42], &0x315u32.to_le_bytes());
    }

    #[test]
    fn link_message_decodes_what_it_encodes() {
        let mut buf = BytesMut::new();
        sample_mess().encode(&mut buf).expect("link message should encode");
        let decoded = LinkMess::decode(&buf).expect("link message should decode");
        assert_eq!(decoded, sample_mess());
    }

    #[test]
    fn link_message_honors_padded_caps_offset() {
        let mut buf = BytesMut::new();
        buf.put_u32_le(7);
        buf.put_u8(ChannelType::Main.as_u8());
        buf.put_u8(0);
        buf.put_u32_le(1);
        buf.put_u32_le(1);
        buf.put_u32_le(26); // eight bytes of padding after the fixed fields
        buf.put_bytes(0xEE, 8);
        buf.put_u32_le(0b1001);
        buf.put_u32_le(1 << main::AGENT_CONNECTED_TOKENS);

        let mess = LinkMess::decode(&buf).expect("padded message should decode");
        assert_eq!(mess.connection_id, 7);
        assert_eq!(mess.common_caps.words(), &[0b1001]);
        assert!(mess.channel_caps.has(main::AGENT_CONNECTED_TOKENS));
    }

    #[test]
    fn link_reply_honors_padded_caps_offset() {
        let mut buf = BytesMut::new();
        buf.put_u32_le(0);
        buf.put_bytes(0xAB, TICKET_PUBKEY_BYTES);
        buf.put_u32_le(1);
        buf.put_u32_le(2);
        buf.put_u32_le((LINK_REPLY_FIXED_SIZE + 4) as u32);
        buf.put_u32_le(0xDEAD_BEEF);
        buf.put_u32_le(0b1010);
        buf.put_u32_le(0x10);
        buf.put_u32_le(0x20);

        let reply = LinkReply::decode(&buf).expect("padded reply should decode");
        assert!(reply.error.is_ok());
        assert_eq!(reply.pub_key.len(), TICKET_PUBKEY_BYTES);
        assert!(reply.pub_key.iter().all(|b| *b == 0xAB));
        assert_eq!(reply.common_caps.words(), &[0b1010]);
        assert_eq!(reply.channel_caps.words(), &[0x10, 0x20]);
    }

    #[test]
    fn link_reply_with_error_may_be_short() {
        let reply = LinkReply::decode(&LinkError::PERMISSION_DENIED.0.to_le_bytes())
            .expect("short error reply should decode");
        assert_eq!(reply.error, LinkError::PERMISSION_DENIED);
        assert!(reply.pub_key.is_empty());
    }

    #[test]
    fn link_reply_rejects_caps_past_end() {
        let reply = LinkReply {
            error: LinkError::OK,
            pub_key: Bytes::from(vec![1u8; TICKET_PUBKEY_BYTES]),
            common_caps: CapabilitySet::from_words(vec![1]),
            channel_caps: CapabilitySet::new(),
        };
        let mut buf = BytesMut::new();
        reply.encode(&mut buf).expect("reply should encode");
        buf.truncate(buf.len() - 2);

        let err = LinkReply::decode(&buf).expect_err("truncated caps should fail");
        assert!(matches!(err, FrameError::CapsOutOfBounds { .. }));
    }

    #[test]
    fn link_reply_rejects_absurd_caps_count() {
        let mut buf = BytesMut::new();
        buf.put_u32_le(0);
        buf.put_bytes(0, TICKET_PUBKEY_BYTES);
        buf.put_u32_le(u32::MAX);
        buf.put_u32_le(u32::MAX);
        buf.put_u32_le(u32::MAX);

        let err = LinkReply::decode(&buf).expect_err("overflowing caps should fail");
        assert!(matches!(err, FrameError::CapsOutOfBounds { .. }));
    }

    #[test]
    fn caps_counts_at_the_limit_are_out_of_bounds() {
        let err = read_caps(&[0u8; 16], 0, u32::MAX, u32::MAX)
            .expect_err("maximal caps counts should fail");
        match err {
            FrameError::CapsOutOfBounds { offset, count, len } => {
                assert_eq!(offset, 0);
                assert!(count >= u32::MAX as usize);
                assert_eq!(len, 16);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn header_rejects_short_input() {
        let err = LinkHeader::decode(b"REDQ\x02\x00").expect_err("short header should fail");
        assert!(matches!(err, FrameError::Truncated { what: "link header", .. }));
    }

    #[test]
    fn auth_ticket_is_zero_padded() {
        let ticket = AuthTicket {
            mechanism: common::AUTH_SPICE,
            encrypted: Bytes::from_static(&[0x55; 100]),
        };
        let mut buf = BytesMut::new();
        ticket.encode(&mut buf).expect("ticket should encode");

        assert_eq!(buf.len(), AUTH_TICKET_SIZE);
        assert_eq!(&buf[0..4], &1u32.to_le_bytes());
        assert!(buf[4..104].iter().all(|b| *b == 0x55));
        assert!(buf[104..].iter().all(|b| *b == 0));
    }

    #[test]
    fn auth_ticket_rejects_oversized_ciphertext() {
        let ticket = AuthTicket {
            mechanism: common::AUTH_SPICE,
            encrypted: Bytes::from(vec![0u8; ENCRYPTED_TICKET_SIZE + 1]),
        };
        let err = ticket
            .encode(&mut BytesMut::new())
            .expect_err("oversized ciphertext should fail");
        assert!(matches!(err, FrameError::PayloadTooLarge { .. }));
    }

    #[test]
    fn link_error_display_names_code() {
        assert_eq!(
            LinkError::PERMISSION_DENIED.to_string(),
            "permission denied (7)"
        );
        assert_eq!(LinkError(99).to_string(), "unknown link error (99)");
    }
}
