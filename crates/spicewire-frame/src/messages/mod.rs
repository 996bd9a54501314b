//! Typed payloads for the messages the protocol core understands.
//!
//! Payloads are decoded leniently in one respect: trailing bytes beyond the
//! fields a structure defines are ignored, as newer servers may append fields.

use bytes::BytesMut;

use crate::codec::MiniMessage;
use crate::error::Result;

pub mod agent;
pub mod common;
pub mod display;
pub mod inputs;
pub mod main;

/// A payload with a fixed message type and a little-endian wire layout.
pub trait WireMessage: Sized {
    const MSG_TYPE: u16;

    fn encode(&self, dst: &mut BytesMut);

    fn decode(src: &[u8]) -> Result<Self>;

    /// Wrap the encoded payload in a [`MiniMessage`] of this type.
    fn to_message(&self) -> MiniMessage {
        let mut payload = BytesMut::new();
        self.encode(&mut payload);
        MiniMessage::new(Self::MSG_TYPE, payload.freeze())
    }
}
