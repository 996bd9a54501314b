//! SPICE wire structures and byte-stream reframing.
//!
//! This crate knows how bytes look on the wire and nothing about connection
//! state:
//! - Link-phase structures (header, link message, reply, ticket, auth reply)
//! - The 6-byte mini header used once a channel is established
//! - Typed payloads for the messages the protocol core handles
//! - [`WireReader`], which turns arbitrary transport chunks into exact-size frames
//!
//! All integers are little-endian.

pub mod caps;
pub mod channel;
pub mod codec;
pub mod error;
pub mod link;
pub mod messages;
pub mod msg_type;
pub mod reader;

pub use caps::CapabilitySet;
pub use channel::{ChannelId, ChannelType};
pub use codec::{encode_message, MiniHeader, MiniMessage, DEFAULT_MAX_MESSAGE, MINI_HEADER_SIZE};
pub use error::{FrameError, Result};
pub use link::{
    AuthReply, AuthTicket, LinkError, LinkHeader, LinkMess, LinkReply, AUTH_REPLY_SIZE,
    LINK_HEADER_SIZE,
};
pub use messages::WireMessage;
pub use reader::WireReader;
