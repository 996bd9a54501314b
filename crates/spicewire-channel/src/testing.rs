//! Fixtures shared by unit tests: a pass-through ticket encryptor and a
//! scripted server speaking the link protocol over any byte stream.

use std::io::{Read, Write};

use bytes::{Bytes, BytesMut};
use spicewire_frame::caps::common;
use spicewire_frame::link::{AUTH_TICKET_SIZE, LINK_HEADER_SIZE, TICKET_PUBKEY_BYTES};
use spicewire_frame::{
    AuthReply, AuthTicket, CapabilitySet, LinkError, LinkHeader, LinkMess, LinkReply, MiniHeader,
    MiniMessage, MINI_HEADER_SIZE,
};

use crate::error::Result;
use crate::ticket::TicketEncryptor;

/// Hands the plaintext back so tests can read the ticket.
pub(crate) struct PlainEncryptor;

impl TicketEncryptor for PlainEncryptor {
    fn encrypt(&mut self, public_key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        assert_eq!(public_key.len(), TICKET_PUBKEY_BYTES);
        Ok(plaintext.to_vec())
    }
}

pub(crate) struct FakeServer<S> {
    pub(crate) stream: S,
}

impl<S: Read + Write> FakeServer<S> {
    pub(crate) fn new(stream: S) -> Self {
        Self { stream }
    }

    pub(crate) fn read_exact(&mut self, n: usize) -> Vec<u8> {
        let mut buf = vec![0u8; n];
        self.stream
            .read_exact(&mut buf)
            .expect("server should read from client");
        buf
    }

    pub(crate) fn read_link(&mut self) -> LinkMess {
        let header = LinkHeader::decode(&self.read_exact(LINK_HEADER_SIZE))
            .expect("client should send a link header");
        assert!(header.has_valid_magic());
        let body = self.read_exact(header.size as usize);
        LinkMess::decode(&body).expect("client should send a link message")
    }

    pub(crate) fn send_reply(&mut self, error: LinkError) {
        let reply = LinkReply {
            error,
            pub_key: Bytes::from(vec![0xAA; TICKET_PUBKEY_BYTES]),
            common_caps: CapabilitySet::new().with(common::AUTH_SPICE),
            channel_caps: CapabilitySet::new(),
        };
        let mut body = BytesMut::new();
        reply.encode(&mut body).expect("reply should encode");
        let mut out = BytesMut::new();
        LinkHeader::new(body.len() as u32).encode(&mut out);
        out.extend_from_slice(&body);
        self.write(&out);
    }

    pub(crate) fn read_ticket(&mut self) -> AuthTicket {
        AuthTicket::decode(&self.read_exact(AUTH_TICKET_SIZE))
            .expect("client should send a ticket")
    }

    pub(crate) fn send_auth(&mut self, code: LinkError) {
        let mut out = BytesMut::new();
        AuthReply { code }.encode(&mut out);
        self.write(&out);
    }

    /// Run a successful handshake and return the client's link message.
    pub(crate) fn accept(&mut self) -> LinkMess {
        let link = self.read_link();
        self.send_reply(LinkError::OK);
        self.read_ticket();
        self.send_auth(LinkError::OK);
        link
    }

    pub(crate) fn send(&mut self, message: &MiniMessage) {
        let frame = message.to_frame().expect("server frame should encode");
        self.write(&frame);
    }

    pub(crate) fn recv(&mut self) -> MiniMessage {
        let header = MiniHeader::decode(&self.read_exact(MINI_HEADER_SIZE))
            .expect("client should send a mini header");
        let payload = self.read_exact(header.size as usize);
        MiniMessage::new(header.msg_type, payload)
    }

    fn write(&mut self, bytes: &[u8]) {
        self.stream
            .write_all(bytes)
            .expect("server should write to client");
    }
}
