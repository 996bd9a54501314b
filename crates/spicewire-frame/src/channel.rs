use std::fmt;

use serde::{Serialize, Serializer};

/// Channel categories a SPICE server can expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelType {
    Main,
    Display,
    Inputs,
    Cursor,
    Playback,
    Record,
    Tunnel,
    Smartcard,
    UsbRedir,
    Port,
    Webdav,
    /// A category this client has no name for.
    Unknown(u8),
}

impl ChannelType {
    /// Wire value of this category.
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Main => 1,
            Self::Display => 2,
            Self::Inputs => 3,
            Self::Cursor => 4,
            Self::Playback => 5,
            Self::Record => 6,
            Self::Tunnel => 7,
            Self::Smartcard => 8,
            Self::UsbRedir => 9,
            Self::Port => 10,
            Self::Webdav => 11,
            Self::Unknown(raw) => raw,
        }
    }

    /// Short lowercase name used in logs and CLI output.
    pub fn name(self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Display => "display",
            Self::Inputs => "inputs",
            Self::Cursor => "cursor",
            Self::Playback => "playback",
            Self::Record => "record",
            Self::Tunnel => "tunnel",
            Self::Smartcard => "smartcard",
            Self::UsbRedir => "usbredir",
            Self::Port => "port",
            Self::Webdav => "webdav",
            Self::Unknown(_) => "unknown",
        }
    }
}

impl From<u8> for ChannelType {
    fn from(raw: u8) -> Self {
        match raw {
            1 => Self::Main,
            2 => Self::Display,
            3 => Self::Inputs,
            4 => Self::Cursor,
            5 => Self::Playback,
            6 => Self::Record,
            7 => Self::Tunnel,
            8 => Self::Smartcard,
            9 => Self::UsbRedir,
            10 => Self::Port,
            11 => Self::Webdav,
            other => Self::Unknown(other),
        }
    }
}

impl From<ChannelType> for u8 {
    fn from(kind: ChannelType) -> Self {
        kind.as_u8()
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(raw) => write!(f, "unknown({raw})"),
            other => f.write_str(other.name()),
        }
    }
}

impl Serialize for ChannelType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One channel instance: category plus per-category index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ChannelId {
    #[serde(rename = "type")]
    pub kind: ChannelType,
    pub id: u8,
}

impl ChannelId {
    pub fn new(kind: ChannelType, id: u8) -> Self {
        Self { kind, id }
    }

    /// The single control channel every session starts with.
    pub fn main() -> Self {
        Self::new(ChannelType::Main, 0)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}
