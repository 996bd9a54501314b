//! Capability advertisement.
//!
//! What a channel advertises depends on its category and, for media channels,
//! on which decoders the host application has available.

use serde::Serialize;
use spicewire_frame::caps::{common, display, main, playback};
use spicewire_frame::{CapabilitySet, ChannelType};

/// Media decoders the host application can feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MediaSupport {
    /// Opus audio for the playback channel.
    pub opus: bool,
    /// VP8 video streams for the display channel.
    pub vp8: bool,
}

/// Decides the capability words sent in the link message.
pub trait CapabilityProbe: Send {
    /// Capabilities shared by every channel.
    fn common_caps(&self) -> CapabilitySet {
        CapabilitySet::new()
            .with(common::PROTOCOL_AUTH_SELECTION)
            .with(common::MINI_HEADER)
    }

    /// Capabilities specific to `kind`.
    fn channel_caps(&self, kind: ChannelType) -> CapabilitySet;
}

/// The capability set this client implements.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardCaps {
    pub media: MediaSupport,
}

impl StandardCaps {
    pub fn new(media: MediaSupport) -> Self {
        Self { media }
    }
}

impl CapabilityProbe for StandardCaps {
    fn channel_caps(&self, kind: ChannelType) -> CapabilitySet {
        match kind {
            ChannelType::Main => CapabilitySet::new().with(main::AGENT_CONNECTED_TOKENS),
            ChannelType::Display => {
                let mut caps = CapabilitySet::new()
                    .with(display::SIZED_STREAM)
                    .with(display::STREAM_REPORT)
                    .with(display::MULTI_CODEC)
                    .with(display::CODEC_MJPEG);
                if self.media.vp8 {
                    caps.set(display::CODEC_VP8);
                }
                caps
            }
            // The word is sent even when empty.
            ChannelType::Playback => {
                let mut caps = CapabilitySet::from_words(vec![0]);
                if self.media.opus {
                    caps.set(playback::OPUS);
                }
                caps
            }
            _ => CapabilitySet::new(),
        }
    }
}
