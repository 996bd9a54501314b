//! Capability bit numbers and the word-list representation used on the wire.

/// Capabilities shared by every channel.
pub mod common {
    pub const PROTOCOL_AUTH_SELECTION: u32 = 0;
    pub const AUTH_SPICE: u32 = 1;
    pub const AUTH_SASL: u32 = 2;
    pub const MINI_HEADER: u32 = 3;
}

pub mod main {
    pub const SEMI_SEAMLESS_MIGRATE: u32 = 0;
    pub const NAME_AND_UUID: u32 = 1;
    pub const AGENT_CONNECTED_TOKENS: u32 = 2;
    pub const SEAMLESS_MIGRATE: u32 = 3;
}

pub mod display {
    pub const SIZED_STREAM: u32 = 0;
    pub const MONITORS_CONFIG: u32 = 1;
    pub const COMPOSITE: u32 = 2;
    pub const A8_SURFACE: u32 = 3;
    pub const STREAM_REPORT: u32 = 4;
    pub const LZ4_COMPRESSION: u32 = 5;
    pub const PREF_COMPRESSION: u32 = 6;
    pub const GL_SCANOUT: u32 = 7;
    pub const MULTI_CODEC: u32 = 8;
    pub const CODEC_MJPEG: u32 = 9;
    pub const CODEC_VP8: u32 = 10;
    pub const CODEC_H264: u32 = 11;
}

pub mod playback {
    pub const CELT_0_5_1: u32 = 0;
    pub const VOLUME: u32 = 1;
    pub const LATENCY: u32 = 2;
    pub const OPUS: u32 = 3;
}

/// A capability bitmap stored as little-endian 32-bit words.
///
/// Bit `n` lives in word `n / 32`; the set grows as bits are added.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilitySet {
    words: Vec<u32>,
}

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap words as they arrived on the wire.
    pub fn from_words(words: Vec<u32>) -> Self {
        Self { words }
    }

    /// Builder form of [`CapabilitySet::set`].
    pub fn with(mut self, bit: u32) -> Self {
        self.set(bit);
        self
    }

    pub fn set(&mut self, bit: u32) {
        let index = (bit / 32) as usize;
        if self.words.len() <= index {
            self.words.resize(index + 1, 0);
        }
        self.words[index] |= 1 << (bit % 32);
    }

    pub fn has(&self, bit: u32) -> bool {
        self.words
            .get((bit / 32) as usize)
            .is_some_and(|word| word & (1 << (bit % 32)) != 0)
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|word| *word == 0)
    }

    /// Set bit numbers in ascending order.
    pub fn bits(&self) -> Vec<u32> {
        (0..self.words.len() as u32 * 32)
            .filter(|bit| self.has(*bit))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_grows_word_list() {
        let caps = CapabilitySet::new().with(common::MINI_HEADER).with(40);
        assert_eq!(caps.words(), &[1 << 3, 1 << 8]);
        assert!(caps.has(common::MINI_HEADER));
        assert!(caps.has(40));
        assert!(!caps.has(common::AUTH_SASL));
        assert!(!caps.has(200));
        assert_eq!(caps.bits(), vec![3, 40]);
    }

    #[test]
    fn empty_words_count_as_empty() {
        assert!(CapabilitySet::from_words(vec![0, 0]).is_empty());
        assert!(!CapabilitySet::from_words(vec![0, 2]).is_empty());
    }
}
