use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};
use tracing::trace;

/// Turns arbitrarily chunked transport deliveries into exact-size frames.
///
/// The owner says how many bytes it wants next with [`WireReader::request`] and
/// hands over transport chunks with [`WireReader::push`]; [`WireReader::next_frame`]
/// then yields one frame of exactly the requested size for as long as enough
/// bytes are buffered. A request stays armed after it is satisfied, so the same
/// size is delivered repeatedly until the owner asks for something else.
///
/// An optional header value of type `H` can be parked with the pending request
/// and comes back together with the bytes that satisfy it.
///
/// Chunks are kept as [`Bytes`]; a frame that lies inside one chunk is a
/// zero-copy slice of it. Only frames spanning several chunks are assembled
/// into a fresh buffer.
pub struct WireReader<H> {
    chunks: VecDeque<Bytes>,
    buffered: usize,
    needed: usize,
    saved: Option<H>,
}

impl<H> Default for WireReader<H> {
    fn default() -> Self {
        Self {
            chunks: VecDeque::new(),
            buffered: 0,
            needed: 0,
            saved: None,
        }
    }
}

impl<H> WireReader<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask for the next frame to be exactly `n` bytes. Zero disarms the reader.
    pub fn request(&mut self, n: usize) {
        self.needed = n;
    }

    /// Park `header` until the pending request is satisfied.
    pub fn save_header(&mut self, header: H) {
        self.saved = Some(header);
    }

    /// Drop any parked header, returning it.
    pub fn clear_header(&mut self) -> Option<H> {
        self.saved.take()
    }

    pub fn has_saved_header(&self) -> bool {
        self.saved.is_some()
    }

    /// Size of the pending request (0 when disarmed).
    pub fn needed(&self) -> usize {
        self.needed
    }

    /// Bytes received but not yet delivered.
    pub fn buffered(&self) -> usize {
        self.buffered
    }

    /// Queue a transport delivery.
    pub fn push(&mut self, chunk: Bytes) {
        if chunk.is_empty() {
            return;
        }
        self.buffered += chunk.len();
        self.chunks.push_back(chunk);
    }

    /// Take the next frame if the pending request can be satisfied.
    pub fn next_frame(&mut self) -> Option<(Bytes, Option<H>)> {
        if self.needed == 0 || self.buffered < self.needed {
            return None;
        }

        let frame = self.take(self.needed);
        Some((frame, self.saved.take()))
    }

    /// Queue `chunk` and deliver every frame it completes.
    ///
    /// `on_frame` runs synchronously once per satisfied request and may issue
    /// new requests or park headers before the next frame is cut.
    pub fn feed<F>(&mut self, chunk: Bytes, mut on_frame: F)
    where
        F: FnMut(&mut Self, Bytes, Option<H>),
    {
        self.push(chunk);
        while let Some((frame, header)) = self.next_frame() {
            on_frame(self, frame, header);
        }
    }

    fn take(&mut self, n: usize) -> Bytes {
        self.buffered -= n;

        if let Some(front) = self.chunks.front_mut() {
            if front.len() > n {
                return front.split_to(n);
            }
            if front.len() == n {
                return self.chunks.pop_front().unwrap_or_default();
            }
        }

        trace!(bytes = n, chunks = self.chunks.len(), "assembling frame across chunks");
        let mut assembled = BytesMut::with_capacity(n);
        while assembled.len() < n {
            let Some(mut chunk) = self.chunks.pop_front() else {
                break;
            };
            let want = n - assembled.len();
            if chunk.len() > want {
                assembled.extend_from_slice(&chunk.split_to(want));
                self.chunks.push_front(chunk);
            } else {
                assembled.extend_from_slice(&chunk);
            }
        }
        assembled.freeze()
    }
}

impl<H> std::fmt::Debug for WireReader<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WireReader")
            .field("chunks", &self.chunks.len())
            .field("buffered", &self.buffered)
            .field("needed", &self.needed)
            .field("saved_header", &self.saved.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Small deterministic generator so partition tests are reproducible.
    struct Lcg(u64);

    impl Lcg {
        fn next(&mut self, bound: usize) -> usize {
            self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            ((self.0 >> 33) as usize % bound) + 1
        }
    }

    fn sample_stream(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    #[test]
    fn any_partition_reassembles_in_order() {
        let data = sample_stream(4096);

        for seed in 1..40u64 {
            let mut rng = Lcg(seed);

            let mut requests = Vec::new();
            let mut left = data.len();
            while left > 0 {
                let n = rng.next(97).min(left);
                requests.push(n);
                left -= n;
            }

            let mut reader: WireReader<()> = WireReader::new();
            let mut pending = requests.iter().copied();
            reader.request(pending.next().expect("at least one request"));

            let mut delivered = Vec::new();
            let mut sizes = Vec::new();
            let mut offset = 0;
            while offset < data.len() {
                let n = rng.next(211).min(data.len() - offset);
                let chunk = Bytes::copy_from_slice(&data[offset..offset + n]);
                offset += n;

                reader.feed(chunk, |reader, frame, _| {
                    sizes.push(frame.len());
                    delivered.extend_from_slice(&frame);
                    match pending.next() {
                        Some(next) => reader.request(next),
                        None => reader.request(0),
                    }
                });
            }

            assert_eq!(sizes, requests, "seed {seed} frame sizes");
            assert_eq!(delivered, data, "seed {seed} reassembly");
            assert_eq!(reader.buffered(), 0);
        }
    }

    #[test]
    fn one_chunk_fires_every_satisfied_request() {
        let mut reader: WireReader<()> = WireReader::new();
        reader.request(4);

        let mut fired = Vec::new();
        reader.feed(Bytes::from_static(b"aaaabbbbccccdd"), |_, frame, _| {
            fired.push(frame);
        });

        assert_eq!(fired.len(), 3);
        assert!(fired.iter().all(|frame| frame.len() == 4));
        assert_eq!(fired[2].as_ref(), b"cccc");
        assert_eq!(reader.buffered(), 2);
    }

    #[test]
    fn smaller_request_drains_buffer_repeatedly() {
        let mut reader: WireReader<()> = WireReader::new();
        reader.push(Bytes::from_static(b"0123456789"));
        assert!(reader.next_frame().is_none(), "nothing requested yet");

        reader.request(3);
        let mut frames = Vec::new();
        while let Some((frame, _)) = reader.next_frame() {
            frames.push(frame);
        }
        assert_eq!(frames, vec![&b"012"[..], &b"345"[..], &b"678"[..]]);
        assert_eq!(reader.buffered(), 1);

        reader.request(1);
        let (last, _) = reader.next_frame().expect("one byte should remain");
        assert_eq!(last.as_ref(), b"9");
    }

    #[test]
    fn saved_header_travels_with_payload() {
        let mut reader: WireReader<u16> = WireReader::new();
        reader.request(2);
        reader.save_header(0x0104);

        reader.push(Bytes::from_static(b"x"));
        assert!(reader.next_frame().is_none());
        assert!(reader.has_saved_header());

        reader.push(Bytes::from_static(b"yz"));
        let (frame, header) = reader.next_frame().expect("request should be satisfied");
        assert_eq!(frame.as_ref(), b"xy");
        assert_eq!(header, Some(0x0104));
        assert!(!reader.has_saved_header());

        let (frame, header) = reader.next_frame().map_or((Bytes::new(), None), |f| f);
        assert!(frame.is_empty(), "only one byte left for a two-byte request");
        assert_eq!(header, None);
    }

    #[test]
    fn frame_within_one_chunk_is_not_copied() {
        let chunk = Bytes::from(vec![7u8; 64]);
        let base = chunk.as_ptr();

        let mut reader: WireReader<()> = WireReader::new();
        reader.request(16);
        reader.push(chunk);

        let (first, _) = reader.next_frame().expect("first frame");
        let (second, _) = reader.next_frame().expect("second frame");
        assert_eq!(first.as_ptr(), base);
        assert_eq!(second.as_ptr(), base.wrapping_add(16));
    }

    #[test]
    fn frame_spanning_chunks_is_assembled() {
        let mut reader: WireReader<()> = WireReader::new();
        reader.request(6);
        reader.push(Bytes::from_static(b"ab"));
        reader.push(Bytes::from_static(b"cd"));
        reader.push(Bytes::from_static(b"efgh"));

        let (frame, _) = reader.next_frame().expect("frame spans three chunks");
        assert_eq!(frame.as_ref(), b"abcdef");
        assert_eq!(reader.buffered(), 2);

        reader.request(2);
        let (rest, _) = reader.next_frame().expect("tail of last chunk");
        assert_eq!(rest.as_ref(), b"gh");
    }

    #[test]
    fn empty_chunks_are_ignored() {
        let mut reader: WireReader<()> = WireReader::new();
        reader.request(1);
        reader.push(Bytes::new());
        assert_eq!(reader.buffered(), 0);
        assert!(reader.next_frame().is_none());
        assert!(format!("{reader:?}").contains("needed: 1"));
    }
}
