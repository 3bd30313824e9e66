//! Streaming ICY demultiplexer
//!
//! A server that honours `Icy-MetaData: 1` inserts, every `metaint` audio
//! bytes, one length byte `L` followed by `L * 16` bytes of metadata. The
//! [`IcySplicer`] removes those bytes from the audio and decodes them, keeping
//! its position across arbitrary chunk boundaries.

use std::num::NonZeroUsize;

use bytes::Bytes;
use serde::Serialize;
use tracing::{trace, warn};

use crate::metadata::{decode_block, MetadataEvent};

/// Size unit of the ICY length byte
pub const METADATA_BLOCK_UNIT: usize = 16;

/// One output item of the splicer, in stream order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Spliced {
    /// Clean audio bytes (zero-copy slice of the input chunk)
    Audio(Bytes),
    /// Metadata decoded at this exact position of the audio stream
    Metadata(MetadataEvent),
}

impl Spliced {
    pub fn as_audio(&self) -> Option<&Bytes> {
        match self {
            Self::Audio(bytes) => Some(bytes),
            Self::Metadata(_) => None,
        }
    }
}

/// Counters exposed for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SplicerStats {
    /// Audio bytes forwarded downstream
    pub audio_bytes: u64,
    /// Non-empty metadata blocks read (decodable or not)
    pub metadata_blocks: u64,
    /// Blocks dropped because they could not be decoded
    pub skipped_blocks: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Audio,
    Length,
    Block { remaining: usize },
}

/// Stateful ICY metadata splicer for one upstream connection
#[derive(Debug)]
pub struct IcySplicer {
    metaint: usize,
    audio_count: usize,
    phase: Phase,
    block: Vec<u8>,
    stats: SplicerStats,
}

impl IcySplicer {
    /// Create a splicer for the interval announced by `icy-metaint`
    pub fn new(metaint: NonZeroUsize) -> Self {
        Self {
            metaint: metaint.get(),
            audio_count: 0,
            phase: Phase::Audio,
            block: Vec::new(),
            stats: SplicerStats::default(),
        }
    }

    /// Build a splicer from a raw `icy-metaint` header value
    ///
    /// Returns `None` for missing, unparsable or zero intervals, in which case
    /// the stream has to be treated as plain audio.
    pub fn from_header(value: Option<&str>) -> Option<Self> {
        value
            .and_then(|v| v.trim().parse::<usize>().ok())
            .and_then(NonZeroUsize::new)
            .map(Self::new)
    }

    pub fn metaint(&self) -> usize {
        self.metaint
    }

    pub fn stats(&self) -> SplicerStats {
        self.stats
    }

    /// Feed one upstream chunk
    ///
    /// Returns the audio slices and metadata events contained in the chunk,
    /// in the order they appear in the stream.
    pub fn push(&mut self, chunk: Bytes) -> Vec<Spliced> {
        let mut out = Vec::new();
        let mut pos = 0;

        while pos < chunk.len() {
            match self.phase {
                Phase::Audio => {
                    let take = (self.metaint - self.audio_count).min(chunk.len() - pos);
                    out.push(Spliced::Audio(chunk.slice(pos..pos + take)));
                    pos += take;
                    self.audio_count += take;
                    self.stats.audio_bytes += take as u64;
                    if self.audio_count == self.metaint {
                        self.phase = Phase::Length;
                    }
                }
                Phase::Length => {
                    let length = chunk[pos] as usize * METADATA_BLOCK_UNIT;
                    pos += 1;
                    self.audio_count = 0;
                    if length == 0 {
                        self.phase = Phase::Audio;
                    } else {
                        self.block.clear();
                        self.phase = Phase::Block { remaining: length };
                    }
                }
                Phase::Block { remaining } => {
                    let take = remaining.min(chunk.len() - pos);
                    self.block.extend_from_slice(&chunk[pos..pos + take]);
                    pos += take;
                    if take == remaining {
                        self.phase = Phase::Audio;
                        if let Some(event) = self.finish_block() {
                            out.push(Spliced::Metadata(event));
                        }
                    } else {
                        self.phase = Phase::Block {
                            remaining: remaining - take,
                        };
                    }
                }
            }
        }

        out
    }

    fn finish_block(&mut self) -> Option<MetadataEvent> {
        self.stats.metadata_blocks += 1;
        match decode_block(&self.block) {
            Ok(event) => {
                trace!(event = ?event, "ICY metadata block decoded");
                event
            }
            Err(e) => {
                self.stats.skipped_blocks += 1;
                warn!("{}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::NowPlaying;

    fn splicer(metaint: usize) -> IcySplicer {
        IcySplicer::new(NonZeroUsize::new(metaint).unwrap())
    }

    /// Build an interleaved stream: `blocks[i]` follows the i-th interval.
    fn interleave(audio: &[u8], metaint: usize, blocks: &[Option<&str>]) -> Vec<u8> {
        let mut out = Vec::new();
        for (i, piece) in audio.chunks(metaint).enumerate() {
            out.extend_from_slice(piece);
            if piece.len() < metaint {
                break;
            }
            match blocks.get(i).copied().flatten() {
                Some(text) => {
                    let padded = text.len().div_ceil(METADATA_BLOCK_UNIT) * METADATA_BLOCK_UNIT;
                    out.push((padded / METADATA_BLOCK_UNIT) as u8);
                    out.extend_from_slice(text.as_bytes());
                    out.resize(out.len() + padded - text.len(), 0);
                }
                None => out.push(0),
            }
        }
        out
    }

    fn collect(items: Vec<Spliced>, audio: &mut Vec<u8>, events: &mut Vec<MetadataEvent>) {
        for item in items {
            match item {
                Spliced::Audio(bytes) => audio.extend_from_slice(&bytes),
                Spliced::Metadata(event) => events.push(event),
            }
        }
    }

    fn audio_pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8 + 1).collect()
    }

    #[test]
    fn test_single_block_scenario() {
        let audio = audio_pattern(16384);
        let mut input = audio[..8192].to_vec();
        // The 20-byte title spans two 16-byte units.
        input.push(0x02);
        let mut block = b"StreamTitle='A - B';".to_vec();
        block.resize(32, 0);
        input.extend_from_slice(&block);
        input.extend_from_slice(&audio[8192..]);

        let mut s = splicer(8192);
        let mut out_audio = Vec::new();
        let mut events = Vec::new();
        collect(s.push(Bytes::from(input)), &mut out_audio, &mut events);

        assert_eq!(out_audio.len(), 16384);
        assert_eq!(out_audio, audio);
        assert_eq!(
            events,
            vec![MetadataEvent::NowPlaying(NowPlaying::new("A", "B"))]
        );
    }

    #[test]
    fn test_single_unit_block() {
        let audio = audio_pattern(64);
        let mut input = audio[..32].to_vec();
        input.push(0x01);
        input.extend_from_slice(b"StreamTitle='A-B");
        input.extend_from_slice(&audio[32..]);

        let mut s = splicer(32);
        let mut out_audio = Vec::new();
        let mut events = Vec::new();
        collect(s.push(Bytes::from(input)), &mut out_audio, &mut events);

        assert_eq!(out_audio, audio);
        assert_eq!(
            events,
            vec![MetadataEvent::NowPlaying(NowPlaying::new("A", "B"))]
        );
    }

    #[test]
    fn test_zero_length_byte_means_no_metadata() {
        let audio = audio_pattern(300);
        let input = interleave(&audio, 100, &[None, None, None]);
        let mut s = splicer(100);
        let mut out_audio = Vec::new();
        let mut events = Vec::new();
        collect(s.push(Bytes::from(input)), &mut out_audio, &mut events);

        assert_eq!(out_audio, audio);
        assert!(events.is_empty());
        assert_eq!(s.stats().metadata_blocks, 0);
    }

    #[test]
    fn test_arbitrary_chunking_reassembles_audio() {
        let audio = audio_pattern(5000);
        let blocks = [
            Some("StreamTitle='First - Song';"),
            None,
            Some("StreamTitle='Station jingle';StreamUrl='http://x';"),
            Some("StreamTitle='Second - Song';"),
        ];
        let input = interleave(&audio, 1000, &blocks);

        // Deterministic pseudo-random chunk sizes between 1 and 97 bytes.
        let mut seed: u32 = 0x2545_f491;
        for _ in 0..20 {
            let mut s = splicer(1000);
            let mut out_audio = Vec::new();
            let mut events = Vec::new();
            let mut pos = 0;
            while pos < input.len() {
                seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                let size = ((seed >> 16) % 97 + 1) as usize;
                let end = (pos + size).min(input.len());
                collect(
                    s.push(Bytes::copy_from_slice(&input[pos..end])),
                    &mut out_audio,
                    &mut events,
                );
                pos = end;
            }

            assert_eq!(out_audio, audio);
            assert_eq!(
                events,
                vec![
                    MetadataEvent::NowPlaying(NowPlaying::new("First", "Song")),
                    MetadataEvent::announcement("Station jingle"),
                    MetadataEvent::NowPlaying(NowPlaying::new("Second", "Song")),
                ]
            );
        }
    }

    #[test]
    fn test_byte_by_byte_feeding() {
        let audio = audio_pattern(64);
        let input = interleave(&audio, 16, &[Some("StreamTitle='X - Y';")]);
        let mut s = splicer(16);
        let mut out_audio = Vec::new();
        let mut events = Vec::new();
        for byte in input {
            collect(s.push(Bytes::from(vec![byte])), &mut out_audio, &mut events);
        }
        assert_eq!(out_audio, audio);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_events_keep_stream_position() {
        let audio = audio_pattern(30);
        let input = interleave(&audio, 10, &[Some("StreamTitle='A - B';")]);
        let mut s = splicer(10);
        let items = s.push(Bytes::from(input));

        let first_audio: usize = items
            .iter()
            .take_while(|i| i.as_audio().is_some())
            .map(|i| i.as_audio().map_or(0, |b| b.len()))
            .sum();
        assert_eq!(first_audio, 10);
        assert!(matches!(items[1], Spliced::Metadata(_)));
    }

    #[test]
    fn test_malformed_block_keeps_accounting() {
        let audio = audio_pattern(40);
        let input = interleave(
            &audio,
            10,
            &[Some("garbage without title"), Some("StreamTitle='C - D';")],
        );
        let mut s = splicer(10);
        let mut out_audio = Vec::new();
        let mut events = Vec::new();
        collect(s.push(Bytes::from(input)), &mut out_audio, &mut events);

        assert_eq!(out_audio, audio);
        assert_eq!(
            events,
            vec![MetadataEvent::NowPlaying(NowPlaying::new("C", "D"))]
        );
        assert_eq!(s.stats().skipped_blocks, 1);
        assert_eq!(s.stats().metadata_blocks, 2);
        assert_eq!(s.stats().audio_bytes, 40);
    }

    #[test]
    fn test_from_header() {
        assert_eq!(IcySplicer::from_header(Some(" 8192 ")).map(|s| s.metaint()), Some(8192));
        assert!(IcySplicer::from_header(Some("0")).is_none());
        assert!(IcySplicer::from_header(Some("abc")).is_none());
        assert!(IcySplicer::from_header(None).is_none());
    }
}
