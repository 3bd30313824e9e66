//! ICY metadata demultiplexer for PMORadiYo radio streams
//!
//! Shoutcast/Icecast servers interleave a short text block into the audio
//! byte stream every `icy-metaint` bytes when the client sends
//! `Icy-MetaData: 1`. This crate separates the two:
//!
//! - [`IcySplicer`]: synchronous, chunk-boundary-safe demultiplexer producing
//!   clean audio slices and decoded [`MetadataEvent`]s in stream order
//! - [`SplicedStream`]: `futures::Stream` adapter over an HTTP body
//! - [`decode_stream_title`]: the `StreamTitle='Artist - Title';` decoder
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use pmoicy::{IcySplicer, Spliced};
//!
//! let mut splicer = IcySplicer::from_header(Some("4")).unwrap();
//!
//! let mut wire = b"abcd".to_vec();
//! wire.push(2);
//! let mut block = b"StreamTitle='Air - Sexy Boy';".to_vec();
//! block.resize(32, 0);
//! wire.extend_from_slice(&block);
//! wire.extend_from_slice(b"efgh");
//!
//! let items = splicer.push(Bytes::from(wire));
//! let audio: Vec<u8> = items
//!     .iter()
//!     .filter_map(Spliced::as_audio)
//!     .flat_map(|b| b.iter().copied())
//!     .collect();
//! assert_eq!(audio, b"abcdefgh");
//! assert!(matches!(items[1], Spliced::Metadata(_)));
//! ```

pub mod error;
pub mod metadata;
pub mod splicer;
pub mod stream;

pub use error::{Error, Result};
pub use metadata::{decode_block, decode_stream_title, MetadataEvent, NowPlaying, ADVERTISEMENT};
pub use splicer::{IcySplicer, Spliced, SplicerStats, METADATA_BLOCK_UNIT};
pub use stream::SplicedStream;
