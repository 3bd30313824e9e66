//! Now-playing metadata carried by ICY `StreamTitle` fields
//!
//! Stations write free text in `StreamTitle='...';`. Only the unambiguous
//! `Artist - Title` shape is turned into a structured [`NowPlaying`]; anything
//! else is surfaced verbatim as an announcement.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const STREAM_TITLE_PREFIX: &str = "StreamTitle='";
const STREAM_TITLE_SUFFIX: &str = "';";

/// Marker found in ad-insertion titles (case-insensitive)
const AD_CONTEXT_MARKER: &str = "adcontext=";

/// Marker of the `Artist - text="Title" song_spot=...` vendor format (case-insensitive)
const SONG_SPOT_MARKER: &str = "song_spot";

/// Separator between artist and title in the `song_spot` format
const SONG_SPOT_SEPARATOR: &str = " - text=\"";

/// Announcement emitted for advertisement breaks
pub const ADVERTISEMENT: &str = "Advertisement";

/// Track currently on air
///
/// Values are never mutated once published: enrichment (album art) builds a
/// new value through [`NowPlaying::with_album_art`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NowPlaying {
    pub title: String,
    pub artist: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album_art_url: Option<String>,
}

impl NowPlaying {
    pub fn new(artist: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
            album_art_url: None,
        }
    }

    /// Copy of this track with the given cover URL
    pub fn with_album_art(&self, url: impl Into<String>) -> Self {
        Self {
            title: self.title.clone(),
            artist: self.artist.clone(),
            album_art_url: Some(url.into()),
        }
    }

    /// True when neither artist nor title carries text
    pub fn is_blank(&self) -> bool {
        self.artist.is_empty() && self.title.is_empty()
    }
}

impl fmt::Display for NowPlaying {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.artist, self.title)
    }
}

/// Decoded metadata block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MetadataEvent {
    /// Structured artist/title
    NowPlaying(NowPlaying),
    /// Free-form text (ads, station slogans, ambiguous titles)
    Announcement(String),
}

impl MetadataEvent {
    pub fn announcement(text: impl Into<String>) -> Self {
        Self::Announcement(text.into())
    }

    pub fn now_playing(&self) -> Option<&NowPlaying> {
        match self {
            Self::NowPlaying(np) => Some(np),
            Self::Announcement(_) => None,
        }
    }

    pub fn is_advertisement(&self) -> bool {
        matches!(self, Self::Announcement(text) if text == ADVERTISEMENT)
    }
}

impl fmt::Display for MetadataEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NowPlaying(np) => np.fmt(f),
            Self::Announcement(text) => f.write_str(text),
        }
    }
}

impl From<NowPlaying> for MetadataEvent {
    fn from(np: NowPlaying) -> Self {
        Self::NowPlaying(np)
    }
}

/// Decode a raw metadata block as read from the wire
///
/// Null padding is stripped first. A block made only of padding yields
/// `Ok(None)`; a block without a `StreamTitle` field is an error.
pub fn decode_block(block: &[u8]) -> Result<Option<MetadataEvent>> {
    let text: Vec<u8> = block.iter().copied().filter(|b| *b != 0).collect();
    let text = String::from_utf8_lossy(&text);

    if text.trim().is_empty() {
        return Ok(None);
    }

    decode_stream_title(&text)
}

/// Decode the `StreamTitle='...'` field of a metadata block
///
/// # Example
///
/// ```
/// use pmoicy::{decode_stream_title, MetadataEvent, NowPlaying};
///
/// let event = decode_stream_title("StreamTitle='Miles Davis - So What';").unwrap();
/// assert_eq!(event, Some(MetadataEvent::NowPlaying(NowPlaying::new("Miles Davis", "So What"))));
/// ```
pub fn decode_stream_title(block: &str) -> Result<Option<MetadataEvent>> {
    let content = extract_stream_title(block).ok_or_else(|| Error::skipped(block))?;
    Ok(classify(content))
}

fn extract_stream_title(block: &str) -> Option<&str> {
    let start = block.find(STREAM_TITLE_PREFIX)? + STREAM_TITLE_PREFIX.len();
    let rest = &block[start..];
    Some(match rest.find(STREAM_TITLE_SUFFIX) {
        Some(end) => &rest[..end],
        None => rest.trim_end().trim_end_matches('\''),
    })
}

fn classify(content: &str) -> Option<MetadataEvent> {
    let lowered = content.to_ascii_lowercase();

    if lowered.contains(AD_CONTEXT_MARKER) {
        return Some(MetadataEvent::announcement(ADVERTISEMENT));
    }

    if lowered.contains(SONG_SPOT_MARKER) {
        if let Some((artist, rest)) = content.split_once(SONG_SPOT_SEPARATOR) {
            let title = rest.split('"').next().unwrap_or_default();
            return Some(NowPlaying::new(artist, title).into());
        }
    }

    // Only a single dash is an unambiguous artist/title separator.
    match content.matches('-').count() {
        1 => {
            let (artist, title) = content.split_once('-')?;
            Some(NowPlaying::new(artist.trim(), title.trim()).into())
        }
        _ if content.trim().is_empty() => None,
        _ => Some(MetadataEvent::announcement(content)),
    }
}
