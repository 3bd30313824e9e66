//! Collaborator seams of the streaming engine
//!
//! The engine never talks to a chat platform, a station catalogue or an
//! audio device directly; hosts plug those in through these traits.

use crate::audio::AudioResource;
use crate::error::Result;
use crate::models::StationRecord;
use crate::upstream::UpstreamConnection;
use async_trait::async_trait;
use pmoicy::{MetadataEvent, NowPlaying};
use std::sync::Arc;

/// Resolves user queries to playable stations
#[async_trait]
pub trait StationDirectory: Send + Sync {
    /// Best match for a free-text query, if any
    async fn resolve_station(&self, query: &str) -> Result<Option<StationRecord>>;

    /// Station by directory id; `Error::StationNotFound` when unknown
    async fn resolve_station_by_id(&self, id: &str) -> Result<StationRecord>;
}

/// Opens an audio output for a consuming context (a voice channel, a file...)
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    async fn open_audio_sink(&self, channel: &str) -> Result<Arc<dyn AudioSink>>;
}

/// Audio output fed from a session's audio resource
#[async_trait]
pub trait AudioSink: Send + Sync {
    async fn play(&self, resource: AudioResource) -> Result<()>;

    /// Must tolerate being called more than once
    async fn stop(&self) -> Result<()>;
}

/// Opens the raw upstream byte stream of a station
#[async_trait]
pub trait StreamConnector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<UpstreamConnection>;
}

/// Finds album art for a track
#[async_trait]
pub trait CoverArtLookup: Send + Sync {
    async fn lookup(&self, track: &NowPlaying) -> Result<Option<String>>;
}

/// Receives what a channel player hears
#[async_trait]
pub trait NowPlayingHandler: Send + Sync {
    async fn on_metadata(&self, station: &StationRecord, event: &MetadataEvent);

    /// `message` is already safe to show to a listener
    async fn on_error(&self, station: &StationRecord, message: &str);
}
