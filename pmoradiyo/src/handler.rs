use async_trait::async_trait;
use pmostation::{MetadataEvent, NowPlayingHandler, StationRecord};
use tracing::{info, warn};

/// Logs what is on air
pub struct LogNowPlaying;

#[async_trait]
impl NowPlayingHandler for LogNowPlaying {
    async fn on_metadata(&self, station: &StationRecord, event: &MetadataEvent) {
        match event {
            MetadataEvent::NowPlaying(track) => match &track.album_art_url {
                Some(art) => info!(station = %station.name, art = %art, "🎵 Now playing: {}", track),
                None => info!(station = %station.name, "🎵 Now playing: {}", track),
            },
            MetadataEvent::Announcement(text) if !text.is_empty() => {
                info!(station = %station.name, "📢 {}", text)
            }
            MetadataEvent::Announcement(_) => {}
        }
    }

    async fn on_error(&self, station: &StationRecord, message: &str) {
        warn!(station = %station.name, "⚠️ {}", message);
    }
}
