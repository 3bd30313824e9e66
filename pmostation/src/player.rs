//! Plays stations into one consuming context (a voice channel)

use crate::binding::ListenerBinding;
use crate::error::{Error, Result};
use crate::models::{SessionEvent, StationRecord};
use crate::registry::SessionRegistry;
use crate::traits::{AudioSink, NowPlayingHandler, StationDirectory, VoiceTransport};
use pmoicy::MetadataEvent;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

struct Playback {
    station: StationRecord,
    started: Instant,
    sink: Arc<dyn AudioSink>,
    cancel: CancellationToken,
    forwarder: JoinHandle<()>,
}

/// Station player bound to one channel
///
/// Holds at most one listener binding at a time: playing another station
/// detaches from the previous one first.
pub struct ChannelPlayer {
    channel: String,
    registry: Arc<SessionRegistry>,
    transport: Arc<dyn VoiceTransport>,
    handler: Arc<dyn NowPlayingHandler>,
    active: Mutex<Option<Playback>>,
}

impl ChannelPlayer {
    pub fn new(
        channel: impl Into<String>,
        registry: Arc<SessionRegistry>,
        transport: Arc<dyn VoiceTransport>,
        handler: Arc<dyn NowPlayingHandler>,
    ) -> Self {
        Self {
            channel: channel.into(),
            registry,
            transport,
            handler,
            active: Mutex::new(None),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Starts `station`, replacing whatever was playing
    ///
    /// When the station cannot be opened the handler receives the
    /// user-facing message and the error is returned.
    pub async fn play(&self, station: &StationRecord) -> Result<()> {
        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            debug!(channel = %self.channel, previous = %previous.station.name, "Switching station");
            self.finish(previous).await;
        }

        let mut binding = match self.registry.attach_record(station).await {
            Ok(binding) => binding,
            Err(e) => {
                error!(channel = %self.channel, station = %station.name, error = %e, "Could not start station");
                self.handler.on_error(station, &e.user_message()).await;
                return Err(e);
            }
        };

        let sink = match self.start_sink(&mut binding).await {
            Ok(sink) => sink,
            Err(e) => {
                error!(channel = %self.channel, station = %station.name, error = %e, "Could not open audio sink");
                binding.detach();
                self.handler.on_error(station, &e.user_message()).await;
                return Err(e);
            }
        };

        let listeners = binding
            .session()
            .map(|s| s.listener_count())
            .unwrap_or_default();
        info!(
            channel = %self.channel,
            station = %station.name,
            id = %station.id,
            listeners,
            "Started playing"
        );

        let cancel = CancellationToken::new();
        let forwarder = tokio::spawn(forward_events(
            binding,
            station.clone(),
            sink.clone(),
            self.handler.clone(),
            cancel.clone(),
        ));

        *active = Some(Playback {
            station: station.clone(),
            started: Instant::now(),
            sink,
            cancel,
            forwarder,
        });
        Ok(())
    }

    async fn start_sink(&self, binding: &mut ListenerBinding) -> Result<Arc<dyn AudioSink>> {
        let audio = binding
            .take_audio()
            .ok_or_else(|| Error::other("audio resource already taken"))?;
        let sink = self.transport.open_audio_sink(&self.channel).await?;
        sink.play(audio).await?;
        Ok(sink)
    }

    /// Resolves `query` through `directory` and plays the match
    pub async fn play_query(&self, directory: &dyn StationDirectory, query: &str) -> Result<StationRecord> {
        let station = match directory.resolve_station(query).await? {
            Some(station) => station,
            None => {
                let err = Error::StationNotFound(query.to_string());
                self.handler
                    .on_error(&StationRecord::from_url(query), &err.user_message())
                    .await;
                return Err(err);
            }
        };
        self.play(&station).await?;
        Ok(station)
    }

    pub async fn play_station_id(&self, directory: &dyn StationDirectory, id: &str) -> Result<StationRecord> {
        let station = directory.resolve_station_by_id(id).await?;
        self.play(&station).await?;
        Ok(station)
    }

    /// Stops playback; returns the station that was playing
    pub async fn stop(&self) -> Option<StationRecord> {
        let playback = self.active.lock().await.take()?;
        let station = playback.station.clone();
        self.finish(playback).await;
        Some(station)
    }

    /// Station currently bound, until it stops or fails
    pub async fn now_playing(&self) -> Option<StationRecord> {
        self.active
            .lock()
            .await
            .as_ref()
            .filter(|p| !p.forwarder.is_finished())
            .map(|p| p.station.clone())
    }

    async fn finish(&self, playback: Playback) {
        playback.cancel.cancel();
        if let Err(e) = playback.forwarder.await {
            warn!(channel = %self.channel, error = %e, "Event forwarder ended abnormally");
        }
        if let Err(e) = playback.sink.stop().await {
            warn!(channel = %self.channel, error = %e, "Failed to stop audio sink");
        }
        info!(
            channel = %self.channel,
            station = %playback.station.name,
            "Stopped stream, time elapsed {} mins",
            elapsed_minutes(playback.started.elapsed())
        );
    }
}

fn elapsed_minutes(elapsed: Duration) -> String {
    format!("{:.2}", elapsed.as_secs_f64() / 60.0)
}

/// Relays session events to the handler until cancelled
///
/// The binding is dropped (hence detached) when this returns.
async fn forward_events(
    mut binding: ListenerBinding,
    station: StationRecord,
    sink: Arc<dyn AudioSink>,
    handler: Arc<dyn NowPlayingHandler>,
    cancel: CancellationToken,
) {
    let mut last: Option<MetadataEvent> = None;
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = binding.next_event() => event,
        };

        match event {
            Some(SessionEvent::Metadata(metadata)) => {
                if last.as_ref() == Some(&metadata) {
                    continue;
                }
                handler.on_metadata(&station, &metadata).await;
                last = Some(metadata);
            }
            Some(SessionEvent::Error(message)) => {
                warn!(station = %station.name, "Station failed, stopping playback");
                binding.detach();
                if let Err(e) = sink.stop().await {
                    warn!(station = %station.name, error = %e, "Failed to stop audio sink");
                }
                handler.on_error(&station, &message).await;
                break;
            }
            None => {
                debug!(station = %station.name, "Session ended");
                break;
            }
        }
    }
}
