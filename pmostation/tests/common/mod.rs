//! Fakes shared by the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use pmostation::{
    AudioResource, AudioSink, CoverArtLookup, Error, IcyHeaders, MetadataEvent, NowPlaying,
    NowPlayingHandler, Result, SessionConfig, SessionContext, SessionRegistry, StationDirectory,
    StationRecord, StreamConnector, UpstreamConnection, VoiceTransport,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub const URL: &str = "http://radio.example/live";

/// Wire bytes of one metadata block: length byte then the null-padded text
pub fn icy_block(text: &str) -> Vec<u8> {
    let units = text.len().div_ceil(16);
    let mut block = vec![units as u8];
    block.extend_from_slice(text.as_bytes());
    block.resize(1 + units * 16, 0);
    block
}

pub fn stream_title(title: &str) -> Vec<u8> {
    icy_block(&format!("StreamTitle='{}';", title))
}

/// Sending half of a live upstream body; dropping it ends the body
pub type Feed = mpsc::UnboundedSender<Result<Bytes>>;

pub enum Script {
    Fail(String),
    Live {
        metaint: Option<usize>,
        body: mpsc::UnboundedReceiver<Result<Bytes>>,
    },
    /// Body that never yields nor ends
    Silent { metaint: Option<usize> },
}

impl Script {
    pub fn live(metaint: Option<usize>) -> (Self, Feed) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::Live { metaint, body: rx }, tx)
    }
}

/// `StreamConnector` replaying scripted upstreams in order
///
/// Once the scripts are exhausted every connect fails.
#[derive(Default)]
pub struct ScriptedConnector {
    scripts: Mutex<VecDeque<Script>>,
    connects: AtomicUsize,
    delay: Mutex<Duration>,
}

impl ScriptedConnector {
    pub fn new(scripts: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            ..Default::default()
        })
    }

    pub fn push(&self, script: Script) {
        self.scripts.lock().unwrap().push_back(script);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StreamConnector for ScriptedConnector {
    async fn connect(&self, url: &str) -> Result<UpstreamConnection> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let script = self.scripts.lock().unwrap().pop_front();
        let headers = |metaint| IcyHeaders {
            metaint,
            name: Some("Scripted FM".to_string()),
            ..Default::default()
        };
        match script {
            Some(Script::Live { metaint, body }) => {
                let body = stream::unfold(body, |mut rx| async move {
                    rx.recv().await.map(|item| (item, rx))
                })
                .boxed();
                Ok(UpstreamConnection::new(url, headers(metaint), body))
            }
            Some(Script::Silent { metaint }) => Ok(UpstreamConnection::new(
                url,
                headers(metaint),
                stream::pending().boxed(),
            )),
            Some(Script::Fail(reason)) => Err(Error::stream_unavailable(url, reason)),
            None => Err(Error::stream_unavailable(url, "connection refused")),
        }
    }
}

pub fn fast_config() -> SessionConfig {
    SessionConfig {
        stall_timeout: Duration::from_secs(5),
        reconnect_attempts: 2,
        reconnect_backoff: Duration::from_millis(10),
        reconnect_backoff_max: Duration::from_millis(20),
        audio_buffer_chunks: 64,
        zombie_grace: Duration::ZERO,
    }
}

pub fn registry(connector: Arc<ScriptedConnector>) -> SessionRegistry {
    SessionRegistry::new(SessionContext::new(connector, fast_config()))
}

pub fn registry_with(connector: Arc<ScriptedConnector>, config: SessionConfig) -> SessionRegistry {
    SessionRegistry::new(SessionContext::new(connector, config))
}

/// Reads audio until `len` bytes arrived
pub async fn read_audio(audio: &mut AudioResource, len: usize) -> Vec<u8> {
    let mut out = Vec::new();
    while out.len() < len {
        let chunk = tokio::time::timeout(Duration::from_secs(2), audio.recv())
            .await
            .expect("audio timed out")
            .expect("audio closed");
        out.extend_from_slice(&chunk);
    }
    out
}

/// Album art keyed by title, with an optional per-title delay
#[derive(Default)]
pub struct FakeCovers {
    art: HashMap<String, (String, Duration)>,
    pub lookups: AtomicUsize,
}

impl FakeCovers {
    pub fn with(mut self, title: &str, url: &str, delay: Duration) -> Self {
        self.art.insert(title.to_string(), (url.to_string(), delay));
        self
    }
}

#[async_trait]
impl CoverArtLookup for FakeCovers {
    async fn lookup(&self, track: &NowPlaying) -> Result<Option<String>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        match self.art.get(&track.title) {
            Some((url, delay)) => {
                tokio::time::sleep(*delay).await;
                Ok(Some(url.clone()))
            }
            None => Ok(None),
        }
    }
}

/// Sink collecting the audio it is given
#[derive(Default)]
pub struct RecordingSink {
    pub audio: Arc<Mutex<Vec<u8>>>,
    pub stops: AtomicUsize,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

#[async_trait]
impl AudioSink for RecordingSink {
    async fn play(&self, mut resource: AudioResource) -> Result<()> {
        let audio = self.audio.clone();
        let task = tokio::spawn(async move {
            while let Some(chunk) = resource.recv().await {
                audio.lock().unwrap().extend_from_slice(&chunk);
            }
        });
        *self.task.lock().unwrap() = Some(task);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        if let Some(task) = self.task.lock().unwrap().take() {
            task.abort();
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingTransport {
    pub sinks: Mutex<Vec<Arc<RecordingSink>>>,
}

impl RecordingTransport {
    pub fn last_sink(&self) -> Arc<RecordingSink> {
        self.sinks.lock().unwrap().last().cloned().expect("no sink opened")
    }
}

#[async_trait]
impl VoiceTransport for RecordingTransport {
    async fn open_audio_sink(&self, _channel: &str) -> Result<Arc<dyn AudioSink>> {
        let sink = Arc::new(RecordingSink::default());
        self.sinks.lock().unwrap().push(sink.clone());
        Ok(sink)
    }
}

/// Transport whose sinks can never be opened
pub struct FailingTransport;

#[async_trait]
impl VoiceTransport for FailingTransport {
    async fn open_audio_sink(&self, channel: &str) -> Result<Arc<dyn AudioSink>> {
        Err(Error::Sink(format!("not connected to {}", channel)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Heard {
    Metadata(String, MetadataEvent),
    Error(String, String),
}

/// Handler forwarding everything to a channel
pub struct ChannelHandler {
    tx: mpsc::UnboundedSender<Heard>,
}

impl ChannelHandler {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Heard>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl NowPlayingHandler for ChannelHandler {
    async fn on_metadata(&self, station: &StationRecord, event: &MetadataEvent) {
        let _ = self.tx.send(Heard::Metadata(station.id.clone(), event.clone()));
    }

    async fn on_error(&self, station: &StationRecord, message: &str) {
        let _ = self.tx.send(Heard::Error(station.id.clone(), message.to_string()));
    }
}

/// In-memory station directory
pub struct FakeDirectory {
    pub stations: Vec<StationRecord>,
}

#[async_trait]
impl StationDirectory for FakeDirectory {
    async fn resolve_station(&self, query: &str) -> Result<Option<StationRecord>> {
        let query = query.to_lowercase();
        Ok(self
            .stations
            .iter()
            .find(|s| s.name.to_lowercase().contains(&query))
            .cloned())
    }

    async fn resolve_station_by_id(&self, id: &str) -> Result<StationRecord> {
        self.stations
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| Error::StationNotFound(id.to_string()))
    }
}

pub fn station(id: &str, name: &str, url: &str) -> StationRecord {
    StationRecord {
        id: id.to_string(),
        name: name.to_string(),
        description: None,
        genre: None,
        image_url: None,
        stream_url: url.to_string(),
    }
}

/// Waits until `check` holds, polling every few milliseconds
pub async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
