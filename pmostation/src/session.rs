//! One shared upstream connection per station
//!
//! A `StationSession` owns the HTTP upstream of a station, splices the ICY
//! metadata out of it and fans the audio and the metadata events out to
//! every attached `ListenerBinding`. It survives upstream stalls by
//! reconnecting and tears itself down when its last listener leaves.

use crate::audio::AudioResource;
use crate::binding::ListenerBinding;
use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::models::{ActiveStation, SessionEvent, SessionState, StationKey, StationRecord};
use crate::registry::RegistryInner;
use crate::traits::{CoverArtLookup, StreamConnector};
use crate::upstream::{IcyHeaders, UpstreamConnection};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::{BoxStream, StreamExt};
use pmoicy::{MetadataEvent, NowPlaying, Spliced, SplicedStream};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Instant;
use tokio::sync::{broadcast, mpsc, watch, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

type Upstream = SplicedStream<BoxStream<'static, Result<Bytes>>>;

/// Collaborators and settings shared by every session of a registry
#[derive(Clone)]
pub struct SessionContext {
    pub connector: Arc<dyn StreamConnector>,
    pub covers: Option<Arc<dyn CoverArtLookup>>,
    pub config: SessionConfig,
}

impl SessionContext {
    pub fn new(connector: Arc<dyn StreamConnector>, config: SessionConfig) -> Self {
        Self {
            connector,
            covers: None,
            config,
        }
    }

    pub fn with_covers(mut self, covers: Arc<dyn CoverArtLookup>) -> Self {
        self.covers = Some(covers);
        self
    }
}

/// Directory identity of the station a session plays, when known
#[derive(Clone, Debug, Default)]
pub struct StationOrigin {
    pub station_id: Option<String>,
    pub name: Option<String>,
}

impl StationOrigin {
    /// A record named after its own URL has no directory name: the
    /// upstream's `icy-name` is used instead.
    pub fn from_record(record: &StationRecord) -> Self {
        let name = record.name.trim();
        let named = !name.is_empty() && name != record.stream_url.trim();
        Self {
            station_id: Some(record.id.clone()),
            name: named.then(|| name.to_string()),
        }
    }
}

struct Listeners {
    senders: HashMap<Uuid, mpsc::UnboundedSender<SessionEvent>>,
    last_metadata: Option<MetadataEvent>,
    /// Last value decoded from the stream, before any album art
    last_decoded: Option<MetadataEvent>,
    /// Bumped on every decoded metadata block; cover results carry the
    /// value they were started for.
    metadata_seq: u64,
    closed: bool,
}

impl Listeners {
    fn broadcast(&self, event: &SessionEvent) {
        for tx in self.senders.values() {
            let _ = tx.send(event.clone());
        }
    }
}

/// Shared upstream for one station
pub struct StationSession {
    id: Uuid,
    key: StationKey,
    url: String,
    station_id: Option<String>,
    name: Option<String>,
    started_at: DateTime<Utc>,
    opened_at: Instant,
    config: SessionConfig,
    connector: Arc<dyn StreamConnector>,
    covers: Option<Arc<dyn CoverArtLookup>>,
    owner: Weak<RegistryInner>,
    listeners: Mutex<Listeners>,
    listener_count: AtomicUsize,
    listener_notify: Arc<Notify>,
    audio_tx: Mutex<Option<broadcast::Sender<Bytes>>>,
    headers: Mutex<IcyHeaders>,
    state_tx: watch::Sender<SessionState>,
    stop_token: CancellationToken,
}

impl StationSession {
    /// Opens `url` and starts pumping it
    ///
    /// Fails with `Error::StreamUnavailable` when the upstream cannot be
    /// reached or answers with a non-success status. A missing
    /// `icy-metaint` is not an error: the audio is forwarded verbatim.
    pub async fn open(key: StationKey, url: &str, context: &SessionContext) -> Result<Arc<Self>> {
        Self::open_with(key, url, StationOrigin::default(), context, Weak::new()).await
    }

    pub(crate) async fn open_with(
        key: StationKey,
        url: &str,
        origin: StationOrigin,
        context: &SessionContext,
        owner: Weak<RegistryInner>,
    ) -> Result<Arc<Self>> {
        info!(station = %key, url, "Opening station session");

        let connection = context.connector.connect(url).await.map_err(|e| {
            warn!(station = %key, error = %e, "Failed to open upstream");
            match e {
                Error::StreamUnavailable { .. } => e,
                other => Error::stream_unavailable(url, other),
            }
        })?;

        if connection.headers.metaint.is_none() {
            info!(station = %key, "No icy-metaint announced, forwarding audio verbatim");
        }

        let (audio_tx, _) = broadcast::channel(context.config.audio_buffer_chunks.max(1));
        let (state_tx, _) = watch::channel(SessionState::Opening);
        let name = origin.name.or_else(|| connection.headers.name.clone());

        let session = Arc::new(Self {
            id: Uuid::new_v4(),
            key,
            url: url.to_string(),
            station_id: origin.station_id,
            name,
            started_at: Utc::now(),
            opened_at: Instant::now(),
            config: context.config.clone(),
            connector: context.connector.clone(),
            covers: context.covers.clone(),
            owner,
            listeners: Mutex::new(Listeners {
                senders: HashMap::new(),
                last_metadata: None,
                last_decoded: None,
                metadata_seq: 0,
                closed: false,
            }),
            listener_count: AtomicUsize::new(0),
            listener_notify: Arc::new(Notify::new()),
            audio_tx: Mutex::new(Some(audio_tx)),
            headers: Mutex::new(connection.headers.clone()),
            state_tx,
            stop_token: CancellationToken::new(),
        });

        session.set_state(SessionState::Playing);
        tokio::spawn(Self::run_pump(
            Arc::downgrade(&session),
            session.stop_token.clone(),
            session.listener_notify.clone(),
            connection,
        ));
        Ok(session)
    }

    /// Adds a listener
    ///
    /// The new binding immediately receives the last known metadata, if any.
    pub fn attach(self: &Arc<Self>) -> Result<ListenerBinding> {
        let mut listeners = self.lock_listeners();
        if listeners.closed {
            return Err(Error::SessionClosed(self.key.to_string()));
        }
        let audio_rx = lock(&self.audio_tx)
            .as_ref()
            .map(broadcast::Sender::subscribe)
            .ok_or_else(|| Error::SessionClosed(self.key.to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(last) = &listeners.last_metadata {
            let _ = tx.send(SessionEvent::Metadata(last.clone()));
        }

        let id = Uuid::new_v4();
        listeners.senders.insert(id, tx);
        let count = self.listener_count.fetch_add(1, Ordering::SeqCst) + 1;
        drop(listeners);

        debug!(station = %self.key, listeners = count, "Listener attached");
        self.listener_notify.notify_one();

        Ok(ListenerBinding::new(
            id,
            self.key.clone(),
            Arc::downgrade(self),
            rx,
            AudioResource::new(self.key.clone(), audio_rx),
        ))
    }

    /// Removes a listener; the last one out closes the session
    ///
    /// Unknown ids are ignored, so a binding detaches at most once.
    pub(crate) fn detach(&self, id: Uuid) {
        let last = {
            let mut listeners = self.lock_listeners();
            if listeners.senders.remove(&id).is_none() {
                return;
            }
            let remaining = self
                .listener_count
                .fetch_sub(1, Ordering::SeqCst)
                .saturating_sub(1);
            debug!(station = %self.key, listeners = remaining, "Listener detached");

            if remaining == 0 && !listeners.closed {
                listeners.closed = true;
                true
            } else {
                false
            }
        };

        if last {
            self.finish_close("last listener left");
        }
    }

    /// Closes the session regardless of its listeners
    ///
    /// Their event channels end; their audio resources end once the pump
    /// task has stopped.
    pub fn close(&self) {
        {
            let mut listeners = self.lock_listeners();
            if listeners.closed {
                return;
            }
            listeners.closed = true;
            listeners.senders.clear();
            self.listener_count.store(0, Ordering::SeqCst);
        }
        self.finish_close("closed");
    }

    /// Checks the bookkeeping against the listeners still alive
    ///
    /// Returns the live listener count. A session with no live listener,
    /// older than the zombie grace period, is closed and reported as
    /// `Error::ZombieSession`.
    pub fn reconcile(&self) -> Result<usize> {
        let (live, reclaim) = {
            let mut listeners = self.lock_listeners();
            if listeners.closed {
                return Err(Error::SessionClosed(self.key.to_string()));
            }

            listeners.senders.retain(|_, tx| !tx.is_closed());
            let live = listeners.senders.len();
            let tracked = self.listener_count.load(Ordering::SeqCst);
            if live != tracked {
                warn!(station = %self.key, tracked, live, "Listener count out of sync, repairing");
                self.listener_count.store(live, Ordering::SeqCst);
            }

            let reclaim = live == 0 && self.opened_at.elapsed() >= self.config.zombie_grace;
            if reclaim {
                listeners.closed = true;
            }
            (live, reclaim)
        };

        if reclaim {
            let err = Error::ZombieSession(self.key.to_string());
            warn!(station = %self.key, "{}", err);
            self.finish_close("zombie");
            return Err(err);
        }
        Ok(live)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn key(&self) -> &StationKey {
        &self.key
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn station_id(&self) -> Option<&str> {
        self.station_id.as_deref()
    }

    /// Directory name, or the upstream's `icy-name`
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn listener_count(&self) -> usize {
        self.listener_count.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.lock_listeners().closed
    }

    pub fn last_metadata(&self) -> Option<MetadataEvent> {
        self.lock_listeners().last_metadata.clone()
    }

    /// Headers of the current upstream connection
    pub fn icy_headers(&self) -> IcyHeaders {
        lock(&self.headers).clone()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn summary(&self) -> ActiveStation {
        ActiveStation {
            key: self.key.clone(),
            station_id: self.station_id.clone(),
            name: self.name.clone(),
            listener_count: self.listener_count(),
            state: self.state(),
            started_at: self.started_at,
            last_metadata: self.last_metadata(),
        }
    }

    fn lock_listeners(&self) -> MutexGuard<'_, Listeners> {
        lock(&self.listeners)
    }

    fn set_state(&self, state: SessionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!(station = %self.key, from = %previous, to = %state, "Session state changed");
        }
    }

    fn finish_close(&self, reason: &str) {
        self.set_state(SessionState::Draining);
        self.stop_token.cancel();
        lock(&self.audio_tx).take();

        if let Some(owner) = self.owner.upgrade() {
            owner.release(&self.key, self.id);
        }

        self.set_state(SessionState::Closed);
        info!(station = %self.key, reason, "Station session closed");
    }

    /// Sends a final error to every listener, then closes
    fn fail(&self, err: Error) {
        error!(station = %self.key, error = %err, "Giving up on station");
        let event = SessionEvent::Error(err.user_message());
        {
            let mut listeners = self.lock_listeners();
            if listeners.closed {
                return;
            }
            listeners.broadcast(&event);
            listeners.closed = true;
            listeners.senders.clear();
            self.listener_count.store(0, Ordering::SeqCst);
        }
        self.finish_close("upstream unavailable");
    }

    fn publish_metadata(self: &Arc<Self>, event: MetadataEvent) {
        let seq = {
            let mut listeners = self.lock_listeners();
            if listeners.closed {
                return;
            }
            // les serveurs répètent souvent le même titre à chaque intervalle
            if listeners.last_decoded.as_ref() == Some(&event) {
                debug!(station = %self.key, "Metadata unchanged");
                return;
            }
            listeners.last_decoded = Some(event.clone());
            listeners.metadata_seq += 1;
            listeners.last_metadata = Some(event.clone());
            listeners.broadcast(&SessionEvent::Metadata(event.clone()));
            listeners.metadata_seq
        };
        info!(station = %self.key, metadata = %event, "Metadata changed");

        if let (Some(covers), MetadataEvent::NowPlaying(track)) = (&self.covers, &event) {
            if track.album_art_url.is_none() && !track.is_blank() {
                tokio::spawn(Self::enrich(
                    Arc::downgrade(self),
                    covers.clone(),
                    track.clone(),
                    seq,
                ));
            }
        }
    }

    /// Publishes `track` again with its album art, unless newer metadata
    /// arrived while the lookup ran
    async fn enrich(
        session: Weak<Self>,
        covers: Arc<dyn CoverArtLookup>,
        track: NowPlaying,
        seq: u64,
    ) {
        let art = match covers.lookup(&track).await {
            Ok(Some(url)) => url,
            Ok(None) => {
                debug!(track = %track, "No album art found");
                return;
            }
            Err(e) => {
                debug!(track = %track, error = %e, "Album art lookup failed");
                return;
            }
        };

        let Some(session) = session.upgrade() else {
            return;
        };
        let mut listeners = session.lock_listeners();
        if listeners.closed || listeners.metadata_seq != seq {
            debug!(station = %session.key, track = %track, "Discarding stale album art");
            return;
        }
        let event = MetadataEvent::NowPlaying(track.with_album_art(art));
        listeners.last_metadata = Some(event.clone());
        listeners.broadcast(&SessionEvent::Metadata(event));
    }

    /// Waits for the first listener without keeping the session alive
    ///
    /// `None` when the session was closed or dropped before anyone attached.
    async fn wait_for_listeners(
        session: &Weak<Self>,
        stop: &CancellationToken,
        notify: &Notify,
    ) -> Option<Arc<Self>> {
        loop {
            {
                let session = session.upgrade()?;
                if session.listener_count() > 0 {
                    return Some(session);
                }
            }
            tokio::select! {
                _ = stop.cancelled() => return None,
                _ = notify.notified() => {},
            }
        }
    }

    fn splice(&self, connection: UpstreamConnection) -> Upstream {
        let splicer = connection.headers.splicer();
        *lock(&self.headers) = connection.headers;
        SplicedStream::new(connection.body, splicer)
    }

    /// Reads the upstream until the session is cancelled
    ///
    /// Starts reading only once a first listener is attached so that it
    /// hears the stream from its first byte. Until then the task holds no
    /// strong reference: dropping an unattached session releases the
    /// upstream.
    async fn run_pump(
        session: Weak<Self>,
        stop: CancellationToken,
        notify: Arc<Notify>,
        connection: UpstreamConnection,
    ) {
        match Self::wait_for_listeners(&session, &stop, &notify).await {
            Some(session) => session.pump(connection).await,
            None => debug!("Session gone before any listener attached, releasing upstream"),
        }
    }

    async fn pump(self: Arc<Self>, connection: UpstreamConnection) {
        let Some(audio_tx) = lock(&self.audio_tx).clone() else {
            return;
        };

        let mut upstream = self.splice(connection);
        loop {
            let next = tokio::select! {
                _ = self.stop_token.cancelled() => break,
                next = tokio::time::timeout(self.config.stall_timeout, upstream.next()) => next,
            };

            let reason = match next {
                Ok(Some(Ok(Spliced::Audio(chunk)))) => {
                    let _ = audio_tx.send(chunk);
                    continue;
                }
                Ok(Some(Ok(Spliced::Metadata(event)))) => {
                    self.publish_metadata(event);
                    continue;
                }
                Ok(Some(Err(e))) => format!("read error: {}", e),
                Ok(None) => "end of stream".to_string(),
                Err(_) => format!("no data for {:?}", self.config.stall_timeout),
            };

            if self.stop_token.is_cancelled() {
                break;
            }
            self.set_state(SessionState::Stalled);
            warn!(station = %self.key, reason = %reason, "Upstream stalled, reconnecting");

            match self.reconnect().await {
                Ok(Some(connection)) => {
                    upstream = self.splice(connection);
                    self.set_state(SessionState::Playing);
                }
                Ok(None) => break,
                Err(e) => {
                    self.fail(e);
                    break;
                }
            }
        }
        debug!(station = %self.key, "Upstream pump stopped");
    }

    /// Reopens the same URL with exponential backoff
    ///
    /// `Ok(None)` when the session was cancelled meanwhile.
    async fn reconnect(&self) -> Result<Option<UpstreamConnection>> {
        let attempts = self.config.reconnect_attempts;
        let mut backoff = self.config.reconnect_backoff;

        for attempt in 1..=attempts {
            self.set_state(SessionState::Opening);
            let result = tokio::select! {
                _ = self.stop_token.cancelled() => return Ok(None),
                result = self.connector.connect(&self.url) => result,
            };

            match result {
                Ok(connection) => {
                    info!(station = %self.key, attempt, "Upstream reconnected");
                    return Ok(Some(connection));
                }
                Err(e) => {
                    warn!(station = %self.key, attempt, attempts, error = %e, "Reconnect attempt failed");
                }
            }

            if attempt < attempts {
                self.set_state(SessionState::Stalled);
                tokio::select! {
                    _ = self.stop_token.cancelled() => return Ok(None),
                    _ = tokio::time::sleep(backoff) => {},
                }
                backoff = (backoff * 2).min(self.config.reconnect_backoff_max);
            }
        }

        Err(Error::UpstreamStalled {
            url: self.url.clone(),
            attempts,
        })
    }
}

impl fmt::Debug for StationSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StationSession")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("state", &self.state())
            .field("listeners", &self.listener_count())
            .finish_non_exhaustive()
    }
}

impl Drop for StationSession {
    fn drop(&mut self) {
        self.stop_token.cancel();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
