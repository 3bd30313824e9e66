//! Station key → live session map
//!
//! Concurrent requests for the same station share one in-flight open and end
//! up with the same session.

use crate::binding::ListenerBinding;
use crate::config::RadioConfig;
use crate::covers::ItunesCoverLookup;
use crate::error::{Error, Result};
use crate::models::{ActiveStation, CurrentlyPlaying, StationKey, StationRecord};
use crate::session::{SessionContext, StationOrigin, StationSession};
use crate::upstream::HttpConnector;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

type Slot = Arc<OnceCell<Arc<StationSession>>>;

/// Attach retries when the session closes between lookup and attach
const ATTACH_RETRIES: usize = 3;

/// Map shared between the registry and the sessions it owns
pub(crate) struct RegistryInner {
    slots: Mutex<HashMap<StationKey, Slot>>,
}

impl RegistryInner {
    fn slots(&self) -> MutexGuard<'_, HashMap<StationKey, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drops `key` if it still maps to session `id`
    pub(crate) fn release(&self, key: &StationKey, id: Uuid) -> bool {
        let mut slots = self.slots();
        let registered = slots
            .get(key)
            .and_then(|slot| slot.get())
            .is_some_and(|session| session.id() == id);
        if registered {
            slots.remove(key);
            info!(station = %key, active = slots.len(), "Session removed from registry");
        }
        registered
    }

    /// Drops `key` if it still maps to this exact slot
    fn forget_slot(&self, key: &StationKey, slot: &Slot) {
        let mut slots = self.slots();
        if slots.get(key).is_some_and(|s| Arc::ptr_eq(s, slot)) {
            slots.remove(key);
        }
    }

    fn sessions(&self) -> Vec<Arc<StationSession>> {
        self.slots()
            .values()
            .filter_map(|slot| slot.get().cloned())
            .collect()
    }

    fn sweep_zombies(&self) -> usize {
        let mut reclaimed = 0;
        for session in self.sessions() {
            match session.reconcile() {
                Ok(listeners) => {
                    debug!(station = %session.key(), listeners, "Session healthy");
                }
                Err(Error::ZombieSession(_)) => reclaimed += 1,
                Err(_) => {
                    // déjà fermée, l'entrée doit disparaître
                    self.release(session.key(), session.id());
                }
            }
        }
        if reclaimed > 0 {
            info!(reclaimed, "Zombie sweep finished");
        }
        reclaimed
    }
}

/// Owner of every live station session
///
/// Constructed explicitly and shared by `Arc`; nothing in this crate keeps a
/// global registry.
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
    context: SessionContext,
}

impl SessionRegistry {
    pub fn new(context: SessionContext) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                slots: Mutex::new(HashMap::new()),
            }),
            context,
        }
    }

    /// Registry over HTTP upstreams, with iTunes album art when enabled
    pub fn with_http(config: &RadioConfig) -> Result<Self> {
        let connector = Arc::new(HttpConnector::new(&config.upstream)?);
        let mut context = SessionContext::new(connector, config.session.clone());
        if config.covers.enabled {
            context = context.with_covers(Arc::new(ItunesCoverLookup::new(&config.covers)?));
        }
        Ok(Self::new(context))
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Session for `key`, opening `url` if none is live
    pub async fn get_or_create(&self, key: StationKey, url: &str) -> Result<Arc<StationSession>> {
        self.get_or_create_with(key, url, StationOrigin::default())
            .await
    }

    /// Session for a directory record
    pub async fn get_or_create_for(&self, record: &StationRecord) -> Result<Arc<StationSession>> {
        let origin = StationOrigin::from_record(record);
        self.get_or_create_with(record.key(), &record.stream_url, origin)
            .await
    }

    async fn get_or_create_with(
        &self,
        key: StationKey,
        url: &str,
        origin: StationOrigin,
    ) -> Result<Arc<StationSession>> {
        loop {
            let slot = self
                .inner
                .slots()
                .entry(key.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone();

            let opened = slot
                .get_or_try_init(|| {
                    StationSession::open_with(
                        key.clone(),
                        url,
                        origin.clone(),
                        &self.context,
                        Arc::downgrade(&self.inner),
                    )
                })
                .await;

            let session = match opened {
                Ok(session) => session.clone(),
                Err(e) => {
                    self.inner.forget_slot(&key, &slot);
                    return Err(e);
                }
            };

            if session.is_closed() {
                self.inner.forget_slot(&key, &slot);
                continue;
            }

            if !self.ensure_registered(&key, &slot) {
                // une autre session a pris la place pendant l'ouverture
                warn!(station = %key, "Duplicate session opened, closing it");
                session.close();
                continue;
            }

            return Ok(session);
        }
    }

    /// Puts `slot` back under `key` after a failed open removed it meanwhile
    fn ensure_registered(&self, key: &StationKey, slot: &Slot) -> bool {
        let mut slots = self.inner.slots();
        match slots.get(key) {
            Some(current) => Arc::ptr_eq(current, slot),
            None => {
                slots.insert(key.clone(), slot.clone());
                info!(station = %key, active = slots.len(), "Session registered");
                true
            }
        }
    }

    /// Gets or creates the session and attaches a new listener to it
    pub async fn attach(&self, key: StationKey, url: &str) -> Result<ListenerBinding> {
        self.attach_with(key, url, StationOrigin::default()).await
    }

    pub async fn attach_record(&self, record: &StationRecord) -> Result<ListenerBinding> {
        let origin = StationOrigin::from_record(record);
        self.attach_with(record.key(), &record.stream_url, origin)
            .await
    }

    async fn attach_with(
        &self,
        key: StationKey,
        url: &str,
        origin: StationOrigin,
    ) -> Result<ListenerBinding> {
        let mut last_error = None;
        for _ in 0..ATTACH_RETRIES {
            let session = self
                .get_or_create_with(key.clone(), url, origin.clone())
                .await?;
            match session.attach() {
                Ok(binding) => return Ok(binding),
                Err(e @ Error::SessionClosed(_)) => {
                    debug!(station = %key, "Session closed while attaching, retrying");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error.unwrap_or_else(|| Error::SessionClosed(key.to_string())))
    }

    /// Removes `session` if it is the one registered under `key`
    pub fn remove(&self, key: &StationKey, session: &StationSession) -> bool {
        self.inner.release(key, session.id())
    }

    pub fn get(&self, key: &StationKey) -> Option<Arc<StationSession>> {
        self.inner
            .slots()
            .get(key)
            .and_then(|slot| slot.get().cloned())
            .filter(|session| !session.is_closed())
    }

    /// Snapshot of every open session
    pub fn list_active(&self) -> Vec<ActiveStation> {
        let mut active: Vec<ActiveStation> = self
            .inner
            .sessions()
            .iter()
            .filter(|session| !session.is_closed())
            .map(|session| session.summary())
            .collect();
        active.sort_by(|a, b| a.key.cmp(&b.key));
        active
    }

    pub fn currently_playing(&self) -> Vec<CurrentlyPlaying> {
        self.list_active()
            .iter()
            .map(CurrentlyPlaying::from)
            .collect()
    }

    /// Number of open sessions, including ones still opening
    pub fn len(&self) -> usize {
        self.inner.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reconciles every session and reclaims the zombies; returns how many
    pub fn sweep_zombies(&self) -> usize {
        self.inner.sweep_zombies()
    }

    /// Runs `sweep_zombies` every `interval` until `stop` is cancelled
    pub fn spawn_zombie_sweeper(
        &self,
        interval: Duration,
        stop: CancellationToken,
    ) -> JoinHandle<()> {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // le premier tick est immédiat
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {
                        inner.sweep_zombies();
                    }
                }
            }
            debug!("Zombie sweeper stopped");
        })
    }

    /// Closes every session
    pub fn shutdown(&self) {
        let sessions = self.inner.sessions();
        info!(sessions = sessions.len(), "Shutting down session registry");
        for session in sessions {
            session.close();
        }
        self.inner.slots().clear();
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}
