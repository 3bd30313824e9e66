//! A consuming context's attachment to a station session

use crate::audio::AudioResource;
use crate::models::{SessionEvent, StationKey};
use crate::session::StationSession;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use uuid::Uuid;

/// One listener of one session
///
/// Receives the session's metadata events in stream order and owns an audio
/// resource until a sink takes it. Dropping the binding detaches it.
#[derive(Debug)]
pub struct ListenerBinding {
    id: Uuid,
    station: StationKey,
    session: Weak<StationSession>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    audio: Option<AudioResource>,
    detached: AtomicBool,
}

impl ListenerBinding {
    pub(crate) fn new(
        id: Uuid,
        station: StationKey,
        session: Weak<StationSession>,
        events: mpsc::UnboundedReceiver<SessionEvent>,
        audio: AudioResource,
    ) -> Self {
        Self {
            id,
            station,
            session,
            events,
            audio: Some(audio),
            detached: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn station(&self) -> &StationKey {
        &self.station
    }

    /// The session, while it is still alive
    pub fn session(&self) -> Option<Arc<StationSession>> {
        self.session.upgrade()
    }

    /// Next event; `None` once the session is closed or this binding detached
    /// and the pending events are drained
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    pub fn try_next_event(&mut self) -> Option<SessionEvent> {
        self.events.try_recv().ok()
    }

    /// Audio of the station, available once
    pub fn take_audio(&mut self) -> Option<AudioResource> {
        self.audio.take()
    }

    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::SeqCst)
    }

    /// Leaves the session; later calls do nothing
    pub fn detach(&self) {
        if self.detached.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(session) = self.session.upgrade() {
            session.detach(self.id);
        }
    }
}

impl Drop for ListenerBinding {
    fn drop(&mut self) {
        self.detach();
    }
}
