//! Data models shared by sessions, the registry and their consumers

use chrono::{DateTime, Utc};
use pmoicy::MetadataEvent;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a station's audio source: its trimmed stream URL
///
/// Two records pointing at the same stream share one key, and therefore one
/// upstream connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StationKey(String);

impl StationKey {
    pub fn new(url: impl AsRef<str>) -> Self {
        Self(url.as_ref().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StationKey {
    fn from(url: &str) -> Self {
        Self::new(url)
    }
}

impl From<String> for StationKey {
    fn from(url: String) -> Self {
        Self::new(url)
    }
}

/// A station as returned by a station directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationRecord {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub stream_url: String,
}

impl StationRecord {
    /// Record for a bare stream URL, named after the URL until the
    /// upstream announces an `icy-name`
    pub fn from_url(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            id: url.clone(),
            name: url.clone(),
            description: None,
            genre: None,
            image_url: None,
            stream_url: url,
        }
    }

    pub fn key(&self) -> StationKey {
        StationKey::new(&self.stream_url)
    }
}

/// Lifecycle of a station session
///
/// `Opening -> Playing -> (Stalled -> Opening)* -> Draining -> Closed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Opening,
    Playing,
    Stalled,
    Draining,
    Closed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Draining | Self::Closed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Opening => "opening",
            Self::Playing => "playing",
            Self::Stalled => "stalled",
            Self::Draining => "draining",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Event delivered to a listener binding, in stream order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum SessionEvent {
    Metadata(MetadataEvent),
    /// The station stopped for good; the text is safe to show to a listener
    Error(String),
}

impl SessionEvent {
    pub fn metadata(&self) -> Option<&MetadataEvent> {
        match self {
            Self::Metadata(event) => Some(event),
            Self::Error(_) => None,
        }
    }
}

/// Read-only snapshot of a live session
#[derive(Debug, Clone, Serialize)]
pub struct ActiveStation {
    pub key: StationKey,
    pub station_id: Option<String>,
    pub name: Option<String>,
    pub listener_count: usize,
    pub state: SessionState,
    pub started_at: DateTime<Utc>,
    pub last_metadata: Option<MetadataEvent>,
}

/// Station id and listener count, one per live session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrentlyPlaying {
    pub station_id: String,
    pub listener_count: usize,
}

impl From<&ActiveStation> for CurrentlyPlaying {
    fn from(active: &ActiveStation) -> Self {
        Self {
            station_id: active
                .station_id
                .clone()
                .unwrap_or_else(|| active.key.to_string()),
            listener_count: active.listener_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_station_key_is_trimmed() {
        let a = StationKey::new("  http://radio.example/live \n");
        let b = StationKey::from("http://radio.example/live");
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "http://radio.example/live");
    }

    #[test]
    fn test_record_from_url() {
        let record = StationRecord::from_url("http://radio.example/live");
        assert_eq!(record.name, "http://radio.example/live");
        assert_eq!(record.key(), StationKey::new("http://radio.example/live"));
    }

    #[test]
    fn test_record_deserialize_optional_fields() {
        let record: StationRecord = serde_json::from_str(
            r#"{"id":"s1","name":"Jazz FM","stream_url":"http://jazz.example/stream"}"#,
        )
        .unwrap();
        assert_eq!(record.genre, None);
        assert_eq!(record.id, "s1");
    }

    #[test]
    fn test_currently_playing_falls_back_to_key() {
        let active = ActiveStation {
            key: StationKey::new("http://radio.example/live"),
            station_id: None,
            name: None,
            listener_count: 2,
            state: SessionState::Playing,
            started_at: Utc::now(),
            last_metadata: None,
        };
        let playing = CurrentlyPlaying::from(&active);
        assert_eq!(playing.station_id, "http://radio.example/live");
        assert_eq!(playing.listener_count, 2);
    }
}
