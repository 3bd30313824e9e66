//! Error types for station sessions

/// Result type alias for station operations
pub type Result<T> = std::result::Result<T, Error>;

/// Message shown to listeners when a station cannot be streamed.
///
/// Protocol details stay in the logs; consumers only ever see this text.
pub const STATION_UNPLAYABLE: &str = "This station could not be played, please try another one.";

/// Errors that can occur while streaming a station
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The upstream could not be opened (bad status, DNS, refused...)
    #[error("Stream unavailable at {url}: {reason}")]
    StreamUnavailable { url: String, reason: String },

    /// Every reconnection attempt after a stall failed
    #[error("Upstream {url} stalled, {attempts} reconnect attempts failed")]
    UpstreamStalled { url: String, attempts: u32 },

    /// Session had no live listener left and was reclaimed
    #[error("Zombie session reclaimed for station {0}")]
    ZombieSession(String),

    /// Session is closing or closed and cannot accept listeners
    #[error("Session closed for station {0}")]
    SessionClosed(String),

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Audio sink failure
    #[error("Audio sink error: {0}")]
    Sink(String),

    /// Station directory has no match
    #[error("Station not found: {0}")]
    StationNotFound(String),

    /// Station directory failure
    #[error("Station directory error: {0}")]
    Directory(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a generic error from a string
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    pub fn stream_unavailable(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::StreamUnavailable {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// True for failures of the station's audio stream itself
    pub fn is_stream_error(&self) -> bool {
        matches!(
            self,
            Self::StreamUnavailable { .. }
                | Self::UpstreamStalled { .. }
                | Self::SessionClosed(_)
                | Self::Http(_)
                | Self::InvalidUrl(_)
        )
    }

    /// Text safe to show to a listener
    pub fn user_message(&self) -> String {
        match self {
            Self::StationNotFound(query) => format!("No station found for \"{}\".", query),
            e if e.is_stream_error() => STATION_UNPLAYABLE.to_string(),
            _ => "Something went wrong while playing this station.".to_string(),
        }
    }
}
