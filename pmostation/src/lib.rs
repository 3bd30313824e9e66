//! # pmostation - shared internet radio sessions
//!
//! `pmostation` streams internet radio stations to many listeners over a
//! single upstream connection per station:
//!
//! - **Station sessions**: one HTTP upstream per station, ICY metadata
//!   spliced out of the audio, stall detection and reconnection
//! - **Session registry**: atomic get-or-create per station, automatic
//!   removal when the last listener leaves, zombie sweeping
//! - **Listener bindings**: ordered metadata events and a live audio
//!   resource per listener, detached on drop
//! - **Album art**: now-playing events enriched through the iTunes search API
//! - **Channel player**: glue playing a station into an `AudioSink` and
//!   relaying events to a `NowPlayingHandler`
//!
//! ## Quick Start
//!
//! ```no_run
//! use pmostation::{RadioConfig, SessionEvent, SessionRegistry, StationKey};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = SessionRegistry::with_http(&RadioConfig::default())?;
//!
//!     let url = "http://stream.srg-ssr.ch/m/rsj/mp3_128";
//!     let mut binding = registry.attach(StationKey::new(url), url).await?;
//!     let mut audio = binding.take_audio().expect("fresh binding");
//!
//!     tokio::spawn(async move {
//!         while let Some(chunk) = audio.recv().await {
//!             // feed a decoder
//!             let _ = chunk;
//!         }
//!     });
//!
//!     while let Some(event) = binding.next_event().await {
//!         if let SessionEvent::Metadata(metadata) = event {
//!             println!("Now playing: {}", metadata);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod audio;
pub mod binding;
pub mod config;
#[cfg(feature = "pmoconfig")]
pub mod config_ext;
pub mod covers;
pub mod error;
pub mod models;
pub mod player;
pub mod registry;
pub mod session;
pub mod traits;
pub mod upstream;

pub use audio::AudioResource;
pub use binding::ListenerBinding;
pub use config::{CoverConfig, RadioConfig, SessionConfig, UpstreamConfig};
#[cfg(feature = "pmoconfig")]
pub use config_ext::StationConfigExt;
pub use covers::ItunesCoverLookup;
pub use error::{Error, Result, STATION_UNPLAYABLE};
pub use models::{
    ActiveStation, CurrentlyPlaying, SessionEvent, SessionState, StationKey, StationRecord,
};
pub use player::ChannelPlayer;
pub use registry::SessionRegistry;
pub use session::{SessionContext, StationOrigin, StationSession};
pub use traits::{
    AudioSink, CoverArtLookup, NowPlayingHandler, StationDirectory, StreamConnector,
    VoiceTransport,
};
pub use upstream::{HttpConnector, IcyHeaders, UpstreamConnection};

pub use pmoicy::{MetadataEvent, NowPlaying};
