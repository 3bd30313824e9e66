//! Typed settings for the upstream connector, sessions and cover lookup

use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str = "pmoradiyo/0.1";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_STALL_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 3;
pub const DEFAULT_RECONNECT_BACKOFF_MS: u64 = 1000;
pub const DEFAULT_RECONNECT_BACKOFF_MAX_MS: u64 = 30_000;
pub const DEFAULT_AUDIO_BUFFER_CHUNKS: usize = 256;
pub const DEFAULT_ZOMBIE_SWEEP_SECS: u64 = 60;
pub const DEFAULT_ZOMBIE_GRACE_SECS: u64 = 30;
pub const DEFAULT_COVER_SEARCH_URL: &str = "https://itunes.apple.com/search";

/// HTTP settings used to open station streams
#[derive(Clone, Debug)]
pub struct UpstreamConfig {
    pub user_agent: String,
    pub connect_timeout: Duration,
    /// Many stations serve https with broken certificate chains
    pub accept_invalid_certs: bool,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            accept_invalid_certs: true,
        }
    }
}

/// Configuration d'une session de station.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Silence upstream au-delà duquel la connexion est considérée bloquée.
    pub stall_timeout: Duration,
    /// Nombre de tentatives de reconnexion après un blocage.
    pub reconnect_attempts: u32,
    /// Délai initial entre deux tentatives (doublé à chaque échec).
    pub reconnect_backoff: Duration,
    pub reconnect_backoff_max: Duration,
    /// Capacité du broadcast audio, en chunks.
    pub audio_buffer_chunks: usize,
    /// Âge minimal avant qu'une session sans auditeur soit récupérée.
    pub zombie_grace: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            stall_timeout: Duration::from_secs(DEFAULT_STALL_TIMEOUT_SECS),
            reconnect_attempts: DEFAULT_RECONNECT_ATTEMPTS,
            reconnect_backoff: Duration::from_millis(DEFAULT_RECONNECT_BACKOFF_MS),
            reconnect_backoff_max: Duration::from_millis(DEFAULT_RECONNECT_BACKOFF_MAX_MS),
            audio_buffer_chunks: DEFAULT_AUDIO_BUFFER_CHUNKS,
            zombie_grace: Duration::from_secs(DEFAULT_ZOMBIE_GRACE_SECS),
        }
    }
}

/// Album art lookup settings
#[derive(Clone, Debug)]
pub struct CoverConfig {
    pub enabled: bool,
    pub search_url: String,
}

impl Default for CoverConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            search_url: DEFAULT_COVER_SEARCH_URL.to_string(),
        }
    }
}

/// Everything a registry needs, grouped
#[derive(Clone, Debug)]
pub struct RadioConfig {
    pub upstream: UpstreamConfig,
    pub session: SessionConfig,
    pub covers: CoverConfig,
    pub zombie_sweep_interval: Duration,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            upstream: UpstreamConfig::default(),
            session: SessionConfig::default(),
            covers: CoverConfig::default(),
            zombie_sweep_interval: Duration::from_secs(DEFAULT_ZOMBIE_SWEEP_SECS),
        }
    }
}
