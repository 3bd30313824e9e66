//! Extension pour intégrer les sessions radio dans pmoconfig
//!
//! Ce module fournit le trait `StationConfigExt` qui ajoute à
//! `pmoconfig::Config` les accesseurs des clés `radio.*`.
//!
//! # Exemple
//!
//! ```rust,ignore
//! use pmoconfig::get_config;
//! use pmostation::{RadioConfig, StationConfigExt};
//!
//! let config = get_config();
//! let attempts = config.get_radio_reconnect_attempts()?;
//! let settings = RadioConfig::from_config(&config);
//! ```

use crate::config::*;
use anyhow::Result;
use pmoconfig::Config;
use serde_yaml::{Number, Value};
use std::time::Duration;

const UPSTREAM: &[&str] = &["radio", "upstream"];
const SESSION: &[&str] = &["radio", "session"];
const COVERS: &[&str] = &["radio", "covers"];

fn key<'a>(section: &[&'a str], name: &'a str) -> Vec<&'a str> {
    let mut path = section.to_vec();
    path.push(name);
    path
}

/// Lit un entier positif, accepte aussi une chaîne numérique (variables d'environnement).
fn read_u64(config: &Config, path: &[&str], default: u64) -> Result<u64> {
    match config.get_value(path) {
        Ok(Value::Number(n)) => Ok(n.as_u64().unwrap_or(default)),
        Ok(Value::String(s)) => Ok(s.trim().parse().unwrap_or(default)),
        _ => Ok(default),
    }
}

fn read_bool(config: &Config, path: &[&str], default: bool) -> Result<bool> {
    match config.get_value(path) {
        Ok(Value::Bool(b)) => Ok(b),
        Ok(Value::String(s)) => Ok(s.trim().parse().unwrap_or(default)),
        _ => Ok(default),
    }
}

fn write_u64(config: &Config, path: &[&str], value: u64) -> Result<()> {
    config.set_value(path, Value::Number(Number::from(value)))
}

/// Trait d'extension pour gérer la configuration radio dans pmoconfig
///
/// Chaque getter retourne la valeur par défaut quand la clé est absente
/// ou mal typée.
pub trait StationConfigExt {
    /// User-Agent envoyé aux serveurs de flux (default: `pmoradiyo/0.1`)
    fn get_radio_user_agent(&self) -> Result<String>;

    /// Délai de connexion en secondes (default: 10)
    fn get_radio_connect_timeout_secs(&self) -> Result<u64>;

    /// Accepte les certificats TLS invalides (default: true)
    fn get_radio_accept_invalid_certs(&self) -> Result<bool>;

    /// Silence maximal avant reconnexion, en secondes (default: 15)
    fn get_radio_stall_timeout_secs(&self) -> Result<u64>;

    /// Définit le délai de blocage
    fn set_radio_stall_timeout_secs(&self, secs: u64) -> Result<()>;

    /// Nombre de tentatives de reconnexion (default: 3)
    fn get_radio_reconnect_attempts(&self) -> Result<u32>;

    /// Définit le nombre de tentatives de reconnexion
    fn set_radio_reconnect_attempts(&self, attempts: u32) -> Result<()>;

    /// Délai initial de reconnexion en millisecondes (default: 1000)
    fn get_radio_reconnect_backoff_ms(&self) -> Result<u64>;

    /// Délai maximal de reconnexion en millisecondes (default: 30000)
    fn get_radio_reconnect_backoff_max_ms(&self) -> Result<u64>;

    /// Capacité du tampon audio en chunks (default: 256)
    fn get_radio_audio_buffer_chunks(&self) -> Result<usize>;

    /// Période du balayage des sessions zombies en secondes (default: 60)
    fn get_radio_zombie_sweep_secs(&self) -> Result<u64>;

    /// Âge minimal d'une session zombie en secondes (default: 30)
    fn get_radio_zombie_grace_secs(&self) -> Result<u64>;

    /// Active la recherche de pochettes (default: true)
    fn get_radio_covers_enabled(&self) -> Result<bool>;

    /// Active ou désactive la recherche de pochettes
    fn set_radio_covers_enabled(&self, enabled: bool) -> Result<()>;

    /// URL de recherche iTunes (default: `https://itunes.apple.com/search`)
    fn get_radio_covers_search_url(&self) -> Result<String>;
}

impl StationConfigExt for Config {
    fn get_radio_user_agent(&self) -> Result<String> {
        Ok(self.get_string_or(&key(UPSTREAM, "user_agent"), DEFAULT_USER_AGENT))
    }

    fn get_radio_connect_timeout_secs(&self) -> Result<u64> {
        read_u64(
            self,
            &key(UPSTREAM, "connect_timeout_secs"),
            DEFAULT_CONNECT_TIMEOUT_SECS,
        )
    }

    fn get_radio_accept_invalid_certs(&self) -> Result<bool> {
        read_bool(self, &key(UPSTREAM, "accept_invalid_certs"), true)
    }

    fn get_radio_stall_timeout_secs(&self) -> Result<u64> {
        read_u64(
            self,
            &key(SESSION, "stall_timeout_secs"),
            DEFAULT_STALL_TIMEOUT_SECS,
        )
    }

    fn set_radio_stall_timeout_secs(&self, secs: u64) -> Result<()> {
        write_u64(self, &key(SESSION, "stall_timeout_secs"), secs)
    }

    fn get_radio_reconnect_attempts(&self) -> Result<u32> {
        let attempts = read_u64(
            self,
            &key(SESSION, "reconnect_attempts"),
            DEFAULT_RECONNECT_ATTEMPTS as u64,
        )?;
        Ok(u32::try_from(attempts).unwrap_or(DEFAULT_RECONNECT_ATTEMPTS))
    }

    fn set_radio_reconnect_attempts(&self, attempts: u32) -> Result<()> {
        write_u64(self, &key(SESSION, "reconnect_attempts"), attempts as u64)
    }

    fn get_radio_reconnect_backoff_ms(&self) -> Result<u64> {
        read_u64(
            self,
            &key(SESSION, "reconnect_backoff_ms"),
            DEFAULT_RECONNECT_BACKOFF_MS,
        )
    }

    fn get_radio_reconnect_backoff_max_ms(&self) -> Result<u64> {
        read_u64(
            self,
            &key(SESSION, "reconnect_backoff_max_ms"),
            DEFAULT_RECONNECT_BACKOFF_MAX_MS,
        )
    }

    fn get_radio_audio_buffer_chunks(&self) -> Result<usize> {
        let chunks = read_u64(
            self,
            &key(SESSION, "audio_buffer_chunks"),
            DEFAULT_AUDIO_BUFFER_CHUNKS as u64,
        )?;
        // broadcast::channel refuse une capacité nulle
        Ok((chunks as usize).max(1))
    }

    fn get_radio_zombie_sweep_secs(&self) -> Result<u64> {
        read_u64(
            self,
            &key(SESSION, "zombie_sweep_secs"),
            DEFAULT_ZOMBIE_SWEEP_SECS,
        )
    }

    fn get_radio_zombie_grace_secs(&self) -> Result<u64> {
        read_u64(
            self,
            &key(SESSION, "zombie_grace_secs"),
            DEFAULT_ZOMBIE_GRACE_SECS,
        )
    }

    fn get_radio_covers_enabled(&self) -> Result<bool> {
        read_bool(self, &key(COVERS, "enabled"), true)
    }

    fn set_radio_covers_enabled(&self, enabled: bool) -> Result<()> {
        self.set_value(&key(COVERS, "enabled"), Value::Bool(enabled))
    }

    fn get_radio_covers_search_url(&self) -> Result<String> {
        Ok(self.get_string_or(&key(COVERS, "search_url"), DEFAULT_COVER_SEARCH_URL))
    }
}

impl UpstreamConfig {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        Ok(Self {
            user_agent: cfg.get_radio_user_agent()?,
            connect_timeout: Duration::from_secs(cfg.get_radio_connect_timeout_secs()?),
            accept_invalid_certs: cfg.get_radio_accept_invalid_certs()?,
        })
    }
}

impl SessionConfig {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let backoff = Duration::from_millis(cfg.get_radio_reconnect_backoff_ms()?);
        Ok(Self {
            stall_timeout: Duration::from_secs(cfg.get_radio_stall_timeout_secs()?.max(1)),
            reconnect_attempts: cfg.get_radio_reconnect_attempts()?,
            reconnect_backoff: backoff,
            reconnect_backoff_max: Duration::from_millis(cfg.get_radio_reconnect_backoff_max_ms()?)
                .max(backoff),
            audio_buffer_chunks: cfg.get_radio_audio_buffer_chunks()?,
            zombie_grace: Duration::from_secs(cfg.get_radio_zombie_grace_secs()?),
        })
    }
}

impl CoverConfig {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        Ok(Self {
            enabled: cfg.get_radio_covers_enabled()?,
            search_url: cfg.get_radio_covers_search_url()?,
        })
    }
}

impl RadioConfig {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        Ok(Self {
            upstream: UpstreamConfig::from_config(cfg)?,
            session: SessionConfig::from_config(cfg)?,
            covers: CoverConfig::from_config(cfg)?,
            zombie_sweep_interval: Duration::from_secs(cfg.get_radio_zombie_sweep_secs()?.max(1)),
        })
    }
}
