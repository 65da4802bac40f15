// ============================
// livecast-backend-lib/src/config.rs
// ============================
//! Configuration management.
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Result};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::validation::validate_name;

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "livecast.toml";

/// Environment variable prefix; nested keys are split on `__`
pub const ENV_PREFIX: &str = "LIVECAST_";

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Browser-facing listener (chat, status, HLS)
    pub public_addr: SocketAddr,
    /// Listener for ingestion webhooks
    pub ingest_addr: SocketAddr,
    /// Log level
    pub log_level: String,
    /// Root holding one segment directory per stream
    pub hls_root: PathBuf,
    /// Source addresses allowed to start a publish
    pub allowed_ingest_addrs: Vec<String>,
    /// Rooms (and matching offline streams) created at startup
    pub rooms: Vec<RoomSeed>,
    /// Use `x-real-ip` as the client identity
    pub trust_proxy_headers: bool,
    pub rate_limit: RateLimitSettings,
    pub playlist: PlaylistSettings,
    pub chat: ChatSettings,
}

/// A room seeded at startup
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomSeed {
    pub name: String,
    pub title: String,
}

/// Token bucket parameters: one token every `period_ms`, at most `burst` stored.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LimiterSettings {
    pub period_ms: u64,
    pub burst: u32,
}

impl LimiterSettings {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

/// Rate limiting for both traffic classes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// General HTTP traffic, per client address
    pub http: LimiterSettings,
    /// Chat messages, per connection
    pub chat: LimiterSettings,
    /// Entries unused for this long are evicted
    pub idle_ttl_secs: u64,
    /// How often the eviction sweep runs
    pub sweep_interval_secs: u64,
}

/// Playlist rebuild parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaylistSettings {
    pub file_name: String,
    pub segment_extension: String,
    pub target_duration_secs: u32,
    /// Delay before rebuilding, lets the ingester finish its last writes
    pub grace_period_secs: u64,
}

/// Chat fan-out parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSettings {
    /// Upper bound on a single delivery to one member
    pub write_timeout_ms: u64,
    /// Frames buffered per connection before writes start timing out
    pub outbound_buffer: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            public_addr: SocketAddr::from(([0, 0, 0, 0], 8443)),
            ingest_addr: SocketAddr::from(([0, 0, 0, 0], 8081)),
            log_level: "info".to_string(),
            hls_root: PathBuf::from("/var/hls"),
            allowed_ingest_addrs: vec!["172.18.0.1".to_string()],
            rooms: vec![RoomSeed {
                name: "jolsho".to_string(),
                title: "Will be back tomorrow.".to_string(),
            }],
            trust_proxy_headers: false,
            rate_limit: RateLimitSettings::default(),
            playlist: PlaylistSettings::default(),
            chat: ChatSettings::default(),
        }
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            http: LimiterSettings { period_ms: 500, burst: 12 },
            chat: LimiterSettings { period_ms: 2000, burst: 5 },
            idle_ttl_secs: 10 * 60,
            sweep_interval_secs: 60,
        }
    }
}

impl Default for PlaylistSettings {
    fn default() -> Self {
        Self {
            file_name: "index.m3u8".to_string(),
            segment_extension: ".ts".to_string(),
            target_duration_secs: 10,
            grace_period_secs: 30,
        }
    }
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            write_timeout_ms: 2000,
            outbound_buffer: 32,
        }
    }
}

impl PlaylistSettings {
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }
}

impl ChatSettings {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

impl RateLimitSettings {
    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.idle_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Settings {
    /// Load from `livecast.toml` in the working directory plus the environment
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load from a specific file plus the environment; a missing file is not an error
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let settings: Settings = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<()> {
        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            bail!("invalid log level: {}", self.log_level);
        }
        for (class, limiter) in [("http", &self.rate_limit.http), ("chat", &self.rate_limit.chat)] {
            if limiter.burst == 0 || limiter.period_ms == 0 {
                bail!("rate_limit.{class} needs a non-zero period and burst");
            }
        }
        for seed in &self.rooms {
            if let Err(e) = validate_name(&seed.name) {
                bail!("rooms: {e}");
            }
        }
        if self.rate_limit.sweep_interval_secs == 0 {
            bail!("rate_limit.sweep_interval_secs must be non-zero");
        }
        if self.playlist.target_duration_secs == 0 {
            bail!("playlist.target_duration_secs must be non-zero");
        }
        let ext = &self.playlist.segment_extension;
        if ext.len() < 2 || !ext.starts_with('.') {
            bail!("playlist.segment_extension must look like \".ts\", got {ext:?}");
        }
        if self.playlist.file_name.is_empty() {
            bail!("playlist.file_name must not be empty");
        }
        if self.chat.outbound_buffer == 0 {
            bail!("chat.outbound_buffer must be non-zero");
        }
        Ok(())
    }
}
