// ============================
// livecast-backend-lib/src/lib.rs
// ============================
//! Core of the livecast server: ingestion lifecycle, playlist rebuilds,
//! per-room chat and rate limiting.

pub mod chat;
pub mod config;
pub mod error;
pub mod handlers;
pub mod lifecycle;
pub mod metrics;
pub mod middleware;
pub mod playlist;
pub mod rate_limit;
pub mod storage;
pub mod streams;
pub mod validation;
pub mod ws_router;

use std::sync::Arc;

use crate::chat::ChatRooms;
use crate::config::Settings;
use crate::lifecycle::LifecycleCoordinator;
use crate::playlist::PlaylistRebuilder;
use crate::rate_limit::RateLimiterRegistry;
use crate::storage::{FlatFileStorage, Storage};
use crate::streams::StreamRegistry;

/// Application state shared across all handlers.
///
/// Built once at startup and lives as long as the process.
#[derive(Clone)]
pub struct AppState {
    /// Settings the process was started with
    pub settings: Arc<Settings>,
    /// Segment directories
    pub storage: Arc<dyn Storage>,
    /// Stream records
    pub streams: Arc<StreamRegistry>,
    /// Ingestion webhooks
    pub lifecycle: Arc<LifecycleCoordinator>,
    /// Chat rooms
    pub chat: Arc<ChatRooms>,
    /// Both rate-limit classes
    pub rate_limits: Arc<RateLimiterRegistry>,
}

impl AppState {
    /// State backed by flat files under `settings.hls_root`
    pub fn new(settings: Settings) -> Self {
        let storage: Arc<dyn Storage> = Arc::new(FlatFileStorage::new(&settings.hls_root));
        Self::with_storage(settings, storage)
    }

    /// State over an arbitrary storage backend
    pub fn with_storage(settings: Settings, storage: Arc<dyn Storage>) -> Self {
        let streams = Arc::new(StreamRegistry::new());
        for seed in &settings.rooms {
            streams.seed(&seed.name, &seed.title);
        }

        let chat = Arc::new(ChatRooms::with_rooms(
            settings.chat.clone(),
            settings.rooms.iter().map(|seed| seed.name.clone()),
        ));

        let rebuilder = PlaylistRebuilder::new(Arc::clone(&storage), settings.playlist.clone());
        let lifecycle = Arc::new(LifecycleCoordinator::new(
            settings.allowed_ingest_addrs.iter().cloned(),
            Arc::clone(&storage),
            Arc::clone(&streams),
            rebuilder,
        ));

        let rate_limits = Arc::new(RateLimiterRegistry::new(&settings.rate_limit));

        Self {
            settings: Arc::new(settings),
            storage,
            streams,
            lifecycle,
            chat,
            rate_limits,
        }
    }
}
