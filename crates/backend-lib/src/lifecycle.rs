// ============================
// livecast-backend-lib/src/lifecycle.rs
// ============================
//! Ingestion lifecycle: source authorization, publish start/stop and
//! viewer accounting.
//!
//! Callbacks for names we have never seen are logged and ignored; the
//! ingester always gets a success response for them.
use std::collections::HashSet;
use std::sync::Arc;

use livecast_common::StreamSnapshot;
use metrics::{counter, gauge};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::AppError;
use crate::metrics::{PUBLISH_STARTED, PUBLISH_STOPPED, STREAM_VIEWERS};
use crate::playlist::{PlaylistRebuilder, RebuildOutcome};
use crate::storage::Storage;
use crate::streams::StreamRegistry;
use crate::validation::validate_name;

pub struct LifecycleCoordinator {
    allowed_sources: HashSet<String>,
    storage: Arc<dyn Storage>,
    streams: Arc<StreamRegistry>,
    rebuilder: PlaylistRebuilder,
}

impl LifecycleCoordinator {
    pub fn new<I>(
        allowed_sources: I,
        storage: Arc<dyn Storage>,
        streams: Arc<StreamRegistry>,
        rebuilder: PlaylistRebuilder,
    ) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            allowed_sources: allowed_sources.into_iter().collect(),
            storage,
            streams,
            rebuilder,
        }
    }

    pub fn streams(&self) -> &Arc<StreamRegistry> {
        &self.streams
    }

    /// Accept a publish attempt from `source_addr` and give `name` an empty
    /// segment directory.
    pub async fn authorize(&self, source_addr: &str, name: &str) -> Result<(), AppError> {
        if !self.allowed_sources.contains(source_addr.trim()) {
            warn!(addr = %source_addr, stream = %name, "publish from unknown source rejected");
            return Err(AppError::Unauthorized(source_addr.to_string()));
        }
        validate_name(name)?;

        self.storage.prepare_stream_dir(name).await.map_err(|e| {
            warn!(stream = %name, error = %e, "could not prepare segment directory");
            e
        })?;
        info!(addr = %source_addr, stream = %name, "publish authorized");
        Ok(())
    }

    /// Mark `name` live; re-publishing resets the previous state.
    pub fn start_publish(&self, name: &str) {
        if let Err(e) = validate_name(name) {
            warn!(error = %e, "publish ignored");
            return;
        }
        let epoch = self.streams.start_publish(name);
        counter!(PUBLISH_STARTED).increment(1);
        gauge!(STREAM_VIEWERS, "stream" => name.to_string()).set(0.0);
        info!(stream = %name, epoch, "stream is live");
    }

    /// Mark `name` offline and schedule one playlist rebuild.
    ///
    /// The returned handle may be dropped; the rebuild runs regardless.
    pub fn stop_publish(&self, name: &str) -> Option<JoinHandle<RebuildOutcome>> {
        let Some(epoch) = self.streams.stop_publish(name) else {
            warn!(stream = %name, "publish_done for unknown stream");
            return None;
        };
        counter!(PUBLISH_STOPPED).increment(1);
        info!(
            stream = %name,
            grace_secs = self.rebuilder.settings().grace_period_secs,
            "stream offline, playlist rebuild scheduled"
        );
        Some(
            self.rebuilder
                .schedule(name.to_string(), epoch, Arc::clone(&self.streams)),
        )
    }

    pub fn viewer_joined(&self, name: &str) -> Option<u32> {
        let count = self.streams.viewer_joined(name);
        self.record_viewers(name, count, "new_viewer");
        count
    }

    pub fn viewer_left(&self, name: &str) -> Option<u32> {
        let count = self.streams.viewer_left(name);
        self.record_viewers(name, count, "viewer_left");
        count
    }

    fn record_viewers(&self, name: &str, count: Option<u32>, hook: &'static str) {
        match count {
            Some(count) => {
                gauge!(STREAM_VIEWERS, "stream" => name.to_string()).set(f64::from(count));
            },
            None => warn!(stream = %name, hook, "viewer callback for unknown stream"),
        }
    }

    pub fn query_live_status(&self, name: &str) -> Option<StreamSnapshot> {
        self.streams.snapshot(name)
    }
}
