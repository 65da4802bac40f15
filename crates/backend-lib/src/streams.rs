// ============================
// livecast-backend-lib/src/streams.rs
// ============================
//! Stream records and their live/offline lifecycle.
//!
//! The name → record map only takes its write lock to insert. Each record
//! has its own lock, so callbacks for different streams never contend and
//! callbacks for the same stream are serialized.
use std::sync::Arc;

use dashmap::DashMap;
use livecast_common::StreamSnapshot;
use parking_lot::Mutex;

/// Title given to a stream when a publish starts
pub const LIVE_TITLE: &str = "Live";

#[derive(Debug)]
struct StreamRecord {
    name: String,
    live: bool,
    title: String,
    viewers: u32,
    /// Bumped on every publish start; pending rebuilds compare against it
    publish_epoch: u64,
}

impl StreamRecord {
    fn snapshot(&self) -> StreamSnapshot {
        StreamSnapshot {
            name: self.name.clone(),
            is_live: self.live,
            title: self.title.clone(),
            viewers: self.viewers,
        }
    }
}

/// All streams known to the process. Records are never removed.
#[derive(Debug, Default)]
pub struct StreamRegistry {
    streams: DashMap<String, Arc<Mutex<StreamRecord>>>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, name: &str) -> Option<Arc<Mutex<StreamRecord>>> {
        self.streams.get(name).map(|entry| Arc::clone(entry.value()))
    }

    fn record_or_seed(&self, name: &str, title: &str) -> Arc<Mutex<StreamRecord>> {
        let entry = self.streams.entry(name.to_string()).or_insert_with(|| {
            Arc::new(Mutex::new(StreamRecord {
                name: name.to_string(),
                live: false,
                title: title.to_string(),
                viewers: 0,
                publish_epoch: 0,
            }))
        });
        Arc::clone(entry.value())
    }

    /// Register an offline stream if it does not exist yet
    pub fn seed(&self, name: &str, title: &str) {
        self.record_or_seed(name, title);
    }

    /// Mark `name` live with zero viewers, creating it if needed.
    ///
    /// Returns the new publish epoch.
    pub fn start_publish(&self, name: &str) -> u64 {
        let record = self.record_or_seed(name, LIVE_TITLE);
        let mut record = record.lock();
        record.live = true;
        record.title = LIVE_TITLE.to_string();
        record.viewers = 0;
        record.publish_epoch += 1;
        record.publish_epoch
    }

    /// Mark `name` offline. Returns the publish epoch, or `None` if unknown.
    pub fn stop_publish(&self, name: &str) -> Option<u64> {
        let record = self.record(name)?;
        let mut record = record.lock();
        record.live = false;
        Some(record.publish_epoch)
    }

    /// Returns the new viewer count, or `None` if unknown.
    pub fn viewer_joined(&self, name: &str) -> Option<u32> {
        let record = self.record(name)?;
        let mut record = record.lock();
        record.viewers = record.viewers.saturating_add(1);
        Some(record.viewers)
    }

    /// Returns the new viewer count, or `None` if unknown. Never goes below zero.
    pub fn viewer_left(&self, name: &str) -> Option<u32> {
        let record = self.record(name)?;
        let mut record = record.lock();
        record.viewers = record.viewers.saturating_sub(1);
        Some(record.viewers)
    }

    /// Consistent copy of the current state
    pub fn snapshot(&self, name: &str) -> Option<StreamSnapshot> {
        self.record(name).map(|record| record.lock().snapshot())
    }

    pub fn publish_epoch(&self, name: &str) -> Option<u64> {
        self.record(name).map(|record| record.lock().publish_epoch)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.streams.contains_key(name)
    }
}
