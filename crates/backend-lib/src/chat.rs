// ============================
// livecast-backend-lib/src/chat.rs
// ============================
//! Chat rooms and message fan-out.
//!
//! Locking: the registry lock guards only the name → room map. Each room
//! has its own membership lock, held just long enough to copy or edit the
//! member map and never across a send. Every member is reached through a
//! bounded channel drained by that connection's writer task, so a stalled
//! socket can hold up a broadcast for at most the configured write timeout.
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use governor::DefaultDirectRateLimiter;
use livecast_common::ChatMessage;
use metrics::{counter, gauge};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::ChatSettings;
use crate::error::AppError;
use crate::metrics::{CHAT_ACTIVE, CHAT_BROADCAST, CHAT_DROPPED, CHAT_EVICTED};

/// Remote address of a connection; not unique behind NAT
pub type ConnectionId = String;

/// Outbound half of a connection as seen by its room
pub type FrameSender = mpsc::Sender<String>;

#[derive(Debug, Clone)]
struct Member {
    /// Distinguishes reconnects that reuse the same address
    serial: u64,
    tx: FrameSender,
}

/// Result of one fan-out pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub evicted: usize,
}

/// A named set of live connections
#[derive(Debug)]
pub struct Room {
    name: String,
    members: Mutex<HashMap<ConnectionId, Member>>,
    write_timeout: Duration,
}

impl Room {
    fn new(name: String, write_timeout: Duration) -> Self {
        Self {
            name,
            members: Mutex::new(HashMap::new()),
            write_timeout,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.members.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.lock().is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.members.lock().contains_key(id)
    }

    fn insert(&self, id: ConnectionId, serial: u64, tx: FrameSender) {
        let count = {
            let mut members = self.members.lock();
            if members.insert(id.clone(), Member { serial, tx }).is_some() {
                warn!(room = %self.name, peer = %id, "connection replaced an existing member");
            }
            members.len()
        };
        gauge!(CHAT_ACTIVE, "room" => self.name.clone()).set(count as f64);
    }

    /// True while `id` is still registered as the connection numbered `serial`.
    pub fn is_member(&self, id: &str, serial: u64) -> bool {
        self.members
            .lock()
            .get(id)
            .is_some_and(|member| member.serial == serial)
    }

    /// Remove `id` if it is still the connection numbered `serial`.
    pub fn leave(&self, id: &str, serial: u64) -> bool {
        let (removed, count) = {
            let mut members = self.members.lock();
            let removed = match members.get(id) {
                Some(member) if member.serial == serial => members.remove(id).is_some(),
                _ => false,
            };
            (removed, members.len())
        };
        if removed {
            gauge!(CHAT_ACTIVE, "room" => self.name.clone()).set(count as f64);
        }
        removed
    }

    /// Send `msg` to every current member, the author included.
    ///
    /// Members whose delivery fails or times out are removed.
    pub async fn broadcast(&self, msg: &ChatMessage) -> Result<BroadcastReport, AppError> {
        let frame = serde_json::to_string(msg)?;

        let targets: Vec<(ConnectionId, Member)> = self
            .members
            .lock()
            .iter()
            .map(|(id, member)| (id.clone(), member.clone()))
            .collect();

        let write_timeout = self.write_timeout;
        let sends = targets.iter().map(|(_, member)| {
            let frame = frame.clone();
            async move {
                matches!(
                    tokio::time::timeout(write_timeout, member.tx.send(frame)).await,
                    Ok(Ok(()))
                )
            }
        });
        let results = join_all(sends).await;

        let failed: Vec<(&ConnectionId, u64)> = targets
            .iter()
            .zip(&results)
            .filter(|(_, ok)| !**ok)
            .map(|((id, member), _)| (id, member.serial))
            .collect();

        let mut report = BroadcastReport {
            delivered: results.len() - failed.len(),
            evicted: 0,
        };
        for (id, serial) in failed {
            if self.leave(id, serial) {
                debug!(room = %self.name, peer = %id, "removed member after failed write");
                report.evicted += 1;
            }
        }
        if report.evicted > 0 {
            counter!(CHAT_EVICTED).increment(report.evicted as u64);
        }
        counter!(CHAT_BROADCAST).increment(1);
        Ok(report)
    }
}

/// Every room known to the process
#[derive(Debug)]
pub struct ChatRooms {
    rooms: RwLock<HashMap<String, Arc<Room>>>,
    next_serial: AtomicU64,
    settings: ChatSettings,
}

impl ChatRooms {
    pub fn new(settings: ChatSettings) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            next_serial: AtomicU64::new(1),
            settings,
        }
    }

    /// Registry preloaded with `names`
    pub fn with_rooms<I, S>(settings: ChatSettings, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let rooms = Self::new(settings);
        for name in names {
            rooms.create_room(name);
        }
        rooms
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    /// Get or create the room called `name`
    pub fn create_room(&self, name: impl Into<String>) -> Arc<Room> {
        let name = name.into();
        let mut rooms = self.rooms.write();
        let room = rooms
            .entry(name.clone())
            .or_insert_with(|| Arc::new(Room::new(name, self.settings.write_timeout())));
        Arc::clone(room)
    }

    pub fn room(&self, name: &str) -> Result<Arc<Room>, AppError> {
        self.rooms
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| AppError::RoomNotFound(name.to_string()))
    }

    /// Register a connection in `room_name` and hand back its session.
    pub fn join(
        &self,
        room_name: &str,
        id: ConnectionId,
        tx: FrameSender,
        limiter: Arc<DefaultDirectRateLimiter>,
    ) -> Result<ChatSession, AppError> {
        let room = self.room(room_name)?;
        let serial = self.next_serial.fetch_add(1, Ordering::Relaxed);
        room.insert(id.clone(), serial, tx);
        info!(room = %room.name(), peer = %id, members = room.len(), "chat connection joined");
        Ok(ChatSession {
            room,
            id,
            serial,
            limiter,
        })
    }
}

/// Why an inbound frame was not broadcast
#[derive(Debug)]
pub enum DropReason {
    RateLimited,
    Malformed(AppError),
    /// The outbound frame could not be encoded
    Encode(AppError),
}

impl DropReason {
    /// Metric label
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::RateLimited => "rate_limited",
            DropReason::Malformed(_) => "malformed",
            DropReason::Encode(_) => "encode",
        }
    }
}

#[derive(Debug)]
pub enum FrameOutcome {
    Broadcast(BroadcastReport),
    Dropped(DropReason),
    /// A fan-out removed this connection; the caller must tear it down.
    Evicted,
}

/// Parse an inbound frame, stamping the display time when the client sent none.
pub fn prepare_message(raw: &str) -> Result<ChatMessage, AppError> {
    let mut msg: ChatMessage = serde_json::from_str(raw)?;
    if msg.needs_timestamp() {
        msg.timestamp = Some(chrono::Local::now().format("%H:%M").to_string());
    }
    Ok(msg)
}

/// One connection's membership in a room
pub struct ChatSession {
    room: Arc<Room>,
    id: ConnectionId,
    serial: u64,
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl ChatSession {
    /// Rate-limit, parse and fan out one inbound text frame.
    ///
    /// Nothing is reported back to the author; dropped frames are only logged.
    /// A session no longer in its room never reaches the other members.
    pub async fn handle_frame(&self, raw: &str) -> FrameOutcome {
        if !self.room.is_member(&self.id, self.serial) {
            debug!(room = %self.room.name(), peer = %self.id, "frame from evicted connection");
            return FrameOutcome::Evicted;
        }

        if self.limiter.check().is_err() {
            return self.dropped(DropReason::RateLimited);
        }

        let msg = match prepare_message(raw) {
            Ok(msg) => msg,
            Err(e) => return self.dropped(DropReason::Malformed(e)),
        };

        match self.room.broadcast(&msg).await {
            Ok(report) => FrameOutcome::Broadcast(report),
            Err(e) => self.dropped(DropReason::Encode(e)),
        }
    }

    fn dropped(&self, reason: DropReason) -> FrameOutcome {
        match &reason {
            DropReason::Malformed(e) | DropReason::Encode(e) => {
                debug!(room = %self.room.name(), peer = %self.id, reason = reason.as_str(), error = %e, "frame dropped");
            },
            DropReason::RateLimited => {
                debug!(room = %self.room.name(), peer = %self.id, "rate limit exceeded, frame dropped");
            },
        }
        counter!(CHAT_DROPPED, "reason" => reason.as_str()).increment(1);
        FrameOutcome::Dropped(reason)
    }

    /// Leave the room. Safe to call after a fan-out already removed us.
    pub fn close(self) {
        if self.room.leave(&self.id, self.serial) {
            info!(room = %self.room.name(), peer = %self.id, "chat connection left");
        }
    }
}
