// ==============
// crates/backend-lib/src/metrics.rs

//! Central place for metric keys
pub const WEBHOOK_CALLS: &str = "ingest.webhook.calls";
pub const PUBLISH_STARTED: &str = "stream.publish.started";
pub const PUBLISH_STOPPED: &str = "stream.publish.stopped";
pub const STREAM_VIEWERS: &str = "stream.viewers";
pub const REBUILD_COMPLETED: &str = "playlist.rebuild.completed";
pub const REBUILD_FAILED: &str = "playlist.rebuild.failed";
pub const REBUILD_SUPERSEDED: &str = "playlist.rebuild.superseded";
pub const HTTP_RATE_LIMITED: &str = "http.rate_limited";
pub const CHAT_ACTIVE: &str = "chat.connections.active";
pub const CHAT_BROADCAST: &str = "chat.messages.broadcast";
pub const CHAT_DROPPED: &str = "chat.messages.dropped";
pub const CHAT_EVICTED: &str = "chat.members.evicted";
pub const LIMITERS_EVICTED: &str = "rate_limit.entries.evicted";
