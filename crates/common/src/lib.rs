// ================
// common/src/lib.rs
// ================
//! Wire types shared between the livecast server and browser clients.
//!
//! The chat protocol is a single JSON object per text frame; the status
//! endpoint returns a [`StreamSnapshot`].

use serde::{Deserialize, Serialize};

/// A chat frame, inbound from a client and outbound to every room member.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Client-defined message kind
    pub code: i64,
    /// Message body
    pub text: String,
    /// Display time (`HH:MM`); stamped by the server when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl ChatMessage {
    /// True when the client sent no usable timestamp.
    pub fn needs_timestamp(&self) -> bool {
        self.timestamp.as_deref().map_or(true, str::is_empty)
    }
}

/// Point-in-time copy of a stream's state.
///
/// Field names are the ones browser clients already read.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct StreamSnapshot {
    pub name: String,
    pub is_live: bool,
    pub title: String,
    pub viewers: u32,
}
