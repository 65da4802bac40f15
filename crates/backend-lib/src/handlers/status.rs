//! Live-status query for browser clients.
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;

use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct RoomQuery {
    #[serde(default)]
    pub room: String,
}

/// Current snapshot of the room's stream, or 204 when the room is unknown
pub async fn is_live(State(state): State<Arc<AppState>>, Query(query): Query<RoomQuery>) -> Response {
    match state.lifecycle.query_live_status(&query.room) {
        Some(snapshot) => Json(snapshot).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}
