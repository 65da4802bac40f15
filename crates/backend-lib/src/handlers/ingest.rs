// ============================
// crates/backend-lib/src/handlers/ingest.rs
// ============================
//! Webhooks called by the RTMP ingester.
//!
//! The ingester posts form-encoded parameters and only looks at the status
//! code: anything but 2xx on `auth` refuses the publish.
use std::sync::Arc;

use axum::{extract::State, Form};
use metrics::counter;
use serde::Deserialize;
use tracing::debug;

use crate::error::AppError;
use crate::metrics::WEBHOOK_CALLS;
use crate::AppState;

/// Parameters sent with every callback; the ingester sends more, which are ignored.
#[derive(Debug, Default, Deserialize)]
pub struct HookForm {
    /// Stream key
    #[serde(default)]
    pub name: String,
    /// Address of the publishing client
    #[serde(default)]
    pub addr: String,
}

const OK: &str = "OK";

fn record(hook: &'static str, form: &HookForm) {
    counter!(WEBHOOK_CALLS, "hook" => hook).increment(1);
    debug!(hook, stream = %form.name, addr = %form.addr, "ingest callback");
}

/// `on_publish` authorization: 200 accepts, 401 unknown source, 500 storage failure
pub async fn auth(
    State(state): State<Arc<AppState>>,
    Form(form): Form<HookForm>,
) -> Result<&'static str, AppError> {
    record("auth", &form);
    state.lifecycle.authorize(&form.addr, &form.name).await?;
    Ok(OK)
}

pub async fn publish(State(state): State<Arc<AppState>>, Form(form): Form<HookForm>) -> &'static str {
    record("publish", &form);
    state.lifecycle.start_publish(&form.name);
    OK
}

pub async fn publish_done(
    State(state): State<Arc<AppState>>,
    Form(form): Form<HookForm>,
) -> &'static str {
    record("publish_done", &form);
    // the rebuild runs detached
    let _ = state.lifecycle.stop_publish(&form.name);
    OK
}

pub async fn new_viewer(
    State(state): State<Arc<AppState>>,
    Form(form): Form<HookForm>,
) -> &'static str {
    record("new_viewer", &form);
    state.lifecycle.viewer_joined(&form.name);
    OK
}

pub async fn viewer_left(
    State(state): State<Arc<AppState>>,
    Form(form): Form<HookForm>,
) -> &'static str {
    record("viewer_left", &form);
    state.lifecycle.viewer_left(&form.name);
    OK
}
