// ============================
// livecast-backend-lib/src/ws_router.rs
// ============================
//! Routers for the public and ingestion listeners, and the chat socket loop.
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, Query, State,
    },
    middleware,
    response::Response,
    routing::{get, post},
    Router,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::debug;

use crate::chat::FrameOutcome;
use crate::error::AppError;
use crate::handlers::{ingest, status};
use crate::handlers::status::RoomQuery;
use crate::middleware::{hls_headers, rate_limit};
use crate::AppState;

/// Browser-facing router: chat, live status and HLS files
pub fn create_router(state: Arc<AppState>) -> Router {
    let hls = Router::new()
        .fallback_service(ServeDir::new(&state.settings.hls_root))
        .layer(middleware::from_fn(hls_headers));

    Router::new()
        .route("/chat", get(chat_handler))
        .route("/isLive", get(status::is_live))
        .nest_service("/hls", hls)
        .layer(middleware::from_fn_with_state(Arc::clone(&state), rate_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Router for the RTMP ingester's webhooks
pub fn create_ingest_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/auth", post(ingest::auth))
        .route("/publish", post(ingest::publish))
        .route("/publish_done", post(ingest::publish_done))
        .route("/new_viewer", post(ingest::new_viewer))
        .route("/viewer_left", post(ingest::viewer_left))
        .layer(middleware::from_fn_with_state(Arc::clone(&state), rate_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Upgrade into a chat room. Unknown rooms are refused before the handshake.
pub async fn chat_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Query(query): Query<RoomQuery>,
) -> Result<Response, AppError> {
    state.chat.room(&query.room)?;
    Ok(ws.on_upgrade(move |socket| handle_connection(socket, state, query.room, peer)))
}

async fn handle_connection(socket: WebSocket, state: Arc<AppState>, room: String, peer: SocketAddr) {
    let (mut sink, mut stream) = socket.split();
    let id = peer.to_string();

    let (tx, mut rx) = mpsc::channel::<String>(state.chat.settings().outbound_buffer);
    let limiter = state.rate_limits.chat().limiter_for(&id);

    let session = match state.chat.join(&room, id, tx, limiter) {
        Ok(session) => session,
        Err(e) => {
            debug!(room = %room, peer = %peer, error = %e, "join refused after upgrade");
            return;
        },
    };

    // Drains this connection's channel. It ends on the first failed or stalled
    // write, or once the room evicts the member, and the connection goes with it.
    let write_timeout = state.chat.settings().write_timeout();
    let mut writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            match tokio::time::timeout(write_timeout, sink.send(Message::Text(frame.into()))).await {
                Ok(Ok(())) => {},
                Ok(Err(e)) => return Err(AppError::Transport(e.to_string())),
                Err(_) => return Err(AppError::Transport("socket write timed out".to_string())),
            }
        }
        Ok::<(), AppError>(())
    });

    loop {
        tokio::select! {
            finished = &mut writer => {
                if let Ok(Err(e)) = finished {
                    debug!(room = %room, peer = %peer, error = %e, "chat write failed");
                }
                break;
            },
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    if let FrameOutcome::Evicted = session.handle_frame(text.as_str()).await {
                        break;
                    }
                },
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {},
            },
        }
    }

    debug!(room = %room, peer = %peer, "chat connection closing");
    session.close();
    writer.abort();
}
