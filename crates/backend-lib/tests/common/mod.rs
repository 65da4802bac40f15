//! Shared setup for the integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use backend_lib::{
    config::{LimiterSettings, Settings},
    ws_router, AppState,
};
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Source address allowed to publish in every test environment
pub const INGESTER: &str = "172.18.0.1";

/// Settings rooted in a fresh temporary directory.
///
/// Keep the returned `TempDir` alive for the length of the test.
pub fn test_settings() -> (Settings, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let mut settings = Settings::default();
    settings.hls_root = temp_dir.path().to_path_buf();
    settings.allowed_ingest_addrs = vec![INGESTER.to_string()];
    settings.playlist.grace_period_secs = 0;
    settings.chat.write_timeout_ms = 200;
    // generous enough that only the tests aimed at it hit the HTTP limiter
    settings.rate_limit.http = LimiterSettings {
        period_ms: 10,
        burst: 1_000,
    };
    (settings, temp_dir)
}

pub fn setup_test_env() -> (Arc<AppState>, TempDir) {
    let (settings, temp_dir) = test_settings();
    (Arc::new(AppState::new(settings)), temp_dir)
}

/// Serve the public router on an ephemeral port.
pub async fn spawn_public(state: Arc<AppState>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = ws_router::create_router(state);
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    addr
}
