use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use backend_lib::{
    config::{Settings, DEFAULT_CONFIG_FILE},
    metrics::LIMITERS_EVICTED,
    ws_router, AppState,
};
use clap::Parser;
use tokio::net::TcpListener;
#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Live-stream coordinator: ingest webhooks, HLS playlists and room chat
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Config file, merged over the defaults and under `LIVECAST_*` variables
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let settings = Settings::load_from(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let state = Arc::new(AppState::new(settings));
    spawn_limiter_sweep(Arc::clone(&state));

    let public = TcpListener::bind(state.settings.public_addr)
        .await
        .with_context(|| format!("binding {}", state.settings.public_addr))?;
    let ingest = TcpListener::bind(state.settings.ingest_addr)
        .await
        .with_context(|| format!("binding {}", state.settings.ingest_addr))?;
    info!(
        public = %state.settings.public_addr,
        ingest = %state.settings.ingest_addr,
        hls_root = %state.settings.hls_root.display(),
        "listening"
    );

    let public_app = ws_router::create_router(Arc::clone(&state))
        .into_make_service_with_connect_info::<SocketAddr>();
    let ingest_app = ws_router::create_ingest_router(Arc::clone(&state))
        .into_make_service_with_connect_info::<SocketAddr>();

    tokio::try_join!(
        async {
            axum::serve(public, public_app)
                .with_graceful_shutdown(shutdown_signal())
                .await
                .context("public listener")
        },
        async {
            axum::serve(ingest, ingest_app)
                .with_graceful_shutdown(shutdown_signal())
                .await
                .context("ingest listener")
        },
    )?;

    info!("shut down");
    Ok(())
}

/// Drop limiter entries for clients that went quiet
fn spawn_limiter_sweep(state: Arc<AppState>) {
    let ttl = state.settings.rate_limit.idle_ttl();
    let mut ticker = tokio::time::interval(state.settings.rate_limit.sweep_interval());
    tokio::spawn(async move {
        // first tick is immediate
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let evicted = state.rate_limits.evict_idle(ttl);
            if evicted > 0 {
                metrics::counter!(LIMITERS_EVICTED).increment(evicted as u64);
                info!(evicted, "idle rate limiters evicted");
            } else {
                debug!("no idle rate limiters");
            }
        }
    });
}

/// Resolves on ctrl-c or, on unix, SIGTERM.
///
/// The SIGTERM handler is installed when this is called, not on first poll.
fn shutdown_signal() -> impl Future<Output = ()> {
    #[cfg(unix)]
    let terminate = match signal(SignalKind::terminate()) {
        Ok(terminate) => Some(terminate),
        Err(e) => {
            warn!(error = %e, "could not install SIGTERM handler");
            None
        },
    };

    async move {
        #[cfg(unix)]
        let terminate = async move {
            match terminate {
                Some(mut terminate) => {
                    terminate.recv().await;
                },
                None => std::future::pending::<()>().await,
            }
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c() => info!("ctrl-c received, shutting down"),
            _ = terminate => info!("SIGTERM received, shutting down"),
        }
    }
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "could not listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
