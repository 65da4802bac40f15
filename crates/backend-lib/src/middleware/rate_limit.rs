use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use metrics::counter;
use tracing::warn;

use crate::metrics::HTTP_RATE_LIMITED;
use crate::rate_limit::TrafficClass;
use crate::{error::AppError, AppState};

/// Header set by a fronting proxy
pub const REAL_IP_HEADER: &str = "x-real-ip";

/// Rate limiter middleware for the general HTTP class
pub async fn rate_limit(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let client = client_identity(&request, state.settings.trust_proxy_headers);

    if let Err(e) = state.rate_limits.check(TrafficClass::Http, &client) {
        warn!(client = %client, path = %request.uri().path(), "rate limit exceeded");
        counter!(HTTP_RATE_LIMITED).increment(1);
        return Err(e);
    }

    Ok(next.run(request).await)
}

/// Client address used as the limiter key
pub fn client_identity<B>(request: &axum::http::Request<B>, trust_proxy_headers: bool) -> String {
    if trust_proxy_headers {
        if let Some(ip) = request
            .headers()
            .get(REAL_IP_HEADER)
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
        {
            return ip.to_string();
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
