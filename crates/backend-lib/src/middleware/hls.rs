//! Response headers for HLS playlists and segments.
use axum::{
    extract::Request,
    http::{header, HeaderValue},
    middleware::Next,
    response::Response,
};

pub const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";
pub const SEGMENT_CONTENT_TYPE: &str = "video/mp2t";

/// Players must always refetch the playlist, from any origin.
pub async fn hls_headers(request: Request, next: Next) -> Response {
    let content_type = match request.uri().path().rsplit_once('.') {
        Some((_, "m3u8")) => Some(PLAYLIST_CONTENT_TYPE),
        Some((_, "ts")) => Some(SEGMENT_CONTENT_TYPE),
        _ => None,
    };

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    if response.status().is_success() {
        if let Some(content_type) = content_type {
            response
                .headers_mut()
                .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        }
    }
    response
}
