// crates/backend-lib/src/middleware/mod.rs

//! Middleware for the livecast routers.

pub mod hls;
pub mod rate_limit;

pub use hls::hls_headers;
pub use rate_limit::{client_identity, rate_limit};
