// ============================
// crates/backend-lib/src/handlers/mod.rs
// ============================
//! HTTP handlers: ingestion webhooks and the live-status query.

pub mod ingest;
pub mod status;
