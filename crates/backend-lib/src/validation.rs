// ============================
// crates/backend-lib/src/validation.rs
// ============================
//! Validation of names supplied by the ingestion process and browsers.
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::AppError;

/// Stream and room names double as directory names.
static NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("static regex"));

/// Check a stream or room name.
pub fn validate_name(name: &str) -> Result<(), AppError> {
    if NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(AppError::InvalidInput(format!("invalid stream name: {name:?}")))
    }
}
