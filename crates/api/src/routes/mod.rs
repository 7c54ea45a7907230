//! HTTP route handlers.

pub mod health;
pub mod metrics;
pub mod operations;
pub mod stock;

use uuid::Uuid;

use crate::error::ApiError;

/// Parses a path or query identifier.
pub(crate) fn parse_id<T: From<Uuid>>(kind: &str, raw: &str) -> Result<T, ApiError> {
    let uuid = Uuid::parse_str(raw)
        .map_err(|e| ApiError::BadRequest(format!("Invalid {kind} id: {e}")))?;
    Ok(T::from(uuid))
}

/// Parses an optional identifier from a query string.
pub(crate) fn parse_optional_id<T: From<Uuid>>(
    kind: &str,
    raw: Option<&str>,
) -> Result<Option<T>, ApiError> {
    raw.map(|raw| parse_id(kind, raw)).transpose()
}
