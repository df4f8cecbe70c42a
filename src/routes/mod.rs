//! API route handlers
//!
//! - `health`: the root acknowledgement endpoint
//! - `upload`: multipart file uploads persisted under the upload directory

pub mod health;
pub mod upload;

use crate::error::ServerError;

/// 404 Not Found handler
///
/// Only reachable with a valid API key; unauthenticated callers get 401 first.
pub async fn not_found() -> ServerError {
    ServerError::NotFound
}
