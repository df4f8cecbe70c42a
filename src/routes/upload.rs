use crate::encoding::Envelope;
use crate::error::{ServerError, ServerResult};
use crate::state::ServerState;
use crate::storage::UploadStore;
use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use std::sync::Arc;

pub const SAVED: &str = "Saved!";

/// Store an uploaded file (`POST /save/{id}`, `POST /upload/{id}`)
///
/// Takes the first multipart part whose name is one of the configured upload
/// fields and streams it to disk under a name derived from `id`. Other parts
/// are skipped. Nothing is left on disk unless the whole part was written.
///
/// # Errors
///
/// - 400 for an invalid `id`, a malformed body or no matching part
/// - 413 when the body exceeds the configured limit
/// - 503 when the file cannot be created, written or moved into place, or
///   when shutdown cuts the upload off
pub async fn save_upload(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> ServerResult<Envelope> {
    if !UploadStore::is_valid_id(&id) {
        return Err(ServerError::InvalidIdentifier);
    }

    let limit_mb = state.config.max_upload_mb;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit_mb))?
    {
        let accepted = field
            .name()
            .is_some_and(|name| state.config.upload_fields().any(|f| f == name));
        if !accepted {
            continue;
        }

        let mut pending = state
            .store
            .begin(&id)
            .await
            .map_err(|e| storage_error(&state, &id, e))?;

        loop {
            let chunk = tokio::select! {
                chunk = field.chunk() => chunk.map_err(|e| multipart_error(e, limit_mb))?,
                _ = state.shutdown.cancelled() => {
                    tracing::warn!(
                        id = %id,
                        bytes = pending.bytes_written(),
                        "Upload cancelled by shutdown, discarding partial file"
                    );
                    return Err(ServerError::ShuttingDown);
                }
            };
            let Some(chunk) = chunk else { break };

            pending
                .write(&chunk)
                .await
                .map_err(|e| storage_error(&state, &id, e))?;
        }

        let stored = pending
            .commit()
            .await
            .map_err(|e| storage_error(&state, &id, e))?;

        tracing::info!(
            id = %id,
            path = %stored.path.display(),
            bytes = stored.bytes,
            "Upload saved"
        );
        return Ok(Envelope::new(StatusCode::OK, SAVED));
    }

    Err(ServerError::MissingField)
}

fn multipart_error(err: MultipartError, limit_mb: usize) -> ServerError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServerError::PayloadTooLarge(limit_mb)
    } else {
        ServerError::Multipart(err.body_text())
    }
}

/// Disk failures are logged with the directory; the client only sees 503.
fn storage_error(state: &ServerState, id: &str, err: std::io::Error) -> ServerError {
    tracing::error!(
        id = %id,
        dir = %state.store.dir().display(),
        error = %err,
        "Failed to store upload"
    );
    ServerError::Storage(err)
}
