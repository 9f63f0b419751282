//! Request handlers.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Multipart, Query, State};
use axum::http::StatusCode;
use resumable_protocol::{ChunkRef, ChunkUpload, Params};
use resumable_transfer::AssemblyOutcome;

use crate::error::ApiError;
use crate::state::AppState;

/// `GET`: has this chunk already been received?
///
/// 200 when the chunk is stored, 404 when it is not, 400 when the request
/// does not name a chunk.
pub async fn probe_chunk(
    State(state): State<AppState>,
    Query(params): Query<Params>,
) -> Result<StatusCode, ApiError> {
    let chunk = ChunkRef::from_params(&params)?;

    let coordinator = Arc::clone(&state.coordinator);
    let found = tokio::task::spawn_blocking(move || coordinator.probe(&chunk)).await??;

    Ok(if found {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    })
}

/// `POST`: store the file part(s) of a multipart chunk delivery.
///
/// Text fields are merged over the query string. A file part that cannot
/// be read is logged and skipped; the others are still stored.
pub async fn deliver_chunk(
    State(state): State<AppState>,
    Query(mut params): Query<Params>,
    mut multipart: Multipart,
) -> Result<StatusCode, ApiError> {
    let mut payloads: Vec<Bytes> = Vec::new();
    let mut too_large = false;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                too_large |= e.status() == StatusCode::PAYLOAD_TOO_LARGE;
                tracing::warn!("malformed multipart body: {e}");
                break;
            }
        };

        let name = field.name().unwrap_or_default().to_string();
        if field.file_name().is_some() {
            match field.bytes().await {
                Ok(bytes) => payloads.push(bytes),
                Err(e) => {
                    too_large |= e.status() == StatusCode::PAYLOAD_TOO_LARGE;
                    tracing::warn!(field = %name, "skipping unreadable file part: {e}");
                }
            }
        } else {
            match field.text().await {
                Ok(value) => {
                    params.insert(name, value);
                }
                Err(e) => tracing::warn!(field = %name, "skipping unreadable field: {e}"),
            }
        }
    }

    if payloads.is_empty() {
        return Err(if too_large {
            ApiError::PayloadTooLarge
        } else {
            ApiError::NoReadableParts
        });
    }

    let upload = ChunkUpload::from_params(&params)?;

    for payload in payloads {
        let coordinator = Arc::clone(&state.coordinator);
        let job = upload.clone();
        let outcome =
            tokio::task::spawn_blocking(move || coordinator.receive(&job, &payload)).await??;

        match outcome.assembly {
            AssemblyOutcome::Assembled { path, bytes } => tracing::info!(
                filename = upload.filename(),
                path = %path.display(),
                bytes,
                "upload complete"
            ),
            AssemblyOutcome::Pending { received, expected } => tracing::debug!(
                upload_id = %upload.upload_id(),
                index = upload.chunk.index,
                received,
                expected,
                "chunk received"
            ),
        }
    }

    Ok(StatusCode::OK)
}
