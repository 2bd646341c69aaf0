//! Local object-storage endpoint.
//!
//! With the in-memory object store, presigned URLs point back at this
//! server. These handlers play the storage server's part for them: check
//! the signature, then move the bytes.

use axum::body::Bytes;
use axum::extract::{OriginalUri, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use strata_core::CoreError;
use strata_store::InMemoryObjectStore;
use tracing::debug;

use crate::error::ServerResult;
use crate::handler::AppState;

/// The store behind the endpoint, and the full URL the client was given.
fn resolve<'a>(
    state: &'a AppState,
    bucket: &str,
    uri: &OriginalUri,
) -> ServerResult<(&'a InMemoryObjectStore, String)> {
    let config = state.strata.config();
    let objects = match &state.local_storage {
        Some(objects) if bucket == config.bucket => objects.as_ref(),
        _ => return Err(CoreError::not_found(format!("bucket {bucket}")).into()),
    };
    let path = uri
        .0
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = format!("{}{path}", config.endpoint.trim_end_matches('/'));
    Ok((objects, url))
}

pub async fn download(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
    uri: OriginalUri,
) -> ServerResult<Response> {
    let (objects, url) = resolve(&state, &bucket, &uri)?;
    let data = objects.download(&url)?;
    debug!(bytes = data.len(), "served object");
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/octet-stream")],
        data,
    )
        .into_response())
}

pub async fn upload(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
    uri: OriginalUri,
    body: Bytes,
) -> ServerResult<Response> {
    let (objects, url) = resolve(&state, &bucket, &uri)?;
    let size = body.len();
    let etag = objects.accept_upload(&url, body)?;
    debug!(bytes = size, %etag, "accepted upload");
    Ok((StatusCode::OK, [(header::ETAG, etag)]).into_response())
}
