//! Read-only Docker Registry HTTP API V2 endpoints.

use crate::digest::manifest_digest;
use crate::error::{ApiError, RegistryError, API_VERSION, API_VERSION_HEADER};
use crate::reference::{is_digest, Reference};
use crate::server::AppState;
use crate::transfer::{TrackedBody, TransferOutcome};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Json, Response},
};
use futures_util::{stream, StreamExt};
use serde::Serialize;
use std::io;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn, Instrument};

const MANIFEST_V1_PRETTYJWS: &str = "application/vnd.docker.distribution.manifest.v1+prettyjws";

#[derive(Serialize)]
pub(crate) struct Pong {
    ping: &'static str,
}

/// `GET /ping`
pub(crate) async fn ping() -> Json<Pong> {
    Json(Pong { ping: "pong" })
}

/// `GET /v2/`: tells clients this server speaks the V2 API.
pub(crate) async fn api_version() -> impl IntoResponse {
    (
        StatusCode::OK,
        [
            (API_VERSION_HEADER, API_VERSION),
            ("content-type", "text/plain"),
        ],
        "",
    )
}

/// `GET /v2/{repo}/manifests/{reference}`
///
/// `reference` is treated as a digest if it looks like one, as a tag
/// otherwise. The store only serves tags.
pub(crate) async fn get_manifest(
    State(state): State<AppState>,
    Path((repo, reference)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let rar = if is_digest(&reference) {
        Reference::from_digest(&repo, &reference)
    } else {
        Reference::from_tag(&repo, &reference)
    }
    .map_err(ApiError::Request)?;
    info!("Getting manifest: {}", rar);

    let manifest = state
        .store
        .get_manifest(&rar)
        .await
        .map_err(|err| ApiError::from_store("error getting manifest", err))?;

    let Some(manifest) = manifest else {
        return Err(ApiError::ManifestUnknown(rar));
    };

    let digest = manifest_digest(&manifest);
    debug!("Manifest {} has digest {}", rar, digest);

    Ok((
        StatusCode::OK,
        [
            (API_VERSION_HEADER, API_VERSION),
            ("content-type", MANIFEST_V1_PRETTYJWS),
            ("docker-content-digest", digest.as_str()),
        ],
        manifest,
    )
        .into_response())
}

/// `GET /v2/{repo}/blobs/{digest}`
///
/// The blob is streamed, never buffered whole. The first chunk is read before
/// the status line is committed, so a blob that is missing or unreadable
/// still gets a clean 404 or 500. A failure after that can only abort the
/// connection.
///
/// `HEAD` takes the same path; the router drops the body, so no transfer is
/// reported.
pub(crate) async fn get_blob(
    State(state): State<AppState>,
    method: Method,
    Path((repo, digest)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let rar = Reference::from_digest(&repo, &digest).map_err(ApiError::Request)?;
    info!("Getting blob: {}", rar);

    let mut blob = state
        .store
        .open_blob_stream(&rar)
        .map_err(|err| ApiError::from_store("error getting blob", err))?;

    let first = match blob.next().await {
        None => None,
        Some(Ok(chunk)) => Some(chunk),
        Some(Err(err)) if err.kind() == io::ErrorKind::NotFound => {
            return Err(ApiError::BlobUnknown(rar));
        }
        Some(Err(source)) => {
            return Err(ApiError::Database {
                context: "error getting blob",
                source: RegistryError::Storage {
                    op: "read blob",
                    reference: rar.to_string(),
                    source,
                },
            });
        }
    };

    let source = stream::iter(first.map(Ok::<_, io::Error>))
        .chain(blob)
        .boxed();
    let (body, done) = TrackedBody::new(source);
    if method != Method::HEAD {
        tokio::spawn(report_transfer(rar, done).in_current_span());
    }

    Ok((
        StatusCode::OK,
        [
            (API_VERSION_HEADER, API_VERSION),
            ("content-type", "application/octet-stream"),
        ],
        Body::from_stream(body),
    )
        .into_response())
}

async fn report_transfer(rar: Reference, done: oneshot::Receiver<TransferOutcome>) {
    match done.await {
        Ok(TransferOutcome::Completed { bytes }) => {
            info!("Sent blob: {} ({} bytes)", rar, bytes);
        }
        Ok(TransferOutcome::NotFound) => {
            warn!("{} blob not found mid-transfer, connection aborted", rar);
        }
        Ok(TransferOutcome::Failed(err)) => {
            error!("error getting {} blob: {}", rar, err);
        }
        Ok(TransferOutcome::Aborted { bytes: 0 }) => {
            debug!("Blob transfer for {} dropped before any bytes were sent", rar);
        }
        Ok(TransferOutcome::Aborted { bytes }) => {
            warn!("Blob transfer aborted: {} after {} bytes", rar, bytes);
        }
        Err(_) => debug!("Blob transfer for {} ended without an outcome", rar),
    }
}
