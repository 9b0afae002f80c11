//! Error types for the registry.

use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::reference::Reference;

/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Errors that can occur during registry operations.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A filesystem failure other than "not found", with the operation and
    /// reference it happened under.
    #[error("{op} failed for {reference}: {source}")]
    Storage {
        op: &'static str,
        reference: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid digest: {0}")]
    InvalidDigest(String),

    #[error("invalid repository name: {0}")]
    InvalidName(String),

    #[error("invalid tag: {0}")]
    InvalidTag(String),

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(&'static str),

    #[error("could not parse config {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl RegistryError {
    /// True for errors caused by what the client asked for rather than by the
    /// store itself.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            RegistryError::InvalidDigest(_)
                | RegistryError::InvalidName(_)
                | RegistryError::InvalidTag(_)
                | RegistryError::UnsupportedOperation(_)
        )
    }
}

/// Header every `/v2/` response carries.
pub const API_VERSION_HEADER: &str = "docker-distribution-api-version";
/// Value of [`API_VERSION_HEADER`].
pub const API_VERSION: &str = "registry/2.0";

/// Errors returned by the V2 endpoints, rendered in the registry's
/// `{"errors": [...]}` envelope.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("manifest unknown")]
    ManifestUnknown(Reference),

    #[error("blob not found: {0}")]
    BlobUnknown(Reference),

    /// The request itself was bad: malformed name, tag or digest, or an
    /// operation the store does not do.
    #[error(transparent)]
    Request(RegistryError),

    /// The store failed. Only `context` reaches the client.
    #[error("{context}")]
    Database {
        context: &'static str,
        #[source]
        source: RegistryError,
    },
}

impl ApiError {
    /// Wraps a store error, keeping client faults as 4xx.
    pub fn from_store(context: &'static str, source: RegistryError) -> Self {
        if source.is_client_error() {
            ApiError::Request(source)
        } else {
            ApiError::Database { context, source }
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::ManifestUnknown(_) | ApiError::BlobUnknown(_) => StatusCode::NOT_FOUND,
            ApiError::Request(_) => StatusCode::BAD_REQUEST,
            ApiError::Database { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::ManifestUnknown(_) => "MANIFEST_UNKNOWN",
            ApiError::BlobUnknown(_) => "BLOB_UNKNOWN",
            ApiError::Request(RegistryError::InvalidDigest(_)) => "DIGEST_INVALID",
            ApiError::Request(RegistryError::InvalidName(_)) => "NAME_INVALID",
            ApiError::Request(RegistryError::InvalidTag(_)) => "TAG_INVALID",
            ApiError::Request(RegistryError::UnsupportedOperation(_)) => "UNSUPPORTED",
            ApiError::Request(_) | ApiError::Database { .. } => "UNKNOWN",
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    errors: Vec<ErrorEntry>,
}

#[derive(Debug, Serialize)]
struct ErrorEntry {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<ManifestDetail>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ManifestDetail {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    revision: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();
        let headers = [(API_VERSION_HEADER, API_VERSION)];

        let entry = match self {
            // A missing blob answers with a bare 404.
            ApiError::BlobUnknown(rar) => {
                debug!("Blob not found: {}", rar);
                return (status, headers).into_response();
            }
            ApiError::ManifestUnknown(rar) => ErrorEntry {
                code,
                message: "manifest unknown".to_string(),
                detail: Some(ManifestDetail {
                    name: rar.remote_name,
                    tag: rar.tag,
                    revision: rar.digest,
                }),
            },
            ApiError::Database { context, source } => {
                error!("{}: {}", context, source);
                ErrorEntry {
                    code,
                    message: format!("database error: {}", context),
                    detail: None,
                }
            }
            ApiError::Request(err) => {
                warn!("Bad request: {}", err);
                ErrorEntry {
                    code,
                    message: err.to_string(),
                    detail: None,
                }
            }
        };

        let body = ErrorBody {
            errors: vec![entry],
        };
        (status, headers, Json(body)).into_response()
    }
}
