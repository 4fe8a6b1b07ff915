use axum::{
    body::Body,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use std::{fmt, io, path::PathBuf};
use thiserror::Error;

use crate::handlers::xml;

/// Coarse classification of storage failures, used by the HTTP layer to pick
/// a status code and by callers deciding whether a retry makes sense.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad bucket name or object key. Retrying without changing input is pointless.
    Validation,
    /// Duplicate bucket or non-empty bucket delete.
    Conflict,
    NotFound,
    /// Filesystem failure, potentially transient.
    Io,
    /// A catalog file could not be parsed and needs repair.
    Parse,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("bucket name `{0}` is invalid")]
    InvalidBucketName(String),
    #[error("object key `{0}` is invalid")]
    InvalidObjectKey(String),
    #[error("bucket `{0}` already exists")]
    BucketAlreadyExists(String),
    #[error("bucket `{0}` is not empty")]
    BucketNotEmpty(String),
    #[error("bucket `{0}` not found")]
    BucketNotFound(String),
    #[error("object `{key}` not found in bucket `{bucket}`")]
    ObjectNotFound { bucket: String, key: String },
    #[error("catalog `{}` is corrupt: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

impl StorageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidBucketName(_) | Self::InvalidObjectKey(_) => ErrorKind::Validation,
            Self::BucketAlreadyExists(_) | Self::BucketNotEmpty(_) => ErrorKind::Conflict,
            Self::BucketNotFound(_) | Self::ObjectNotFound { .. } => ErrorKind::NotFound,
            Self::Parse { .. } => ErrorKind::Parse,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// Short machine-readable code rendered in error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidBucketName(_) => "InvalidBucketName",
            Self::InvalidObjectKey(_) => "InvalidObjectKey",
            Self::BucketAlreadyExists(_) => "BucketAlreadyExists",
            Self::BucketNotEmpty(_) => "BucketNotEmpty",
            Self::BucketNotFound(_) => "NoSuchBucket",
            Self::ObjectNotFound { .. } => "NoSuchKey",
            Self::Parse { .. } | Self::Io(_) => "InternalError",
        }
    }
}

/// A lightweight wrapper for errors surfaced over HTTP.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, code: &'static str, msg: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: msg.into(),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (body, content_type) = match xml::error(self.code, &self.message) {
            Ok(body) => (Body::from(body), "application/xml"),
            Err(_) => (Body::from(self.message), "text/plain; charset=utf-8"),
        };
        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        response
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        let status = match err.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Io | ErrorKind::Parse => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!("storage failure: {}", err);
        }
        AppError::new(status, err.code(), err.to_string())
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        StorageError::Io(err).into()
    }
}
