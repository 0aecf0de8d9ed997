//! # Error Handling and Response Types
//!
//! Every failure a request can hit is an [`AppError`]. Each variant maps to an
//! [`ErrorCode`], which fixes both the HTTP status and the machine-readable
//! code returned to the client.
//!
//! ## Error Response Format
//!
//! ```json
//! {
//!   "error": "Invalid platform bogus-arch",
//!   "code": "invalid_platform",
//!   "details": null,
//!   "timestamp": "2024-01-01T12:00:00Z"
//! }
//! ```
//!
//! ## Error Classifications
//!
//! - **Invalid platform / not found** (404)
//! - **Validation** (400): bad filenames, malformed multipart bodies
//! - **Conflict** (409): upload would overwrite an existing package
//! - **Mirror** (503): the object store rejected a change; the local mutation
//!   has already been rolled back when this is returned
//! - **Internal** (500): storage, indexing and template failures

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};

/// Standardized error response structure for consistent API error handling
#[derive(Serialize, Debug)]
pub struct ApiErrorResponse {
    pub error: String,
    pub code: String,
    pub details: Option<Value>,
    pub timestamp: String,
}

/// Error code classification for machine-readable error types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidPlatform,
    ValidationError,
    NotFound,
    Conflict,
    IndexError,
    MirrorError,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidPlatform => "invalid_platform",
            ErrorCode::ValidationError => "validation_error",
            ErrorCode::NotFound => "not_found",
            ErrorCode::Conflict => "conflict",
            ErrorCode::IndexError => "index_error",
            ErrorCode::MirrorError => "mirror_error",
            ErrorCode::InternalError => "internal_error",
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidPlatform | ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::ValidationError => StatusCode::BAD_REQUEST,
            ErrorCode::Conflict => StatusCode::CONFLICT,
            ErrorCode::MirrorError => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::IndexError | ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Remote operation that failed while mirroring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorOp {
    Upload,
    Delete,
}

impl MirrorOp {
    fn describe(self) -> &'static str {
        match self {
            MirrorOp::Upload => "upload to",
            MirrorOp::Delete => "delete from",
        }
    }
}

impl std::fmt::Display for MirrorOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.describe())
    }
}

/// Application-specific error types with error codes
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid platform {0}")]
    InvalidPlatform(String),

    #[error("Invalid filename: {0}")]
    InvalidFilename(String),

    #[error("{0} already exists")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Index generation failed: {0}")]
    IndexGeneration(String),

    #[error("Failed to {op} S3 bucket {bucket} with exception {source}")]
    Mirror {
        op: MirrorOp,
        bucket: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("Multipart form parsing error: {0}")]
    Multipart(#[from] axum::extract::multipart::MultipartError),

    #[error("Template rendering error: {0}")]
    Template(#[from] askama::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Get the appropriate error code for this error type
    pub fn error_code(&self) -> ErrorCode {
        match self {
            AppError::InvalidPlatform(_) => ErrorCode::InvalidPlatform,
            AppError::InvalidFilename(_) | AppError::BadRequest(_) | AppError::Multipart(_) => {
                ErrorCode::ValidationError
            }
            AppError::Conflict(_) => ErrorCode::Conflict,
            AppError::NotFound(_) => ErrorCode::NotFound,
            AppError::IndexGeneration(_) => ErrorCode::IndexError,
            AppError::Mirror { .. } => ErrorCode::MirrorError,
            AppError::Storage(_) | AppError::Template(_) | AppError::Internal(_) => {
                ErrorCode::InternalError
            }
        }
    }

    /// Get additional error details if available
    pub fn details(&self) -> Option<Value> {
        match self {
            AppError::Mirror { op, bucket, source } => Some(json!({
                "bucket": bucket,
                "operation": op.to_string(),
                "cause": format!("{source:#}"),
            })),
            AppError::Storage(e) => Some(json!({ "kind": format!("{:?}", e.kind()) })),
            _ => None,
        }
    }

    /// Create a standardized error response
    pub fn to_error_response(&self) -> ApiErrorResponse {
        ApiErrorResponse {
            error: self.to_string(),
            code: self.error_code().as_str().to_string(),
            details: self.details(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.error_code();
        let status = code.http_status();

        if status.is_server_error() {
            tracing::error!(error = %self, code = code.as_str(), "Request failed");
        } else {
            tracing::warn!(error = %self, code = code.as_str(), "Request rejected");
        }

        (status, axum::Json(self.to_error_response())).into_response()
    }
}

/// Convenient result type for application operations.
pub type AppResult<T> = Result<T, AppError>;
