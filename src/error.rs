//! Error types for the OpenViking server

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::types::{ApiResponse, ErrorInfo};

/// Machine-readable error codes carried in the `error.code` field
pub mod codes {
    pub const INVALID_ARGUMENT: &str = "INVALID_ARGUMENT";
    pub const INVALID_URI: &str = "INVALID_URI";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const ALREADY_EXISTS: &str = "ALREADY_EXISTS";
    pub const UNAUTHENTICATED: &str = "UNAUTHENTICATED";
    pub const PERMISSION_DENIED: &str = "PERMISSION_DENIED";
    pub const FAILED_PRECONDITION: &str = "FAILED_PRECONDITION";
    pub const INTERNAL: &str = "INTERNAL";
}

/// Map an error code to its HTTP status. Unknown codes are server errors.
pub fn status_for_code(code: &str) -> StatusCode {
    match code {
        codes::INVALID_ARGUMENT | codes::INVALID_URI => StatusCode::BAD_REQUEST,
        codes::NOT_FOUND => StatusCode::NOT_FOUND,
        codes::ALREADY_EXISTS => StatusCode::CONFLICT,
        codes::UNAUTHENTICATED => StatusCode::UNAUTHORIZED,
        codes::PERMISSION_DENIED => StatusCode::FORBIDDEN,
        codes::FAILED_PRECONDITION => StatusCode::PRECONDITION_FAILED,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),

    #[error("{0}")]
    Unauthenticated(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("{0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotFound(_) => codes::NOT_FOUND,
            Error::AlreadyExists(_) => codes::ALREADY_EXISTS,
            Error::InvalidArgument(_) => codes::INVALID_ARGUMENT,
            Error::InvalidUri(_) => codes::INVALID_URI,
            Error::FailedPrecondition(_) => codes::FAILED_PRECONDITION,
            Error::Unauthenticated(_) => codes::UNAUTHENTICATED,
            Error::Config(_)
            | Error::Io(_)
            | Error::Json(_)
            | Error::Toml(_)
            | Error::Internal(_) => codes::INTERNAL,
        }
    }

    pub fn status(&self) -> StatusCode {
        status_for_code(self.code())
    }
}

/// Build a JSON error response with the status derived from `code`
pub fn error_response(code: &str, message: impl Into<String>) -> Response {
    let body = ApiResponse::<()>::error(ErrorInfo::new(code, message));
    (status_for_code(code), Json(body)).into_response()
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let code = self.code();
        if code == codes::INTERNAL {
            tracing::error!("Internal error: {}", self);
        }
        error_response(code, self.to_string())
    }
}

impl From<axum::extract::rejection::JsonRejection> for Error {
    fn from(err: axum::extract::rejection::JsonRejection) -> Self {
        Error::InvalidArgument(err.body_text())
    }
}

impl From<axum::extract::rejection::QueryRejection> for Error {
    fn from(err: axum::extract::rejection::QueryRejection) -> Self {
        Error::InvalidArgument(err.body_text())
    }
}

impl From<axum::extract::rejection::PathRejection> for Error {
    fn from(err: axum::extract::rejection::PathRejection) -> Self {
        Error::InvalidArgument(err.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_codes_map_to_status() {
        assert_eq!(status_for_code(codes::INVALID_ARGUMENT), StatusCode::BAD_REQUEST);
        assert_eq!(status_for_code(codes::INVALID_URI), StatusCode::BAD_REQUEST);
        assert_eq!(status_for_code(codes::NOT_FOUND), StatusCode::NOT_FOUND);
        assert_eq!(status_for_code(codes::ALREADY_EXISTS), StatusCode::CONFLICT);
        assert_eq!(status_for_code(codes::UNAUTHENTICATED), StatusCode::UNAUTHORIZED);
        assert_eq!(status_for_code(codes::PERMISSION_DENIED), StatusCode::FORBIDDEN);
        assert_eq!(
            status_for_code(codes::FAILED_PRECONDITION),
            StatusCode::PRECONDITION_FAILED
        );
        assert_eq!(status_for_code(codes::INTERNAL), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_unknown_code_is_server_error() {
        assert_eq!(status_for_code("SOMETHING_ELSE"), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_error_variant_codes() {
        assert_eq!(Error::NotFound("x".into()).code(), codes::NOT_FOUND);
        assert_eq!(Error::Config("x".into()).code(), codes::INTERNAL);
        assert_eq!(
            Error::Unauthenticated("x".into()).status(),
            StatusCode::UNAUTHORIZED
        );
    }
}
