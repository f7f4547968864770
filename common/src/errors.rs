//! Error types shared by all components.
//!
//! The taxonomy is deliberately small: resolution failures collapse
//! every sub-cause into one message, schema failures cover missing
//! primary keys and columns, and statement failures cover everything
//! the database rejects at execution time.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::response::ApiResponse;

/// Result alias used throughout the workspace.
pub type AppResult<T> = Result<T, AppError>;

/// Application error taxonomy.
#[derive(Debug, Error)]
pub enum AppError {
    /// Handle resolution exhausted every provider.
    #[error("connection resolution failed: {0}")]
    ConnectionResolution(String),

    /// Schema introspection produced nothing usable
    /// (no primary key, no columns).
    #[error("schema introspection failed: {0}")]
    SchemaIntrospection(String),

    /// The database rejected a statement
    /// (constraint violation, malformed value).
    #[error("statement execution failed: {0}")]
    StatementExecution(String),

    /// Request or settings validation failed.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The requested table or record does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}

impl AppError {
    /// Stable error code for the response envelope.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::ConnectionResolution(_) => "CONNECTION_RESOLUTION_FAILED",
            AppError::SchemaIntrospection(_) => "SCHEMA_INTROSPECTION_FAILED",
            AppError::StatementExecution(_) => "STATEMENT_EXECUTION_FAILED",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::ConnectionResolution(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::SchemaIntrospection(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::StatementExecution(_) => StatusCode::BAD_REQUEST,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ApiResponse::err(self.code(), self.to_string());
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(
            AppError::ConnectionResolution("x".into()).code(),
            "CONNECTION_RESOLUTION_FAILED"
        );
        assert_eq!(AppError::NotFound("table t".into()).code(), "NOT_FOUND");
    }

    #[test]
    fn display_includes_cause() {
        let err = AppError::SchemaIntrospection("no primary key found".into());
        assert!(err.to_string().contains("no primary key found"));
    }
}
