//! Error taxonomy shared by the encoding pipeline and its HTTP surface.

use crate::common::response::ApiError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum EncodingError {
    /// The request was rejected before any remote call was made.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Webhook signature did not match the raw request body.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The remote encoding provider rejected or failed a call.
    #[error("Provider error: {0}")]
    Provider(String),

    /// The write collides with a record that already exists.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T, E = EncodingError> = std::result::Result<T, E>;

impl EncodingError {
    pub fn not_found(entity: &'static str, id: impl fmt::Display) -> Self {
        EncodingError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            EncodingError::Validation(_) => StatusCode::BAD_REQUEST,
            EncodingError::NotFound { .. } => StatusCode::NOT_FOUND,
            EncodingError::Conflict(_) => StatusCode::CONFLICT,
            EncodingError::Authentication(_) => StatusCode::FORBIDDEN,
            EncodingError::Provider(_) => StatusCode::BAD_GATEWAY,
            EncodingError::Queue(_) => StatusCode::SERVICE_UNAVAILABLE,
            EncodingError::Database(_) | EncodingError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for EncodingError {
    fn from(e: sqlx::Error) -> Self {
        match e.as_database_error() {
            Some(db) if db.is_unique_violation() => EncodingError::Conflict(format!(
                "encoding already exists ({})",
                db.constraint().unwrap_or("unique key")
            )),
            _ => EncodingError::Database(e),
        }
    }
}

impl From<validator::ValidationErrors> for EncodingError {
    fn from(e: validator::ValidationErrors) -> Self {
        EncodingError::Validation(e.to_string())
    }
}

impl From<EncodingError> for ApiError {
    fn from(e: EncodingError) -> Self {
        let status = e.status_code();
        if status.is_server_error() {
            tracing::error!(status = %status, error = %e, "Encoding request failed");
        }
        let message = match e {
            // Driver text stays in the logs.
            EncodingError::Database(_) => "Database error".to_string(),
            other => other.to_string(),
        };
        ApiError(message, status)
    }
}

impl IntoResponse for EncodingError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_taxonomy_to_http_status() {
        assert_eq!(EncodingError::Validation("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(EncodingError::not_found("encoding", "abc").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(EncodingError::Authentication("x".into()).status_code(), StatusCode::FORBIDDEN);
        assert_eq!(EncodingError::Provider("x".into()).status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(EncodingError::Queue("x".into()).status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(EncodingError::Conflict("x".into()).status_code(), StatusCode::CONFLICT);
    }

    #[derive(Debug)]
    struct DuplicateKey;

    impl std::fmt::Display for DuplicateKey {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("duplicate key value violates unique constraint")
        }
    }

    impl std::error::Error for DuplicateKey {}

    impl sqlx::error::DatabaseError for DuplicateKey {
        fn message(&self) -> &str {
            "duplicate key value violates unique constraint"
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn constraint(&self) -> Option<&str> {
            Some("idx_encodings_foreign_id")
        }

        fn kind(&self) -> sqlx::error::ErrorKind {
            sqlx::error::ErrorKind::UniqueViolation
        }
    }

    #[test]
    fn unique_violation_is_a_conflict() {
        let err = EncodingError::from(sqlx::Error::Database(Box::new(DuplicateKey)));
        assert!(matches!(err, EncodingError::Conflict(_)));
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn database_error_text_is_not_sent_to_clients() {
        let ApiError(message, status) = ApiError::from(EncodingError::from(sqlx::Error::RowNotFound));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(message, "Database error");
    }

    #[test]
    fn not_found_message_names_entity_and_id() {
        let err = EncodingError::not_found("encoding", "42");
        assert_eq!(err.to_string(), "encoding not found: 42");
    }
}
