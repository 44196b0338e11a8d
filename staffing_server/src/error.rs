//! Engine error taxonomy and its HTTP rendering.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use diesel::result::DatabaseErrorKind;
use serde_json::json;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Gone: {0}")]
    Gone(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(diesel::result::Error),

    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Stable machine-readable kind for API consumers.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Unauthorized(_) => "unauthorized",
            EngineError::Forbidden(_) => "forbidden",
            EngineError::NotFound(_) => "not_found",
            EngineError::Gone(_) => "gone",
            EngineError::Conflict(_) => "conflict",
            EngineError::InvalidState(_) => "invalid_state",
            EngineError::Validation(_) => "validation",
            EngineError::Database(_) | EngineError::Pool(_) | EngineError::Internal(_) => {
                "internal"
            }
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            EngineError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            EngineError::Forbidden(_) => StatusCode::FORBIDDEN,
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::Gone(_) => StatusCode::GONE,
            EngineError::Conflict(_) => StatusCode::CONFLICT,
            EngineError::InvalidState(_) => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::Validation(_) => StatusCode::BAD_REQUEST,
            EngineError::Database(_) | EngineError::Pool(_) | EngineError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn is_internal(&self) -> bool {
        matches!(
            self,
            EngineError::Database(_) | EngineError::Pool(_) | EngineError::Internal(_)
        )
    }

    /// Message shown to the caller. Internal details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            EngineError::Unauthorized(m)
            | EngineError::Forbidden(m)
            | EngineError::NotFound(m)
            | EngineError::Gone(m)
            | EngineError::Conflict(m)
            | EngineError::InvalidState(m)
            | EngineError::Validation(m) => m.clone(),
            _ => "Internal server error".to_string(),
        }
    }
}

impl From<diesel::result::Error> for EngineError {
    fn from(err: diesel::result::Error) -> Self {
        match err {
            diesel::result::Error::NotFound => EngineError::NotFound("Record not found".into()),
            diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                EngineError::Conflict(format!("Duplicate record: {}", info.message()))
            }
            other => EngineError::Database(other),
        }
    }
}

impl From<diesel_async::pooled_connection::deadpool::PoolError> for EngineError {
    fn from(err: diesel_async::pooled_connection::deadpool::PoolError) -> Self {
        EngineError::Pool(err.to_string())
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        if self.is_internal() {
            tracing::error!(error = %self, "Unexpected engine failure");
        } else {
            tracing::debug!(kind = self.kind(), error = %self, "Request rejected");
        }

        let body = Json(json!({
            "error": self.kind(),
            "message": self.public_message(),
        }));
        (self.status_code(), body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diesel_not_found_maps_to_not_found() {
        let err: EngineError = diesel::result::Error::NotFound.into();
        assert_eq!(err.kind(), "not_found");
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_internal_errors_hide_details() {
        let err = EngineError::Internal("connection reset by peer".into());
        assert_eq!(err.public_message(), "Internal server error");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_domain_errors_keep_their_message() {
        let err = EngineError::InvalidState(
            "Cannot replace assignment with existing time entries".into(),
        );
        assert_eq!(
            err.public_message(),
            "Cannot replace assignment with existing time entries"
        );
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_gone_and_conflict_status_codes() {
        assert_eq!(
            EngineError::Gone("claimed".into()).status_code(),
            StatusCode::GONE
        );
        assert_eq!(
            EngineError::Conflict("dup".into()).status_code(),
            StatusCode::CONFLICT
        );
    }
}
