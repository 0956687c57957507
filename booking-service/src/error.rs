use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use diesel::result::DatabaseErrorKind;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Business and storage failures surfaced by the service. Business
/// rejections map to 4xx and are never retried; only serialization
/// failures inside the transactional write paths are retried before
/// degrading to `Unavailable`.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    DuplicateValue(String),
    #[error("Room is already booked in the given date range")]
    DuplicateBooking,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Forbidden(String),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Database(#[from] diesel::result::Error),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::DuplicateValue(_) | ServiceError::DuplicateBooking => {
                StatusCode::CONFLICT
            }
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServiceError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Database(_) | ServiceError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "VALIDATION_ERROR",
            ServiceError::DuplicateValue(_) => "DUPLICATE_VALUE",
            ServiceError::DuplicateBooking => "DUPLICATE_BOOKING",
            ServiceError::NotFound(_) => "NOT_FOUND",
            ServiceError::Forbidden(_) => "FORBIDDEN",
            ServiceError::Unavailable(_) => "STORAGE_UNAVAILABLE",
            ServiceError::Database(_) | ServiceError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn is_serialization_failure(&self) -> bool {
        matches!(
            self,
            ServiceError::Database(diesel::result::Error::DatabaseError(
                DatabaseErrorKind::SerializationFailure,
                _,
            ))
        )
    }
}

pub fn is_foreign_key_violation(err: &diesel::result::Error) -> bool {
    matches!(
        err,
        diesel::result::Error::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _)
    )
}

pub fn is_unique_violation(err: &diesel::result::Error) -> bool {
    matches!(
        err,
        diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)
    )
}

impl From<bb8::RunError<diesel_async::pooled_connection::PoolError>> for ServiceError {
    fn from(err: bb8::RunError<diesel_async::pooled_connection::PoolError>) -> Self {
        ServiceError::Unavailable(err.to_string())
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if status.is_server_error() {
            error!(code = self.code(), error = %self, "request failed");
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };
        let body = ErrorBody {
            code: self.code(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn business_rejections_map_to_4xx() {
        assert_eq!(
            ServiceError::Validation("bad".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ServiceError::DuplicateBooking.status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::DuplicateValue("name".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::NotFound("Booking").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::Forbidden("nope".into()).status_code(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn storage_failures_map_to_5xx() {
        assert_eq!(
            ServiceError::Unavailable("pool timed out".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ServiceError::Database(diesel::result::Error::NotFound).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn not_found_names_the_entity() {
        assert_eq!(
            ServiceError::NotFound("Booking").to_string(),
            "Booking not found"
        );
    }

    #[test]
    fn plain_database_errors_are_not_retryable() {
        assert!(!ServiceError::Database(diesel::result::Error::NotFound)
            .is_serialization_failure());
        assert!(!ServiceError::DuplicateBooking.is_serialization_failure());
    }
}
