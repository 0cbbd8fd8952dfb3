use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Internal server error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }
}

impl From<fieldledger_core::Error> for AppError {
    fn from(error: fieldledger_core::Error) -> Self {
        use fieldledger_core::Error;

        match error {
            Error::NotFound(_) | Error::RecordGone(_) => Self::NotFound(error.to_string()),
            Error::ConflictExhausted { .. } => Self::Conflict(error.to_string()),
            Error::EmptyBatch | Error::BatchTooLarge { .. } | Error::InvalidInput(_) => {
                Self::BadRequest(error.to_string())
            }
            Error::Database(_) | Error::Sqlite(_) | Error::Serialization(_) => {
                tracing::error!(error = %error, "Storage failure");
                Self::Internal("storage failure".to_string())
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use fieldledger_core::RecordId;

    use super::*;

    fn status_of(error: fieldledger_core::Error) -> StatusCode {
        AppError::from(error).into_response().status()
    }

    #[test]
    fn core_errors_map_to_http_status() {
        use fieldledger_core::Error;

        assert_eq!(status_of(Error::NotFound(RecordId::new(1))), StatusCode::NOT_FOUND);
        assert_eq!(status_of(Error::RecordGone(RecordId::new(1))), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(Error::ConflictExhausted {
                id: RecordId::new(1),
                attempts: 8
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(status_of(Error::EmptyBatch), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(Error::BatchTooLarge { len: 3, max: 2 }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(Error::Database("disk full".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn storage_details_are_not_leaked() {
        let error = AppError::from(fieldledger_core::Error::Database("secret path".to_string()));
        assert!(!error.to_string().contains("secret path"));
    }
}
