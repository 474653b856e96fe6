use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError, error::BlockingError};
use serde::{Deserialize, Serialize};

/// Errors surfaced by request handlers.
///
/// Client errors carry a message that is returned verbatim. Server-side
/// failures are logged and answered with a generic message, except for
/// `Config` which names the missing setting.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Config(String),
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),
    #[error("blocking task failed: {0}")]
    Blocking(#[from] BlockingError),
    #[error("report rendering failed: {0}")]
    Report(String),
    #[error("{context}: {message}")]
    Upstream { context: String, message: String },
    #[error("token error: {0}")]
    Token(String),
    #[error("{0}")]
    Internal(String),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}

impl ApiError {
    pub fn forbidden() -> Self {
        ApiError::Forbidden("Access forbidden".into())
    }

    fn detail(&self) -> String {
        match self {
            ApiError::BadRequest(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg)
            | ApiError::Config(msg) => msg.clone(),
            ApiError::Database(diesel::result::Error::NotFound) => "Not found".into(),
            ApiError::Upstream { context, message } => format!("{context}: {message}"),
            _ => "Internal server error".into(),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Database(diesel::result::Error::NotFound) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        HttpResponse::build(status).json(ErrorBody {
            detail: self.detail(),
        })
    }
}

/// Returns true when a diesel error is a unique-constraint violation.
pub fn is_unique_violation(err: &diesel::result::Error) -> bool {
    matches!(
        err,
        diesel::result::Error::DatabaseError(diesel::result::DatabaseErrorKind::UniqueViolation, _)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[test]
    fn maps_variants_to_status_codes() {
        let cases = [
            (ApiError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (ApiError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (ApiError::forbidden(), StatusCode::FORBIDDEN),
            (ApiError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (ApiError::Database(diesel::result::Error::NotFound), StatusCode::NOT_FOUND),
            (ApiError::Config("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (ApiError::Report("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (
                ApiError::Database(diesel::result::Error::RollbackTransaction),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.status_code(), status, "{err:?}");
        }
    }

    #[actix_web::test]
    async fn internal_errors_hide_their_cause() {
        let err = ApiError::Token("bad key material".into());
        let body = to_bytes(err.error_response().into_body()).await.unwrap();
        let body: ErrorBody = serde_json::from_slice(&body).unwrap();
        assert_eq!(body.detail, "Internal server error");
    }

    #[actix_web::test]
    async fn client_errors_keep_their_message() {
        let err = ApiError::BadRequest("Cannot share with yourself".into());
        let body = to_bytes(err.error_response().into_body()).await.unwrap();
        let body: ErrorBody = serde_json::from_slice(&body).unwrap();
        assert_eq!(body.detail, "Cannot share with yourself");
    }
}
