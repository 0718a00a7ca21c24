use actix_web::{error::BlockingError, http::StatusCode, HttpResponse, ResponseError};
use diesel::r2d2::PoolError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or missing input.
    #[error("{0}")]
    Validation(String),

    /// Uniqueness violation.
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    /// Deliberately says nothing about which half of the credentials was wrong.
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("database unavailable: {0}")]
    StoreUnavailable(#[from] PoolError),

    #[error("database error: {0}")]
    Store(#[from] diesel::result::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<BlockingError> for Error {
    fn from(err: BlockingError) -> Self {
        Error::Internal(anyhow::anyhow!("blocking task failed: {err}"))
    }
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Error::StoreUnavailable(_) | Error::Store(_) | Error::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();

        let body = if status.is_server_error() {
            log::error!("request failed: {self:#}");
            if cfg!(debug_assertions) {
                serde_json::json!({ "error": "Internal server error", "details": self.to_string() })
            } else {
                serde_json::json!({ "error": "Internal server error" })
            }
        } else {
            serde_json::json!({ "error": self.to_string() })
        };

        HttpResponse::build(status).json(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[actix_web::test]
    async fn client_errors_carry_their_message() {
        let resp = Error::Conflict("Email already registered".into()).error_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let body = to_bytes(resp.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Email already registered");
    }

    #[actix_web::test]
    async fn store_errors_are_generic() {
        let resp = Error::Store(diesel::result::Error::NotFound).error_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = to_bytes(resp.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Internal server error");
    }

    #[test]
    fn status_mapping() {
        assert_eq!(
            Error::Validation("bad".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::NotFound("gone".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            Error::InvalidCredentials.status_code(),
            StatusCode::UNAUTHORIZED
        );
    }
}
