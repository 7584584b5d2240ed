//! API error taxonomy.
//!
//! Every failure a handler can return is one of these variants and is
//! rendered as `{"message", "detail", "status_code"}` JSON.

use crate::storage::StorageError;
use actix_web::http::{header, StatusCode};
use actix_web::{HttpResponse, ResponseError};
use sea_orm::DbErr;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn not_found(what: &str) -> Self {
        Self::NotFound(format!("{} not found", what))
    }

    pub fn forbidden(action: &str) -> Self {
        Self::Forbidden(format!("You don't have permission to {}", action))
    }

    /// Text shown to the client. Server-side failures are not echoed back.
    pub fn detail(&self) -> String {
        match self {
            Self::Database(_) | Self::Storage(_) | Self::Internal(_) => {
                "An unexpected error occurred. Please try again later.".to_owned()
            }
            other => other.to_string(),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        Self::Internal(format!("JSON error: {}", e))
    }
}

/// JSON body for every error response.
#[derive(Serialize)]
pub struct ErrorBody {
    pub message: String,
    pub detail: String,
    pub status_code: u16,
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Database(_) | Self::Storage(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("{}", self);
        }

        let body = ErrorBody {
            message: status
                .canonical_reason()
                .unwrap_or("Unknown Error")
                .to_owned(),
            detail: self.detail(),
            status_code: status.as_u16(),
        };

        let mut builder = HttpResponse::build(status);
        if let Self::Unauthorized(_) = self {
            builder.insert_header((header::WWW_AUTHENTICATE, "Bearer"));
        }
        builder.json(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::MessageBody;

    fn body_of(err: ApiError) -> serde_json::Value {
        let resp = err.error_response();
        let bytes = resp.into_body().try_into_bytes().unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_not_found_renders_json() {
        let body = body_of(ApiError::not_found("Survey"));
        assert_eq!(body["status_code"], 404);
        assert_eq!(body["message"], "Not Found");
        assert_eq!(body["detail"], "Survey not found");
    }

    #[test]
    fn test_database_error_hides_detail() {
        let err = ApiError::from(DbErr::Custom("connection refused".to_owned()));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_of(err);
        assert!(!body["detail"].as_str().unwrap().contains("refused"));
    }

    #[test]
    fn test_unauthorized_sets_challenge_header() {
        let resp = ApiError::Unauthorized("Token has expired".to_owned()).error_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            resp.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Bearer"
        );
    }
}
