use actix_web::{HttpResponse, ResponseError};
use actix_web::http::StatusCode;

use crate::repo::RepoError;
use crate::response::ApiResponse;

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("{0}")] BadRequest(String),
    #[error("{0}")] Unauthorized(String),
    #[error("forbidden")] Forbidden,
    #[error("{0}")] NotFound(String),
    #[error("too many requests")] TooManyRequests,
    #[error("internal error")] Internal,
}

impl From<RepoError> for ApiError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound(what) => ApiError::NotFound(format!("{what} not found")),
            RepoError::Conflict => ApiError::BadRequest("already exists".into()),
            RepoError::Internal(detail) => {
                tracing::error!(%detail, "repository failure");
                ApiError::Internal
            }
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(e: validator::ValidationErrors) -> Self {
        // first message per field is enough for a client form
        let mut messages: Vec<String> = e
            .field_errors()
            .values()
            .filter_map(|errs| errs.first())
            .map(|err| match &err.message {
                Some(m) => m.to_string(),
                None => err.code.to_string(),
            })
            .collect();
        messages.sort();
        ApiError::BadRequest(messages.join("; "))
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ApiResponse::<()>::error(self.to_string()))
    }
}

/// Malformed or mistyped JSON bodies get the same envelope as every other 400.
pub fn json_error_handler(err: actix_web::error::JsonPayloadError, _req: &actix_web::HttpRequest) -> actix_web::Error {
    ApiError::BadRequest(format!("invalid request body: {err}")).into()
}
