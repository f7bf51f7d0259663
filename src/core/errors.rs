use http::{header, HeaderValue, StatusCode};
use serde::Serialize;
use thiserror::Error;

use crate::core::response::Response;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("Malformed request body")]
    MalformedBody(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Internal Server Error")]
    Internal(#[from] anyhow::Error),
}

pub type ApiResult<T = Response> = Result<T, ApiError>;

#[derive(Serialize)]
struct ErrorBody<'a> {
    success: bool,
    message: String,
    errors: &'a [String],
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        ApiError::BadRequest(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        ApiError::Unauthorized(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        ApiError::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        ApiError::Conflict(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::MalformedBody(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Details surfaced to the client next to the message. Internal causes stay server-side.
    pub fn errors(&self) -> Vec<String> {
        match self {
            ApiError::MalformedBody(detail) => vec![detail.clone()],
            _ => Vec::new(),
        }
    }
}

impl From<ApiError> for Response {
    fn from(err: ApiError) -> Self {
        let errors = err.errors();
        let body = ErrorBody {
            success: false,
            message: err.to_string(),
            errors: &errors,
        };
        let bytes = serde_json::to_vec(&body).unwrap_or_else(|_| {
            br#"{"success":false,"message":"Internal Server Error","errors":[]}"#.to_vec()
        });

        let mut resp = Response::new(bytes);
        *resp.status_mut() = err.status();
        resp.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        resp
    }
}
