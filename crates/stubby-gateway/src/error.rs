use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use stubby_core::CoreError;
use stubby_shortener::ShortenerError;
use thiserror::Error;
use tracing::error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Shortener(#[from] ShortenerError),
    #[error(transparent)]
    InvalidInput(#[from] CoreError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::Shortener(err) => match err {
                ShortenerError::InvalidUrl(_) => StatusCode::BAD_REQUEST,
                // Unknown ids answer 400, not 404.
                ShortenerError::NotFound(_) => StatusCode::BAD_REQUEST,
                ShortenerError::Gone { .. } => StatusCode::GONE,
                ShortenerError::Storage(_) | ShortenerError::Session(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        };

        if status.is_server_error() {
            error!(error = %self, "request failed");
            return (status, "internal server error").into_response();
        }

        (status, self.to_string()).into_response()
    }
}
