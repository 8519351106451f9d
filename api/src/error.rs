use std::any::Any;

use axum::body::Body;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use webwrap_core::{DecodeError, TemplateError};

/// Failures that end a request early. Everything the wrapped program does
/// wrong is an `Outcome`, not an `AppError`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Unreadable multipart body or a post no rendered form could produce (400, empty body)
    #[error("malformed request body: {0}")]
    MalformedBody(String),
    /// The page template failed (500)
    #[error("page rendering failed: {0}")]
    Render(#[from] TemplateError),
    /// Anything else escaping the request pipeline (500)
    #[error("{0}")]
    Internal(String),
}

impl From<DecodeError> for AppError {
    fn from(err: DecodeError) -> Self {
        AppError::MalformedBody(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::MalformedBody(reason) => {
                tracing::warn!(%reason, "rejected request body");
                StatusCode::BAD_REQUEST.into_response()
            }
            err @ (AppError::Render(_) | AppError::Internal(_)) => {
                tracing::error!(error = %err, "request failed");
                internal_error(err.to_string())
            }
        }
    }
}

fn internal_error(message: String) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        message,
    )
        .into_response()
}

/// Response for a panic that escaped a handler.
pub fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response<Body> {
    let message = payload
        .downcast_ref::<&str>()
        .map(|message| message.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    tracing::error!(%message, "handler panicked");
    internal_error(format!("Internal Server Error: {message}\n"))
}
