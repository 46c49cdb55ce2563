use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

/// Error kinds surfaced by handlers.
///
/// 4xx variants carry a message meant for the client. 5xx variants carry
/// diagnostic detail that is logged but never sent over the wire; the
/// client only sees the generic `public` message.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    PayloadTooLarge(String),
    #[error("{0}")]
    TooManyRequests(String),
    #[error("Database error: {detail}")]
    Database { public: &'static str, detail: String },
    #[error("Parse error: {detail}")]
    Parse { public: &'static str, detail: String },
    #[error("I/O error: {detail}")]
    Io { public: &'static str, detail: String },
    #[error("Internal error: {detail}")]
    Internal { public: &'static str, detail: String },
}

impl AppError {
    pub fn database(public: &'static str, err: impl std::fmt::Display) -> Self {
        AppError::Database { public, detail: err.to_string() }
    }

    pub fn parse(public: &'static str, err: impl std::fmt::Display) -> Self {
        AppError::Parse { public, detail: err.to_string() }
    }

    pub fn io(public: &'static str, err: impl std::fmt::Display) -> Self {
        AppError::Io { public, detail: err.to_string() }
    }

    pub fn internal(public: &'static str, err: impl std::fmt::Display) -> Self {
        AppError::Internal { public, detail: err.to_string() }
    }

    /// Message safe to show to the caller.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Validation(msg)
            | AppError::Unauthorized(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::PayloadTooLarge(msg)
            | AppError::TooManyRequests(msg) => msg.clone(),
            AppError::Database { public, .. }
            | AppError::Parse { public, .. }
            | AppError::Io { public, .. }
            | AppError::Internal { public, .. } => public.to_string(),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Database { .. }
            | AppError::Parse { .. }
            | AppError::Io { .. }
            | AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("❌ {}", self);
        }

        HttpResponse::build(status).json(serde_json::json!({
            "success": false,
            "message": self.public_message()
        }))
    }
}

impl From<mongodb::error::Error> for AppError {
    fn from(err: mongodb::error::Error) -> Self {
        AppError::database("Database operation failed", err)
    }
}
