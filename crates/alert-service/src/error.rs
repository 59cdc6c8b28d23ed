use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt::{self, Display};

/// Failures surfaced by the crowd monitor
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("venue capacity has not been calculated")]
    CapacityNotSet,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("video processing failed: {0}")]
    Video(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl MonitorError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            MonitorError::CapacityNotSet => StatusCode::CONFLICT,
            MonitorError::InvalidRequest(_) | MonitorError::Video(_) => StatusCode::BAD_REQUEST,
            MonitorError::Forbidden(_) => StatusCode::FORBIDDEN,
            MonitorError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// HTTP error rendered as `{"error": "..."}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

impl Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.status)
    }
}

impl std::error::Error for ApiError {}

impl From<MonitorError> for ApiError {
    fn from(value: MonitorError) -> Self {
        let status = value.status_code();
        if status.is_server_error() {
            tracing::error!(error = %value, "request failed");
        }
        let message = match &value {
            MonitorError::Internal(e) => format!("{:#}", e),
            other => other.to_string(),
        };
        Self::new(status, message)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}
