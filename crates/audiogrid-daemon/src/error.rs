use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use audiogrid_proto::protocol::ErrorBody;

use crate::catalog::CatalogError;
use crate::vlc::PlayerError;

/// Failure taxonomy of the REST gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    PlayerUnavailable,
    ControlChannel,
    Internal,
}

impl ErrorKind {
    pub fn status(self) -> StatusCode {
        match self {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::PlayerUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::ControlChannel | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<&PlayerError> for ErrorKind {
    fn from(e: &PlayerError) -> Self {
        match e {
            PlayerError::Unavailable => ErrorKind::PlayerUnavailable,
            PlayerError::Channel(_) => ErrorKind::ControlChannel,
            PlayerError::BinaryNotFound | PlayerError::Spawn(_) => ErrorKind::Internal,
        }
    }
}

impl From<&CatalogError> for ErrorKind {
    fn from(e: &CatalogError) -> Self {
        match e {
            CatalogError::DirectoryNotFound(_) => ErrorKind::NotFound,
            CatalogError::Read { .. } => ErrorKind::Internal,
        }
    }
}

/// A handler failure: taxonomy kind, user-facing message, optional detail.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl ToString) -> Self {
        self.details = Some(details.to_string());
        self
    }

    /// Wrap a component error, keeping its text as the detail.
    pub fn from_source<E>(source: &E, message: impl Into<String>) -> Self
    where
        E: std::error::Error,
        for<'a> ErrorKind: From<&'a E>,
    {
        Self::new(ErrorKind::from(source), message).with_details(source)
    }

    pub fn status(&self) -> StatusCode {
        self.kind.status()
    }

    /// Text for the desktop notification.
    pub fn notification_body(&self) -> String {
        match &self.details {
            Some(details) => format!("{}: {}", self.message, details),
            None => self.message.clone(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.message,
            details: self.details,
        };
        (self.kind.status(), Json(body)).into_response()
    }
}
