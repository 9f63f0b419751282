//! Request error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use resumable_protocol::ProtocolError;
use resumable_transfer::TransferError;

/// Error returned by a request handler.
///
/// resumable.js only looks at the status code, so the response body is
/// always empty.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("request carried no readable file part")]
    NoReadableParts,

    #[error("request body exceeds the configured limit")]
    PayloadTooLarge,

    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Protocol(_) | Self::NoReadableParts => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Transfer(TransferError::InvalidPath(_)) => StatusCode::BAD_REQUEST,
            Self::Transfer(_) | Self::Join(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), "{self}");
        } else {
            tracing::debug!(status = status.as_u16(), "{self}");
        }
        status.into_response()
    }
}
