//! HTTP endpoint for resumable.js uploads.
//!
//! A single route answers `GET` resume probes and `POST` multipart chunk
//! deliveries. Status codes are the whole response; bodies are empty.

mod error;
mod handlers;
mod routes;
mod server;
mod state;

pub use error::ApiError;
pub use routes::create_router;
pub use server::{DEFAULT_MAX_REQUEST_BYTES, ServerConfig, UploadServer};
pub use state::AppState;

/// Errors produced by the upload server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid route {0:?}: must start with '/' and contain no path parameters or wildcards")]
    InvalidRoute(String),
}
