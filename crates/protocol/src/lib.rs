//! Request parameters for the resumable.js chunked upload protocol.
//!
//! The client splits a file into numbered chunks and sends each one as a
//! multipart `POST`, optionally probing with a `GET` first to learn whether
//! the chunk already reached the server. Both request kinds carry the same
//! `resumable*` parameters; this crate turns them into validated types.

pub mod constants;
pub mod params;
pub mod validation;

pub use constants::*;
pub use params::{ChunkRef, ChunkUpload, Params, UploadId};
pub use validation::{validate_filename, validate_identifier};

/// Errors produced while decoding request parameters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid value for {field}: {value:?}")]
    InvalidField { field: &'static str, value: String },

    #[error("invalid filename: {0}")]
    InvalidFilename(String),

    #[error("invalid upload identifier: {0}")]
    InvalidIdentifier(String),
}
