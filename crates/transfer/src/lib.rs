//! Server-side storage and assembly for resumable chunked uploads.
//!
//! Chunks of an upload land in a per-upload working area under the scratch
//! root. Once every chunk is present they are concatenated, in index order,
//! into the destination file and the working area is torn down.

mod assembly;
mod checksum;
mod coordinator;
mod lanes;
mod layout;
mod oracle;
mod store;
mod sweep;

pub use assembly::{AssemblyEngine, AssemblyOutcome, CompletionPolicy};
pub use checksum::{calculate_file_checksum, checksum_bytes};
pub use coordinator::{ReceiveOutcome, TransferOptions, UploadCoordinator};
pub use lanes::{Lane, UploadLanes};
pub use layout::Layout;
pub use oracle::{ProbeMode, ResumeOracle};
pub use store::{ChunkMeta, ChunkStore, StoredChunk};
pub use sweep::{SweepReport, Sweeper};

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("chunk metadata error: {0}")]
    Meta(#[from] serde_json::Error),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("chunk {index} is missing from the working area")]
    MissingChunk { index: u32 },

    #[error("chunk {index} does not match its recorded checksum")]
    ChecksumMismatch { index: u32 },

    #[error("upload lane poisoned: {0}")]
    LanePoisoned(String),
}

impl From<resumable_protocol::ProtocolError> for TransferError {
    fn from(e: resumable_protocol::ProtocolError) -> Self {
        Self::InvalidPath(e.to_string())
    }
}
