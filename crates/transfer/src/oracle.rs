//! Read-only answers to "has this chunk already been received?".

use std::fs;
use std::io::ErrorKind;

use resumable_protocol::UploadId;
use serde::{Deserialize, Serialize};

use crate::TransferError;
use crate::store::ChunkStore;

/// How strictly a probe checks a chunk slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeMode {
    /// The payload file exists.
    Presence,
    /// The payload exists and its sidecar records the same size.
    #[default]
    Verified,
}

/// Answers resume probes without touching the write path.
#[derive(Debug, Clone)]
pub struct ResumeOracle {
    store: ChunkStore,
    mode: ProbeMode,
}

impl ResumeOracle {
    pub fn new(store: ChunkStore, mode: ProbeMode) -> Self {
        Self { store, mode }
    }

    pub fn mode(&self) -> ProbeMode {
        self.mode
    }

    /// Returns `true` when chunk `index` of the upload is already stored.
    pub fn chunk_exists(
        &self,
        id: &UploadId,
        filename: &str,
        index: u32,
    ) -> Result<bool, TransferError> {
        let path = self.store.layout().chunk_path(id, filename, index);
        let size = match fs::metadata(&path) {
            Ok(m) if m.is_file() => m.len(),
            Ok(_) => return Ok(false),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        if self.mode == ProbeMode::Presence {
            return Ok(true);
        }

        match self.store.read_meta(id, filename, index) {
            Ok(Some(meta)) => Ok(meta.index == index && meta.size == size),
            Ok(None) => Ok(false),
            Err(TransferError::Meta(e)) => {
                tracing::warn!(upload_id = %id, index, "unreadable chunk sidecar: {e}");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}
