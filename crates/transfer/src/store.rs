//! Filesystem-backed storage of individual chunks.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;

use resumable_protocol::{UploadId, validate_filename};
use serde::{Deserialize, Serialize};

use crate::layout::{Layout, chunk_index, temp_sibling};
use crate::{TransferError, checksum_bytes};

/// Sidecar record written next to every chunk payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMeta {
    pub upload_id: UploadId,
    pub index: u32,
    /// Payload length in bytes.
    pub size: u64,
    /// SHA-256 hex digest of the payload.
    pub sha256: String,
}

/// A chunk as it currently sits in a working area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoredChunk {
    pub index: u32,
    pub size: u64,
}

/// Keyed chunk storage: one slot per `(upload id, chunk index)`.
///
/// Every write goes to a unique temp file that is synced and renamed over
/// the slot, so readers only ever see a complete payload. Two writers of
/// the same slot should still be serialized (see [`crate::Lane::slot`]) to
/// keep payload and sidecar from two different requests from pairing up.
#[derive(Debug, Clone)]
pub struct ChunkStore {
    layout: Layout,
}

impl ChunkStore {
    pub fn new(layout: Layout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Writes `payload` to the slot, creating the working area on demand and
    /// replacing any earlier payload for the same index.
    pub fn store_chunk(
        &self,
        id: &UploadId,
        filename: &str,
        index: u32,
        payload: &[u8],
    ) -> Result<StoredChunk, TransferError> {
        validate_filename(filename)?;
        if index == 0 {
            return Err(TransferError::InvalidPath(format!(
                "chunk index 0 for {filename}"
            )));
        }

        fs::create_dir_all(self.layout.working_dir(id))?;

        let meta = ChunkMeta {
            upload_id: id.clone(),
            index,
            size: payload.len() as u64,
            sha256: checksum_bytes(payload),
        };

        write_atomic(
            &self.layout.chunk_path(id, filename, index),
            payload,
            "chunk payload",
        )?;
        write_atomic(
            &self.layout.meta_path(id, filename, index),
            &serde_json::to_vec(&meta)?,
            "chunk sidecar",
        )?;

        tracing::debug!(upload_id = %id, filename, index, size = meta.size, "chunk stored");

        Ok(StoredChunk {
            index,
            size: meta.size,
        })
    }

    /// Lists the chunk payloads of `filename` currently in the working area,
    /// ordered by index. A missing working area lists as empty.
    pub fn list_chunks(
        &self,
        id: &UploadId,
        filename: &str,
    ) -> Result<Vec<StoredChunk>, TransferError> {
        let dir = self.layout.working_dir(id);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut chunks = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(index) = name.to_str().and_then(|n| chunk_index(n, filename)) else {
                continue;
            };
            let size = match entry.metadata() {
                Ok(m) => m.len(),
                // Replaced or retired between read_dir and stat.
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            chunks.push(StoredChunk { index, size });
        }

        chunks.sort_by_key(|c| c.index);
        Ok(chunks)
    }

    /// Empties a chunk slot so the chunk reads as never received. Missing
    /// files are not an error.
    pub fn discard_chunk(
        &self,
        id: &UploadId,
        filename: &str,
        index: u32,
    ) -> Result<(), TransferError> {
        for path in [
            self.layout.chunk_path(id, filename, index),
            self.layout.meta_path(id, filename, index),
        ] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        tracing::debug!(upload_id = %id, filename, index, "chunk discarded");
        Ok(())
    }

    /// Reads the sidecar of a chunk; `None` when it does not exist.
    pub fn read_meta(
        &self,
        id: &UploadId,
        filename: &str,
        index: u32,
    ) -> Result<Option<ChunkMeta>, TransferError> {
        match fs::read(self.layout.meta_path(id, filename, index)) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Writes `data` to a unique temp sibling, syncs it and renames it over
/// `path`. The temp file is removed if any step fails.
fn write_atomic(path: &Path, data: &[u8], what: &str) -> Result<(), TransferError> {
    let tmp = temp_sibling(path);
    let result = (|| {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(data)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        tracing::error!(path = %path.display(), "failed to write {what}: {e}");
        return Err(e.into());
    }
    Ok(())
}
