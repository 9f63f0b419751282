//! Completeness detection and ordered concatenation of an upload's chunks.

use std::collections::BTreeSet;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use resumable_protocol::{ChunkUpload, UploadId};
use serde::{Deserialize, Serialize};

use crate::store::{ChunkStore, StoredChunk};
use crate::{TransferError, checksum_bytes};

/// When an upload counts as complete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionPolicy {
    /// Sum of on-disk chunk sizes reaches the declared total size. Stray
    /// chunks from an earlier attempt can trigger an early merge.
    ByteSum,
    /// Every index in `1..=total_chunks` is present.
    #[default]
    AllChunks,
}

impl CompletionPolicy {
    fn is_complete(self, chunks: &[StoredChunk], upload: &ChunkUpload) -> bool {
        if chunks.is_empty() {
            return false;
        }
        match self {
            Self::ByteSum => chunks.iter().map(|c| c.size).sum::<u64>() >= upload.total_size,
            Self::AllChunks => {
                let present: BTreeSet<u32> = chunks.iter().map(|c| c.index).collect();
                (1..=upload.total_chunks).all(|i| present.contains(&i))
            }
        }
    }
}

/// Result of a completeness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssemblyOutcome {
    /// Not every chunk has arrived yet.
    Pending { received: usize, expected: u32 },
    /// The final file was published at `path`.
    Assembled { path: PathBuf, bytes: u64 },
}

/// Merges a complete working area into the destination file.
///
/// Callers must hold the upload's exclusive lane guard.
#[derive(Debug, Clone)]
pub struct AssemblyEngine {
    store: ChunkStore,
    policy: CompletionPolicy,
    remove_chunks: bool,
}

impl AssemblyEngine {
    pub fn new(store: ChunkStore, policy: CompletionPolicy) -> Self {
        Self {
            store,
            policy,
            remove_chunks: true,
        }
    }

    /// Keeps the working area after a successful merge (debugging aid).
    pub fn keep_chunks(mut self) -> Self {
        self.remove_chunks = false;
        self
    }

    pub fn policy(&self) -> CompletionPolicy {
        self.policy
    }

    /// Assembles the upload if it is complete.
    ///
    /// On success the working area is retired; failing to remove it is
    /// logged and does not fail the call.
    pub fn try_complete(&self, upload: &ChunkUpload) -> Result<AssemblyOutcome, TransferError> {
        let id = upload.upload_id();
        let chunks = self.store.list_chunks(id, upload.filename())?;

        if !self.policy.is_complete(&chunks, upload) {
            return Ok(AssemblyOutcome::Pending {
                received: chunks.len(),
                expected: upload.total_chunks,
            });
        }

        tracing::info!(
            upload_id = %id,
            filename = upload.filename(),
            chunks = upload.total_chunks,
            "all chunks received, assembling"
        );

        let (path, bytes) = match self.merge(upload) {
            Ok(merged) => merged,
            // The declared total was met by stray bytes; wait for the gap.
            Err(TransferError::MissingChunk { index })
                if self.policy == CompletionPolicy::ByteSum =>
            {
                tracing::warn!(upload_id = %id, index, "byte total reached with a chunk missing");
                return Ok(AssemblyOutcome::Pending {
                    received: chunks.len(),
                    expected: upload.total_chunks,
                });
            }
            Err(e) => {
                tracing::error!(
                    upload_id = %id,
                    filename = upload.filename(),
                    "assembly failed: {e}"
                );
                if let TransferError::ChecksumMismatch { index } = e {
                    self.discard_corrupt_chunk(upload, index);
                }
                return Err(e);
            }
        };

        tracing::info!(
            upload_id = %id,
            path = %path.display(),
            bytes,
            "upload assembled"
        );

        if self.remove_chunks {
            self.retire_working_area(id);
        }

        Ok(AssemblyOutcome::Assembled { path, bytes })
    }

    /// Concatenates chunks `1..=total_chunks` into a staging file and
    /// renames it over the destination. Nothing is published on failure.
    fn merge(&self, upload: &ChunkUpload) -> Result<(PathBuf, u64), TransferError> {
        let layout = self.store.layout();
        fs::create_dir_all(layout.upload_root())?;

        let staging = layout.staging_path();
        let dest = layout.destination(upload.filename());

        let result = self
            .write_staged(&staging, upload)
            .and_then(|bytes| fs::rename(&staging, &dest).map(|()| bytes).map_err(Into::into));

        match result {
            Ok(bytes) => Ok((dest, bytes)),
            Err(e) => {
                if let Err(rm) = fs::remove_file(&staging) {
                    if rm.kind() != ErrorKind::NotFound {
                        tracing::warn!(path = %staging.display(), "failed to remove staging file: {rm}");
                    }
                }
                Err(e)
            }
        }
    }

    /// Empties the slot of a chunk whose payload no longer matches its
    /// sidecar, so the next resume check reports it missing and the client
    /// sends it again.
    fn discard_corrupt_chunk(&self, upload: &ChunkUpload, index: u32) {
        let id = upload.upload_id();
        match self.store.discard_chunk(id, upload.filename(), index) {
            Ok(()) => tracing::warn!(upload_id = %id, index, "discarded corrupt chunk"),
            Err(e) => tracing::warn!(upload_id = %id, index, "failed to discard corrupt chunk: {e}"),
        }
    }

    fn write_staged(&self, staging: &Path, upload: &ChunkUpload) -> Result<u64, TransferError> {
        let id = upload.upload_id();
        let filename = upload.filename();

        let mut out = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(staging)?;

        let mut bytes = 0u64;
        for index in 1..=upload.total_chunks {
            let path = self.store.layout().chunk_path(id, filename, index);
            let data = match fs::read(&path) {
                Ok(data) => data,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    return Err(TransferError::MissingChunk { index });
                }
                Err(e) => return Err(e.into()),
            };

            if let Some(meta) = self.store.read_meta(id, filename, index)? {
                if meta.sha256 != checksum_bytes(&data) {
                    return Err(TransferError::ChecksumMismatch { index });
                }
            }

            out.write_all(&data)?;
            bytes += data.len() as u64;
            tracing::debug!(upload_id = %id, index, "chunk appended");
        }

        out.sync_all()?;
        Ok(bytes)
    }

    /// Renames the working area out of the way, then deletes it. A chunk
    /// request racing in afterwards starts a fresh area instead of writing
    /// into one being deleted. Falls back to deleting in place.
    fn retire_working_area(&self, id: &UploadId) {
        let layout = self.store.layout();
        let dir = layout.working_dir(id);
        let retiring = layout.retiring_dir(id);

        let target = match fs::rename(&dir, &retiring) {
            Ok(()) => retiring,
            Err(e) => {
                tracing::warn!(
                    upload_id = %id,
                    "could not rename working area, deleting in place: {e}"
                );
                dir
            }
        };

        match fs::remove_dir_all(&target) {
            Ok(()) => tracing::debug!(upload_id = %id, "working area removed"),
            Err(e) => tracing::warn!(
                upload_id = %id,
                path = %target.display(),
                "failed to remove working area: {e}"
            ),
        }
    }
}
