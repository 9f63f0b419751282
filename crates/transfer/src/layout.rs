//! On-disk naming of working areas, chunk slots and destination files.

use std::path::{Path, PathBuf};

use resumable_protocol::{META_SUFFIX, PART_INFIX, RETIRED_MARKER, UploadId};
use uuid::Uuid;

/// Resolves every path the server touches from its two roots.
///
/// ```text
/// <scratch_root>/<upload_id>/<filename>.part.<index>        chunk payload
/// <scratch_root>/<upload_id>/<filename>.part.<index>.meta   chunk sidecar
/// <scratch_root>/<upload_id>_UNUSED.<uuid>/                 retiring area
/// <upload_root>/<filename>                                  final artifact
/// ```
#[derive(Debug, Clone)]
pub struct Layout {
    scratch_root: PathBuf,
    upload_root: PathBuf,
}

impl Layout {
    pub fn new(scratch_root: impl Into<PathBuf>, upload_root: impl Into<PathBuf>) -> Self {
        Self {
            scratch_root: scratch_root.into(),
            upload_root: upload_root.into(),
        }
    }

    pub fn scratch_root(&self) -> &Path {
        &self.scratch_root
    }

    pub fn upload_root(&self) -> &Path {
        &self.upload_root
    }

    /// Working area holding the received chunks of one upload.
    pub fn working_dir(&self, id: &UploadId) -> PathBuf {
        self.scratch_root.join(id.as_str())
    }

    pub fn chunk_path(&self, id: &UploadId, filename: &str, index: u32) -> PathBuf {
        self.working_dir(id).join(format!("{filename}{PART_INFIX}{index}"))
    }

    pub fn meta_path(&self, id: &UploadId, filename: &str, index: u32) -> PathBuf {
        self.working_dir(id)
            .join(format!("{filename}{PART_INFIX}{index}{META_SUFFIX}"))
    }

    /// Final location of an assembled file.
    pub fn destination(&self, filename: &str) -> PathBuf {
        self.upload_root.join(filename)
    }

    /// Unique staging file in the upload root, renamed over the destination
    /// once assembly succeeds.
    pub fn staging_path(&self) -> PathBuf {
        self.upload_root.join(format!(".{}.partial", Uuid::new_v4()))
    }

    /// Unique name a finished working area is renamed to before deletion.
    pub fn retiring_dir(&self, id: &UploadId) -> PathBuf {
        self.scratch_root.join(format!("{id}{RETIRED_MARKER}{}", Uuid::new_v4()))
    }
}

/// Unique temporary sibling used for write-then-rename.
pub(crate) fn temp_sibling(path: &Path) -> PathBuf {
    path.with_file_name(format!(".tmp.{}", Uuid::new_v4()))
}

/// Extracts the chunk index from a directory entry name, if the entry is a
/// chunk payload of `filename`. Temp files and sidecars yield `None`.
pub(crate) fn chunk_index(entry_name: &str, filename: &str) -> Option<u32> {
    let rest = entry_name.strip_prefix(filename)?.strip_prefix(PART_INFIX)?;
    if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    rest.parse().ok().filter(|&index| index > 0)
}
