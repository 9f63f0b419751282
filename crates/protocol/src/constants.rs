//! Wire names and on-disk naming conventions shared by server and storage.

/// Client-declared destination filename.
pub const FIELD_FILENAME: &str = "resumableFilename";

/// Stable per-file identifier computed by the client (optional).
pub const FIELD_IDENTIFIER: &str = "resumableIdentifier";

/// 1-based index of the chunk carried by the request.
pub const FIELD_CHUNK_NUMBER: &str = "resumableChunkNumber";

/// Declared number of chunks in the upload.
pub const FIELD_TOTAL_CHUNKS: &str = "resumableTotalChunks";

/// Declared byte size of the assembled file.
pub const FIELD_TOTAL_SIZE: &str = "resumableTotalSize";

/// Infix between filename and chunk index in a chunk file name
/// (`report.pdf.part.3`).
pub const PART_INFIX: &str = ".part.";

/// Suffix of the sidecar record stored next to each chunk.
pub const META_SUFFIX: &str = ".meta";

/// Marker in the name of a working area that is being torn down
/// (`<id>_UNUSED.<uuid>`).
pub const RETIRED_MARKER: &str = "_UNUSED.";

/// Longest filename or identifier accepted, in bytes. Leaves room under the
/// usual 255-byte file name limit for the `.part.<N>.meta` suffix.
pub const MAX_NAME_LEN: usize = 200;
