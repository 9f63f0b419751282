use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

use crate::validation::{validate_filename, validate_identifier};
use crate::{
    FIELD_CHUNK_NUMBER, FIELD_FILENAME, FIELD_IDENTIFIER, FIELD_TOTAL_CHUNKS, FIELD_TOTAL_SIZE,
    ProtocolError,
};

/// Raw request parameters (query string or multipart text fields).
pub type Params = HashMap<String, String>;

/// Stable key grouping every chunk of one logical file transfer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadId(String);

impl UploadId {
    /// Parses a client-supplied identifier.
    pub fn parse(id: &str) -> Result<Self, ProtocolError> {
        validate_identifier(id)?;
        Ok(Self(id.to_string()))
    }

    /// Derives the identifier used when the client sends none: the hex MD5
    /// of the filename, so every retry of the same file lands in the same
    /// working area.
    pub fn derive(filename: &str) -> Self {
        Self(hex::encode(Md5::digest(filename.as_bytes())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Addresses a single chunk slot: the subject of a probe request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkRef {
    pub upload_id: UploadId,
    pub filename: String,
    /// 1-based position within the upload.
    pub index: u32,
}

impl ChunkRef {
    /// Builds a chunk reference from `resumableFilename`,
    /// `resumableIdentifier` and `resumableChunkNumber`.
    pub fn from_params(params: &Params) -> Result<Self, ProtocolError> {
        let filename = required(params, FIELD_FILENAME)?;
        validate_filename(filename)?;

        let upload_id = match input(params, FIELD_IDENTIFIER) {
            Some(id) => UploadId::parse(id)?,
            None => UploadId::derive(filename),
        };

        let index: u32 = parse_number(params, FIELD_CHUNK_NUMBER)?;
        if index == 0 {
            return Err(invalid(FIELD_CHUNK_NUMBER, "0"));
        }

        Ok(Self {
            upload_id,
            filename: filename.to_string(),
            index,
        })
    }
}

/// Everything a chunk delivery declares about its upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkUpload {
    pub chunk: ChunkRef,
    pub total_chunks: u32,
    pub total_size: u64,
}

impl ChunkUpload {
    /// Builds the declaration carried by a multipart chunk delivery.
    ///
    /// The chunk index must fall within `1..=resumableTotalChunks`.
    pub fn from_params(params: &Params) -> Result<Self, ProtocolError> {
        let chunk = ChunkRef::from_params(params)?;

        let total_chunks: u32 = parse_number(params, FIELD_TOTAL_CHUNKS)?;
        if total_chunks == 0 {
            return Err(invalid(FIELD_TOTAL_CHUNKS, "0"));
        }
        if chunk.index > total_chunks {
            return Err(invalid(FIELD_CHUNK_NUMBER, &chunk.index.to_string()));
        }

        let total_size: u64 = parse_number(params, FIELD_TOTAL_SIZE)?;

        Ok(Self {
            chunk,
            total_chunks,
            total_size,
        })
    }

    pub fn upload_id(&self) -> &UploadId {
        &self.chunk.upload_id
    }

    pub fn filename(&self) -> &str {
        &self.chunk.filename
    }
}

/// Returns the parameter when it is present and not blank.
fn input<'a>(params: &'a Params, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .map(String::as_str)
        .filter(|v| !v.trim().is_empty())
}

fn required<'a>(params: &'a Params, key: &'static str) -> Result<&'a str, ProtocolError> {
    input(params, key).ok_or(ProtocolError::MissingField(key))
}

fn parse_number<T: FromStr>(params: &Params, key: &'static str) -> Result<T, ProtocolError> {
    let raw = required(params, key)?;
    raw.trim().parse().map_err(|_| invalid(key, raw))
}

fn invalid(field: &'static str, value: &str) -> ProtocolError {
    ProtocolError::InvalidField {
        field,
        value: value.to_string(),
    }
}
