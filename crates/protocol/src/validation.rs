use std::path::{Component, Path};

use crate::{MAX_NAME_LEN, ProtocolError, RETIRED_MARKER};

/// Validates a client-declared filename before it is used as a path segment.
///
/// The name must be a single plain file name. Rejects:
/// - Empty names and names longer than [`MAX_NAME_LEN`]
/// - Path separators (`/`, `\`) and NUL or other control characters
/// - `.` and `..`
/// - Windows drive prefixes (`C:`)
pub fn validate_filename(filename: &str) -> Result<(), ProtocolError> {
    if filename.is_empty() {
        return Err(ProtocolError::InvalidFilename("empty filename".into()));
    }

    if filename.len() > MAX_NAME_LEN {
        return Err(ProtocolError::InvalidFilename(format!(
            "filename longer than {MAX_NAME_LEN} bytes"
        )));
    }

    if filename.contains(['/', '\\']) {
        return Err(ProtocolError::InvalidFilename(format!(
            "path separators not allowed: {filename}"
        )));
    }

    if filename.chars().any(char::is_control) {
        return Err(ProtocolError::InvalidFilename(format!(
            "control characters not allowed: {filename:?}"
        )));
    }

    if filename.len() >= 2 && filename.as_bytes()[1] == b':' {
        return Err(ProtocolError::InvalidFilename(format!(
            "drive prefix not allowed: {filename}"
        )));
    }

    let mut components = Path::new(filename).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(ProtocolError::InvalidFilename(format!(
            "not a plain file name: {filename}"
        ))),
    }
}

/// Validates an upload identifier used as the working-area directory name.
///
/// resumable.js builds identifiers from the file size and a stripped
/// relative path, so ASCII alphanumerics plus `-`, `_` and `.` cover every
/// identifier a stock client sends.
pub fn validate_identifier(id: &str) -> Result<(), ProtocolError> {
    if id.is_empty() {
        return Err(ProtocolError::InvalidIdentifier("empty identifier".into()));
    }

    if id.len() > MAX_NAME_LEN {
        return Err(ProtocolError::InvalidIdentifier(format!(
            "identifier longer than {MAX_NAME_LEN} bytes"
        )));
    }

    if id == "." || id == ".." {
        return Err(ProtocolError::InvalidIdentifier(id.to_string()));
    }

    if !id
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
    {
        return Err(ProtocolError::InvalidIdentifier(format!(
            "unsupported characters: {id}"
        )));
    }

    // Reserved for working areas being torn down.
    if id.contains(RETIRED_MARKER) {
        return Err(ProtocolError::InvalidIdentifier(format!(
            "reserved marker in identifier: {id}"
        )));
    }

    Ok(())
}
