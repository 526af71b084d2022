//! Input validation: make sure a user-supplied path is a readable PDF.
//!
//! ## Why check the magic bytes ourselves?
//!
//! pdfium reports a non-PDF as a generic format error. Checking for the
//! `%PDF` header before opening lets callers see "not a PDF" with the first
//! bytes of the file, rather than a pdfium error code.

use crate::error::AnnotError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Check that `path` exists, is readable, and starts with `%PDF`.
pub fn validate_pdf(path: impl AsRef<Path>) -> Result<PathBuf, AnnotError> {
    let path = path.as_ref().to_path_buf();

    if !path.is_file() {
        return Err(AnnotError::FileNotFound { path });
    }

    let mut file = match std::fs::File::open(&path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(AnnotError::PermissionDenied { path });
        }
        Err(_) => return Err(AnnotError::FileNotFound { path }),
    };

    let mut magic = [0u8; 4];
    let mut read = 0;
    while read < magic.len() {
        match file.read(&mut magic[read..]) {
            Ok(0) => break,
            Ok(n) => read += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return Err(AnnotError::PermissionDenied { path });
            }
            Err(_) => break,
        }
    }
    if &magic != b"%PDF" {
        return Err(AnnotError::NotAPdf { path, magic });
    }

    debug!("Validated PDF input: {}", path.display());
    Ok(path)
}
