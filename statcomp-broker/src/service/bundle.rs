//! ZIP bundle access
//!
//! Thin wrapper over the `zip` reader: produce the entry listing the
//! classifier consumes, and pull individual entries back out during
//! extraction. All validation lives in the classifier; this module only does
//! I/O over the uploaded bytes.

use std::io::{Cursor, Read};

use zip::ZipArchive;
use zip::result::ZipError;

use statcomp_core::classify::ArchiveEntry;

/// List the entries of an uploaded ZIP bundle.
pub fn read_entries(bytes: &[u8]) -> Result<Vec<ArchiveEntry>, ZipError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut entries = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let entry = archive.by_index(index)?;
        entries.push(ArchiveEntry {
            path: entry.name().to_string(),
            is_dir: entry.is_dir(),
        });
    }
    Ok(entries)
}

/// Read one entry's bytes by its archive path.
pub fn read_entry_bytes(bytes: &[u8], path: &str) -> Result<Vec<u8>, ZipError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut entry = archive.by_name(path)?;
    let mut buffer = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut buffer)?;
    Ok(buffer)
}
