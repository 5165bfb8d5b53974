//! Saving and loading payloads as versioned JSON.
//!
//! An archive is `{ "version": n, "payload": ... }`. Payload fields that are
//! missing load as their defaults, so older archives stay readable; archives
//! from a newer version are refused.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ArchiveError;

/// Version written by [`save`].
pub const ARCHIVE_VERSION: u32 = 1;

#[derive(Serialize)]
struct ArchiveRef<'a, P> {
    version: u32,
    payload: &'a P,
}

#[derive(Deserialize)]
struct Archive {
    version: u32,
    payload: serde_json::Value,
}

/// Write `payload` to `writer`.
///
/// # Errors
/// If serialization or the writer fails.
pub fn save<P: Serialize, W: Write>(payload: &P, writer: W) -> Result<(), ArchiveError> {
    serde_json::to_writer(
        writer,
        &ArchiveRef {
            version: ARCHIVE_VERSION,
            payload,
        },
    )?;
    Ok(())
}

/// Read a payload written by [`save`].
///
/// # Errors
/// If the reader fails, the document is malformed, or it has a newer version.
pub fn load<P: DeserializeOwned, R: Read>(reader: R) -> Result<P, ArchiveError> {
    let archive: Archive = serde_json::from_reader(reader)?;
    if archive.version > ARCHIVE_VERSION {
        return Err(ArchiveError::UnsupportedVersion {
            found: archive.version,
            supported: ARCHIVE_VERSION,
        });
    }
    Ok(serde_json::from_value(archive.payload)?)
}

/// # Errors
/// See [`save`]; also fails if the file cannot be created.
pub fn save_to_path<P: Serialize>(payload: &P, path: impl AsRef<Path>) -> Result<(), ArchiveError> {
    let mut writer = BufWriter::new(File::create(path)?);
    save(payload, &mut writer)?;
    writer.flush()?;
    Ok(())
}

/// # Errors
/// See [`load`]; also fails if the file cannot be opened.
pub fn load_from_path<P: DeserializeOwned>(path: impl AsRef<Path>) -> Result<P, ArchiveError> {
    load(BufReader::new(File::open(path)?))
}
