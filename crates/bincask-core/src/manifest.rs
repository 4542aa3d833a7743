//! Store manifest
//!
//! The bin count is fixed for the lifetime of a store: keys are routed with
//! `hash(key) mod N`, so opening with a different N would silently scatter
//! lookups across the wrong bins. The manifest pins N to the directory.
//!
//! Layout: 4 magic bytes ("BCSK") + bin count (u32 LE). 8 bytes total.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{CaskError, CaskResult};

/// Manifest file name inside a store directory
pub const MANIFEST_FILE: &str = "MANIFEST";

/// Magic bytes identifying a bincask manifest
const MAGIC: [u8; 4] = *b"BCSK";

fn manifest_path(dir: &Path) -> PathBuf {
    dir.join(MANIFEST_FILE)
}

/// Write the manifest for a store directory, overwriting any existing one.
pub fn write_manifest(dir: &Path, bin_count: u32) -> CaskResult<()> {
    let path = manifest_path(dir);

    let mut buf = [0u8; 8];
    buf[0..4].copy_from_slice(&MAGIC);
    buf[4..8].copy_from_slice(&bin_count.to_le_bytes());

    fs::write(&path, buf).map_err(|e| CaskError::Io {
        path: Some(path),
        kind: e.kind(),
        message: format!("Failed to write manifest: {}", e),
    })
}

/// Read the bin count recorded for a store directory.
///
/// Returns `Ok(None)` if no manifest exists (a directory created before the
/// manifest was introduced, or an empty directory).
pub fn read_manifest(dir: &Path) -> CaskResult<Option<u32>> {
    let path = manifest_path(dir);

    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(CaskError::Io {
                path: Some(path),
                kind: e.kind(),
                message: format!("Failed to read manifest: {}", e),
            })
        }
    };

    if bytes.len() != 8 {
        return Err(CaskError::ManifestCorrupted {
            path,
            reason: format!("expected 8 bytes, found {}", bytes.len()),
        });
    }
    if bytes[0..4] != MAGIC {
        return Err(CaskError::ManifestCorrupted {
            path,
            reason: format!("bad magic {:02x}{:02x}{:02x}{:02x}", bytes[0], bytes[1], bytes[2], bytes[3]),
        });
    }

    let bin_count = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    Ok(Some(bin_count))
}
