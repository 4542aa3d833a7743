//! Engine facade — lifecycle and routing
//!
//! BincaskEngine owns N bins and one background compactor. Operations are
//! routed to a bin by hashing the key; bins never synchronize with each
//! other, so operations on different bins run fully in parallel.
//!
//! Lifecycle: `open` builds the directory (create mode wipes it, open mode
//! recovers existing logs), verifies the manifest, constructs the bins, and
//! starts the compactor. Dropping the engine stops and joins the compactor
//! before the bins go away.

use std::collections::hash_map::DefaultHasher;
use std::fs::{self, File};
use std::hash::Hasher;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use crate::bin::Bin;
use crate::compactor::{start_compactor, CompactorHandle};
use crate::config::Config;
use crate::error::{CaskError, CaskResult};
use crate::manifest::{read_manifest, write_manifest};

/// How to initialize the store directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Wipe the directory and start a fresh store
    Create,
    /// Open an existing store, recovering each bin log
    Open,
}

/// Sharded, disk-persistent key-value engine.
///
/// All public methods take `&self`; the engine is safe to share across
/// threads behind an `Arc`. Gets on the same bin run concurrently; writes
/// serialize per bin.
pub struct BincaskEngine {
    /// The bins, indexed by `hash(key) % bins.len()`
    bins: Vec<Arc<Bin>>,
    /// Background compactor (taken out on close)
    compactor: Mutex<Option<CompactorHandle>>,
    /// Store directory
    path: PathBuf,
}

impl BincaskEngine {
    /// Open or create a store at `path` with `bin_count` bins.
    ///
    /// Create mode deletes every file in the directory and lays out fresh
    /// bin logs plus a manifest. Open mode verifies the manifest's bin count
    /// against `bin_count`, creates any missing bin logs, and runs crash
    /// recovery on the existing ones.
    pub fn open<P: AsRef<Path>>(
        path: P,
        bin_count: usize,
        mode: Mode,
        config: Config,
    ) -> CaskResult<Self> {
        let path = path.as_ref().to_path_buf();

        config.validate().map_err(|reason| CaskError::Config { reason })?;
        if bin_count == 0 {
            return Err(CaskError::Config {
                reason: "bin_count must be > 0".into(),
            });
        }
        let cache_capacity = NonZeroUsize::new(config.cache_capacity).ok_or_else(|| CaskError::Config {
            reason: "cache_capacity must be > 0".into(),
        })?;

        fs::create_dir_all(&path).map_err(|e| CaskError::Io {
            path: Some(path.clone()),
            kind: e.kind(),
            message: format!("Failed to create store directory: {}", e),
        })?;

        match mode {
            Mode::Create => {
                clear_directory(&path)?;
                write_manifest(&path, bin_count as u32)?;
            }
            Mode::Open => match read_manifest(&path)? {
                Some(expected) if expected as usize != bin_count => {
                    return Err(CaskError::BinCountMismatch {
                        path,
                        expected: expected as usize,
                        found: bin_count,
                    });
                }
                Some(_) => {}
                // Directory predates the manifest (or is empty): adopt the
                // caller's bin count and pin it.
                None => write_manifest(&path, bin_count as u32)?,
            },
        }

        let mut bins = Vec::with_capacity(bin_count);
        for id in 0..bin_count {
            let bin_path = path.join(format!("{}.bkt", id));
            let existed = bin_path.exists();

            if !existed {
                File::create(&bin_path).map_err(|e| CaskError::Io {
                    path: Some(bin_path.clone()),
                    kind: e.kind(),
                    message: format!("Failed to create bin log: {}", e),
                })?;
            }

            let bin = Arc::new(Bin::new(id, bin_path, cache_capacity));
            if mode == Mode::Open && existed {
                bin.recover()?;
            }
            bins.push(bin);
        }

        let compactor = start_compactor(bins.clone(), config.compaction_interval)?;
        info!(path = %path.display(), bins = bin_count, ?mode, "store opened");

        Ok(Self {
            bins,
            compactor: Mutex::new(Some(compactor)),
            path,
        })
    }

    /// Insert or overwrite a key.
    pub fn insert(&self, key: &[u8], value: &[u8]) -> CaskResult<()> {
        self.bin_for(key).insert(key, value)
    }

    /// Look up a key.
    pub fn get(&self, key: &[u8]) -> CaskResult<Option<Vec<u8>>> {
        self.bin_for(key).get(key)
    }

    /// Delete a key. Returns true if the key existed.
    pub fn erase(&self, key: &[u8]) -> CaskResult<bool> {
        self.bin_for(key).erase(key)
    }

    /// Stop the background compactor and wait for it to finish.
    ///
    /// Called automatically on drop; calling it earlier makes shutdown
    /// explicit. Idempotent.
    pub fn close(&self) {
        let mut compactor = self.compactor.lock();
        if let Some(handle) = compactor.take() {
            handle.shutdown();
        }
    }

    /// Store directory path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of bins the store was opened with.
    pub fn bin_count(&self) -> usize {
        self.bins.len()
    }

    fn bin_for(&self, key: &[u8]) -> &Bin {
        let mut hasher = DefaultHasher::new();
        hasher.write(key);
        let idx = (hasher.finish() % self.bins.len() as u64) as usize;
        &self.bins[idx]
    }
}

impl Drop for BincaskEngine {
    fn drop(&mut self) {
        self.close();
    }
}

/// Delete every file directly inside `dir`. Subdirectories are left alone.
fn clear_directory(dir: &Path) -> CaskResult<()> {
    let entries = fs::read_dir(dir).map_err(|e| CaskError::Io {
        path: Some(dir.to_path_buf()),
        kind: e.kind(),
        message: format!("Failed to read store directory: {}", e),
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| CaskError::Io {
            path: Some(dir.to_path_buf()),
            kind: e.kind(),
            message: format!("Failed to read directory entry: {}", e),
        })?;
        let entry_path = entry.path();
        if entry_path.is_file() {
            fs::remove_file(&entry_path).map_err(|e| CaskError::Io {
                path: Some(entry_path.clone()),
                kind: e.kind(),
                message: format!("Failed to delete file: {}", e),
            })?;
        }
    }
    Ok(())
}
