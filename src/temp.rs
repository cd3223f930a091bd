//! Partial file management module
//!
//! This module provides RAII-based handling of files that are being written
//! next to their final location and only become visible once persisted.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Guard for a partially written file that is removed on drop unless persisted
#[derive(Debug)]
pub(crate) struct PartialFile {
    path: PathBuf,
    persisted: bool,
}

impl PartialFile {
    /// Get the path to the partial file
    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Moves the partial file onto `target`, replacing any existing file
    pub(crate) fn persist(mut self, target: &Path) -> io::Result<()> {
        fs::rename(&self.path, target)?;
        self.persisted = true;
        Ok(())
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.persisted {
            // Silently ignore errors during cleanup
            let _ = fs::remove_file(&self.path);
        }
    }
}

/// Writes `bytes` to a uniquely named hidden file inside `dir`
///
/// The name is generated using ULID (monotonic, sortable unique identifier)
/// so a crashed run never collides with a later one. The file lives in the
/// same directory as its eventual target, which keeps `persist` a rename on
/// one filesystem.
pub(crate) fn write_partial_file(dir: &Path, stem: &str, bytes: &[u8]) -> io::Result<PartialFile> {
    let ulid = ulid::Ulid::new();
    let path = dir.join(format!(".{}.{}.part", stem, ulid));

    // The guard exists before any byte is written so failures clean up
    let guard = PartialFile {
        path,
        persisted: false,
    };

    let mut file = File::create(guard.path())?;
    file.write_all(bytes)?;
    file.sync_all()?;

    Ok(guard)
}
