// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Crash-safe file writes: bytes go to a temp file in the target directory,
//! which is renamed over the target once fully written and synced.
//!
//! [`stage_write`] and [`StagedFile::commit`] split the two steps so the
//! rename can happen on a different thread than the write. A [`StagedFile`]
//! dropped without commit removes its temp file and leaves the target alone.

use crate::error::{ReconError, ReconResult};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Fully written temp file waiting to be renamed onto its target
#[derive(Debug)]
pub struct StagedFile {
    file: NamedTempFile,
    target: PathBuf,
}

impl StagedFile {
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Rename the temp file over the target
    pub fn commit(self) -> ReconResult<PathBuf> {
        let StagedFile { file, target } = self;
        file.persist(&target).map_err(|e| {
            ReconError::from_io(format!("renaming onto {}", target.display()), e.error)
        })?;
        Ok(target)
    }
}

/// Write `bytes` next to `path` without touching `path` itself
pub fn stage_write(path: &Path, bytes: &[u8]) -> ReconResult<StagedFile> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)
        .map_err(|e| ReconError::from_io(format!("creating {}", dir.display()), e))?;
    let mut file = NamedTempFile::new_in(dir)
        .map_err(|e| ReconError::from_io(format!("creating temp file in {}", dir.display()), e))?;
    file.write_all(bytes)
        .and_then(|_| file.as_file().sync_all())
        .map_err(|e| ReconError::from_io(format!("writing {}", path.display()), e))?;
    Ok(StagedFile {
        file,
        target: path.to_path_buf(),
    })
}

/// Write `bytes` to `path` via temp file + rename
pub fn write_atomic(path: &Path, bytes: &[u8]) -> ReconResult<()> {
    stage_write(path, bytes)?.commit()?;
    Ok(())
}
