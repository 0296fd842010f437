//! Temporary artifact lifecycle.
//!
//! Every artifact is created in a scratch directory and removed as soon as it is no longer needed or
//! an error occurs on its path. Removal is tied to ownership: dropping an artifact deletes its file,
//! and explicit removal tolerates a file that is already gone. The only artifact that outlives an
//! invocation is the [`TempArtifact`] handed back to the caller.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log;
use sysinfo::Disks;
use tempfile::{self, NamedTempFile, TempPath};

/// Location temporary artifacts are created in.
pub trait ScratchStorage: Send + Sync {
    /// Directory the artifacts are created in.
    fn dir(&self) -> &Path;

    /// Bytes usable on the filesystem holding [`ScratchStorage::dir`],
    /// or [`None`] if it cannot be determined.
    fn usable_space(&self) -> Option<u64>;
}

/// Scratch directory on a local filesystem.
#[derive(Debug, Clone)]
pub struct ScratchDir {
    dir: PathBuf,
}

impl ScratchDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        ScratchDir { dir: dir.into() }
    }
}

impl Default for ScratchDir {
    /// Uses the OS temporary directory.
    fn default() -> Self {
        ScratchDir::new(env::temp_dir())
    }
}

impl ScratchStorage for ScratchDir {
    fn dir(&self) -> &Path {
        &self.dir
    }

    fn usable_space(&self) -> Option<u64> {
        let dir = match fs::canonicalize(&self.dir) {
            Ok(dir) => dir,
            Err(err) => {
                log::warn!("scratch directory {} not resolved: {}", self.dir.display(), err);
                return None;
            }
        };

        // the longest mount point containing the directory is the filesystem it lives on
        let disks = Disks::new_with_refreshed_list();
        disks
            .list()
            .iter()
            .filter(|disk| dir.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().as_os_str().len())
            .map(|disk| disk.available_space())
    }
}

/// Creates a uniquely named, empty file in `dir`.
pub(crate) fn create_temp(dir: &Path, prefix: &str) -> io::Result<NamedTempFile> {
    tempfile::Builder::new().prefix(prefix).suffix(".tmp").tempfile_in(dir)
}

/// Deletes a temporary file. A file that is already missing counts as deleted.
pub(crate) fn remove_temp(path: TempPath) -> io::Result<()> {
    match path.close() {
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        result => result,
    }
}

/// Temporary file whose ownership has been handed over to the caller.
///
/// The file is deleted when the artifact is dropped unless it has been persisted or kept.
#[derive(Debug)]
pub struct TempArtifact {
    path: TempPath,
    records: u64,
}

impl TempArtifact {
    pub(crate) fn new(path: TempPath, records: u64) -> Self {
        TempArtifact { path, records }
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of records written to the file.
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Moves the file to `target`, copying it when a rename is not possible (e.g. across filesystems).
    pub fn persist(self, target: impl AsRef<Path>) -> io::Result<()> {
        let target = target.as_ref();
        match self.path.persist(target) {
            Ok(()) => Ok(()),
            Err(err) => {
                log::debug!("rename to {} failed ({}), copying", target.display(), err.error);
                fs::copy(&err.path, target)?;
                remove_temp(err.path)
            }
        }
    }

    /// Releases the file from automatic deletion and returns its path.
    pub fn keep(self) -> io::Result<PathBuf> {
        self.path.keep().map_err(|err| err.error)
    }

    /// Deletes the file now.
    pub fn delete(self) -> io::Result<()> {
        remove_temp(self.path)
    }
}

impl AsRef<Path> for TempArtifact {
    fn as_ref(&self) -> &Path {
        self.path()
    }
}
