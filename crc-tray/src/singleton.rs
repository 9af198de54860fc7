//! Single-instance coordination.
//!
//! An exclusive flock on a lock file under `~/.crc`, acquired before any
//! window exists and released only at the very end of the shutdown sequence,
//! after every window handle has been destroyed.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("another instance already holds {0}")]
    AlreadyRunning(PathBuf),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Exclusive lock held for the process lifetime.
pub struct InstanceLock {
    file: File,
    path: PathBuf,
}

impl InstanceLock {
    pub fn acquire(path: &Path) -> Result<Self, LockError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        match file.try_lock_exclusive() {
            Ok(()) => {
                let _ = file.set_len(0);
                let _ = write!(file, "{}", std::process::id());
                debug!(lock = %path.display(), "instance lock acquired");
                Ok(InstanceLock {
                    file,
                    path: path.to_path_buf(),
                })
            }
            Err(err) if err.kind() == fs2::lock_contended_error().kind() => {
                Err(LockError::AlreadyRunning(path.to_path_buf()))
            }
            Err(err) => Err(LockError::Io(err)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lock. Must run after window teardown so no destruction
    /// handler can fire while a racing second instance starts up.
    pub fn release(self) {
        let _ = FileExt::unlock(&self.file);
        debug!(lock = %self.path.display(), "instance lock released");
    }
}
