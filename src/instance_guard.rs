//! System-wide single-instance locks.
//!
//! A named lock is an exclusive `flock(2)` on `<lock_dir>/<name>.lock`. The
//! returned [`InstanceLock`] holds it until dropped, so the check and the
//! guarded work cannot interleave with another holder. The kernel drops the
//! lock when the holding process dies, so a crash never leaves it stale.

use crate::error::{Result, SetupError};
use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// RAII holder of a named system-wide lock
pub struct InstanceLock {
    name: String,
    path: PathBuf,
    _lock: Flock<File>,
}

impl InstanceLock {
    /// Try to take the named lock without blocking.
    ///
    /// Returns `Ok(None)` when another holder (in this or any other process)
    /// already owns it.
    pub fn try_acquire(lock_dir: &Path, name: &str) -> Result<Option<Self>> {
        if name.is_empty() || name.contains('/') {
            return Err(SetupError::guard(format!("invalid lock name {:?}", name)));
        }

        fs::create_dir_all(lock_dir)?;
        let path = lock_dir.join(format!("{name}.lock"));

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;

        match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(mut lock) => {
                // Best-effort owner hint for whoever finds the file
                if let Err(e) = lock.set_len(0).and_then(|()| writeln!(lock, "{}", std::process::id())) {
                    warn!("Could not record owner in {:?}: {}", path, e);
                }
                debug!("Acquired instance lock {}", name);
                Ok(Some(Self {
                    name: name.to_string(),
                    path,
                    _lock: lock,
                }))
            }
            Err((_, errno)) if errno == Errno::EWOULDBLOCK => {
                debug!("Instance lock {} is held elsewhere", name);
                Ok(None)
            }
            Err((_, errno)) => Err(SetupError::guard(format!(
                "locking {:?} failed: {}",
                path, errno
            ))),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for InstanceLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceLock")
            .field("name", &self.name)
            .field("path", &self.path)
            .finish()
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        debug!("Released instance lock {}", self.name);
    }
}
