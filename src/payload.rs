//! Payload staging contract and file transfer.
//!
//! The extraction component unpacks the embedded payload into a staging
//! directory before the orchestrator starts. The engine only consumes the
//! [`PayloadSource`] contract and never inspects how staging was produced.

use crate::cancel::CancelToken;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

const COPY_BUFFER_SIZE: usize = 81920;

/// What the engine needs from the payload-extraction component
pub trait PayloadSource: Send + Sync {
    /// Payload file names, in deployment order
    fn list_payload_names(&self) -> Vec<String>;

    /// Where the staged copy of `name` lives
    fn staged_path_of(&self, name: &str) -> PathBuf;

    /// Listed names whose staged copy is not a regular file
    fn missing_payload_names(&self) -> Vec<String> {
        self.list_payload_names()
            .into_iter()
            .filter(|name| !self.staged_path_of(name).is_file())
            .collect()
    }
}

/// Payload already unpacked into a flat directory
#[derive(Debug, Clone)]
pub struct StagingDir {
    dir: PathBuf,
    names: Vec<String>,
}

impl StagingDir {
    pub fn new(dir: impl Into<PathBuf>, names: Vec<String>) -> Self {
        Self {
            dir: dir.into(),
            names,
        }
    }

}

impl PayloadSource for StagingDir {
    fn list_payload_names(&self) -> Vec<String> {
        self.names.clone()
    }

    fn staged_path_of(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

#[derive(Error, Debug)]
pub enum CopyError {
    #[error("staged file {path:?} cannot be read: {source}")]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Destination exists and could not be replaced, usually because a running
    /// process holds it
    #[error("destination {path:?} is in use: {source}")]
    DestinationInUse {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("writing {path:?} failed: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("copy of {path:?} was cancelled")]
    Cancelled { path: PathBuf },
}

/// Replace `dest` with a streamed copy of `source`.
///
/// Any existing destination is deleted first; a failed delete is only logged,
/// the following exclusive create then decides whether the copy can proceed.
/// The token is checked between chunks and a cancelled copy removes its
/// partial output. Permissions of the source are carried over.
pub fn copy_payload_file(source: &Path, dest: &Path, cancel: &CancelToken) -> Result<u64, CopyError> {
    match fs::remove_file(dest) {
        Ok(()) => debug!("Removed previous {:?}", dest),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("{:?} could not be deleted: {}", dest, e),
    }

    let mut input = File::open(source).map_err(|e| CopyError::SourceUnavailable {
        path: source.to_path_buf(),
        source: e,
    })?;
    let permissions = input
        .metadata()
        .map_err(|e| CopyError::SourceUnavailable {
            path: source.to_path_buf(),
            source: e,
        })?
        .permissions();

    let mut output = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(dest)
        .map_err(|e| CopyError::DestinationInUse {
            path: dest.to_path_buf(),
            source: e,
        })?;

    let write_err = |e: std::io::Error| CopyError::Write {
        path: dest.to_path_buf(),
        source: e,
    };

    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
    let mut copied = 0u64;
    loop {
        if cancel.is_cancelled() {
            drop(output);
            let _ = fs::remove_file(dest);
            return Err(CopyError::Cancelled {
                path: dest.to_path_buf(),
            });
        }

        let n = match input.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(CopyError::SourceUnavailable {
                    path: source.to_path_buf(),
                    source: e,
                })
            }
        };
        output.write_all(&buffer[..n]).map_err(write_err)?;
        copied += n as u64;
    }

    output.sync_all().map_err(write_err)?;
    drop(output);
    fs::set_permissions(dest, permissions).map_err(write_err)?;

    debug!("Copied {} bytes {:?} -> {:?}", copied, source, dest);
    Ok(copied)
}

/// Delete an installed payload file. Returns whether it existed.
pub fn remove_payload_file(path: &Path) -> std::io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
