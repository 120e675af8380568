//! Activation state revoked at the end of a removal.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::info;

/// Whatever licensing backend the product uses
pub trait ActivationStore: Send + Sync {
    /// Forget any local activation. Returns whether there was one.
    fn revoke(&self) -> std::io::Result<bool>;
}

/// Activation kept as a single file under the state root
#[derive(Debug, Clone)]
pub struct ActivationFile {
    path: PathBuf,
}

impl ActivationFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<state_dir>/activation/<product_id>.json`
    pub fn for_product(state_dir: impl Into<PathBuf>, product_id: &str) -> Self {
        let key: String = product_id
            .chars()
            .map(|c| if c == '/' || c == '\\' { '_' } else { c })
            .collect();
        Self::new(state_dir.into().join("activation").join(format!("{key}.json")))
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl ActivationStore for ActivationFile {
    fn revoke(&self) -> std::io::Result<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!("Revoked activation {:?}", self.path);
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_revoke_removes_file_once() {
        let dir = tempdir().unwrap();
        let activation = ActivationFile::for_product(dir.path(), "{id}");
        fs::create_dir_all(activation.path().parent().unwrap()).unwrap();
        fs::write(activation.path(), "{}").unwrap();

        assert!(activation.revoke().unwrap());
        assert!(!activation.revoke().unwrap());
    }
}
