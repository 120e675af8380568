//! Persistent installation state.
//!
//! Two independent records live under the store root:
//!
//! ```text
//! <root>/software/<namespace>.json      { "<productId>": "<installPath>", ... }
//! <root>/uninstall/<productId>.json     UninstallRegistration
//! ```
//!
//! Only the install-path entry decides whether the product is installed.
//! The uninstall registration is listing metadata and may be missing or
//! stale without changing that answer. All writes go through a temp file
//! and rename so a crash never leaves a truncated record.
//!
//! A malformed install-path document reads as "not installed" and is
//! replaced wholesale by the next write or removal.

use crate::config::ProductInfo;
use crate::error::{Result, SetupError};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// The durable fact that defines "installed"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallationRecord {
    pub product_id: String,
    pub install_path: PathBuf,
}

/// Metadata for the installed-programs listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UninstallRegistration {
    pub display_name: String,
    pub application_version: String,
    pub publisher: String,
    pub display_icon: String,
    pub display_version: String,
    #[serde(rename = "URLInfoAbout")]
    pub url_info_about: String,
    pub contact: String,
    /// `yyyyMMdd`
    pub install_date: String,
    pub uninstall_string: String,
    pub comments: String,
}

impl UninstallRegistration {
    /// Build the registration for `product` installed at `install_path` on `date`
    pub fn for_product(product: &ProductInfo, install_path: &Path, date: NaiveDate) -> Self {
        let setup_path = install_path.join(&product.setup_executable);
        let display_icon = setup_path.display().to_string();
        Self {
            display_name: product.display_name.clone(),
            application_version: product.version.clone(),
            publisher: product.publisher.clone(),
            uninstall_string: format!("{display_icon} /uninstall"),
            display_icon,
            display_version: product.display_version(),
            url_info_about: product.url_info_about.clone(),
            contact: product.contact.clone(),
            install_date: date.format("%Y%m%d").to_string(),
            comments: product.comments.clone(),
        }
    }
}

/// File-backed store keyed by a fixed product identifier
#[derive(Debug, Clone)]
pub struct ConfigStore {
    root: PathBuf,
    namespace: String,
    product_id: String,
}

impl ConfigStore {
    /// Store rooted at `root`. `namespace` names the shared install-path
    /// document; `product_id` keys this product's entries in it.
    pub fn new(root: impl Into<PathBuf>, namespace: impl Into<String>, product_id: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            namespace: namespace.into(),
            product_id: product_id.into(),
        }
    }

    /// Store for `product` rooted at `root`, namespaced by the product name
    pub fn for_product(root: impl Into<PathBuf>, product: &ProductInfo) -> Self {
        Self::new(root, product.display_name.clone(), product.id.clone())
    }

    /// Identifier this store's entries are keyed by
    pub fn product_id(&self) -> &str {
        &self.product_id
    }

    fn install_path_file(&self) -> PathBuf {
        self.root.join("software").join(format!("{}.json", self.namespace))
    }

    fn registration_file(&self) -> PathBuf {
        self.root
            .join("uninstall")
            .join(format!("{}.json", sanitize_key(&self.product_id)))
    }

    // ------------------------------------------------------------------
    // Installation record
    // ------------------------------------------------------------------

    /// Persist `path` as this product's install path. This is the commit
    /// point that marks the product installed.
    ///
    /// A malformed document reads as "not installed", so it is replaced
    /// rather than allowed to fail the run at its commit step.
    pub fn write_install_path(&self, path: &Path) -> Result<()> {
        let file = self.install_path_file();
        let mut entries = read_entries_for_update(&file)?;
        entries.insert(self.product_id.clone(), path.display().to_string());
        write_json_atomic(&file, &entries)?;
        info!("Recorded install path {:?} for {}", path, self.product_id);
        Ok(())
    }

    /// The recorded install path, or `None` when the product is not installed.
    ///
    /// An unreadable record is logged and treated as absent; an empty value
    /// counts as absent too.
    pub fn read_install_path(&self) -> Option<PathBuf> {
        let file = self.install_path_file();
        match read_entries(&file) {
            Ok(entries) => entries
                .get(&self.product_id)
                .filter(|p| !p.is_empty())
                .map(PathBuf::from),
            Err(e) => {
                warn!("Ignoring unreadable install record {:?}: {}", file, e);
                None
            }
        }
    }

    /// The installation record, present exactly when [`is_installed`](Self::is_installed) holds
    pub fn read_installation_record(&self) -> Option<InstallationRecord> {
        self.read_install_path().map(|install_path| InstallationRecord {
            product_id: self.product_id.clone(),
            install_path,
        })
    }

    /// Whether a non-empty install path is recorded for this product
    pub fn is_installed(&self) -> bool {
        self.read_install_path().is_some()
    }

    /// Delete this product's install-path entry. Returns whether an entry existed.
    /// Entries for other products sharing the namespace are kept.
    pub fn remove_install_path(&self) -> Result<bool> {
        let file = self.install_path_file();
        let mut entries = read_entries_for_update(&file)?;
        let existed = entries.remove(&self.product_id).is_some();

        if entries.is_empty() {
            remove_if_exists(&file)?;
        } else {
            write_json_atomic(&file, &entries)?;
        }

        if existed {
            info!("Removed install record for {}", self.product_id);
        }
        Ok(existed)
    }

    // ------------------------------------------------------------------
    // Uninstall registration
    // ------------------------------------------------------------------

    /// Publish `registration` for the installed-programs listing, replacing any previous one
    pub fn write_uninstall_registration(&self, registration: &UninstallRegistration) -> Result<()> {
        let file = self.registration_file();
        write_json_atomic(&file, registration)?;
        info!("Wrote uninstall registration {:?}", file);
        Ok(())
    }

    /// The published registration. Missing or malformed files read as `None`.
    pub fn read_uninstall_registration(&self) -> Option<UninstallRegistration> {
        let file = self.registration_file();
        let content = fs::read_to_string(&file).ok()?;
        match serde_json::from_str(&content) {
            Ok(reg) => Some(reg),
            Err(e) => {
                warn!("Ignoring malformed uninstall registration {:?}: {}", file, e);
                None
            }
        }
    }

    /// Delete the registration. Returns whether one existed.
    pub fn remove_uninstall_registration(&self) -> Result<bool> {
        let existed = remove_if_exists(&self.registration_file())?;
        if existed {
            info!("Removed uninstall registration for {}", self.product_id);
        }
        Ok(existed)
    }
}

/// Product ids are usually braced GUIDs; keep them file-name safe
fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| if c == '/' || c == '\\' || c == '\0' { '_' } else { c })
        .collect()
}

fn read_entries(file: &Path) -> Result<BTreeMap<String, String>> {
    match fs::read_to_string(file) {
        Ok(content) if content.trim().is_empty() => Ok(BTreeMap::new()),
        Ok(content) => serde_json::from_str(&content)
            .map_err(|e| SetupError::store(format!("{:?} is malformed: {}", file, e))),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
        Err(e) => Err(e.into()),
    }
}

/// Entries to rewrite. A malformed document is discarded with a warning,
/// matching how [`ConfigStore::read_install_path`] treats it.
fn read_entries_for_update(file: &Path) -> Result<BTreeMap<String, String>> {
    match read_entries(file) {
        Err(SetupError::Store(reason)) => {
            warn!("Replacing malformed install record: {}", reason);
            Ok(BTreeMap::new())
        }
        other => other,
    }
}

fn write_json_atomic<T: Serialize>(file: &Path, value: &T) -> Result<()> {
    let parent = file
        .parent()
        .ok_or_else(|| SetupError::store(format!("{:?} has no parent directory", file)))?;
    fs::create_dir_all(parent)?;

    let json = serde_json::to_string_pretty(value)?;
    let tmp = file.with_extension("json.tmp");
    fs::write(&tmp, json)?;
    fs::rename(&tmp, file)?;
    debug!("Wrote {:?}", file);
    Ok(())
}

fn remove_if_exists(file: &Path) -> Result<bool> {
    match fs::remove_file(file) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
