//! Setup configuration: product identity, payload manifest and filesystem roots.
//!
//! Loaded from a JSON file with `--config`, otherwise the built-in defaults
//! describe the stock Hologram product layout.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Static facts about the product being deployed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductInfo {
    /// Fixed product identifier; keys every persisted record
    pub id: String,
    pub display_name: String,
    pub publisher: String,
    /// Full version, e.g. "1.4.2.0"
    pub version: String,
    pub url_info_about: String,
    /// Support contact shown in every fatal error message
    pub contact: String,
    pub comments: String,
    /// User-facing executable the shortcuts and Launch action point at
    pub main_executable: String,
    /// Service-control executable (`/silent /install|/start|/stop|/uninstall`)
    pub service_executable: String,
    /// Copy of the setup program left in the install directory for removal
    pub setup_executable: String,
}

impl ProductInfo {
    /// Version truncated to three components ("1.4.2.0" -> "1.4.2")
    pub fn display_version(&self) -> String {
        self.version.split('.').take(3).collect::<Vec<_>>().join(".")
    }

    /// Trailing sentence appended to every user-facing failure message
    pub fn support_line(&self) -> String {
        format!("Please contact support at {}.", self.contact)
    }
}

impl Default for ProductInfo {
    fn default() -> Self {
        Self {
            id: "{6F1C2B0E-3D4A-4E57-9A61-0C8B5D2E7F93}".to_string(),
            display_name: "Hologram".to_string(),
            publisher: "Hologram Labs".to_string(),
            version: "1.0.0.0".to_string(),
            url_info_about: "https://hologram.example.org".to_string(),
            contact: "support@hologram.example.org".to_string(),
            comments: "Hologram - virtual monitors for the workplace".to_string(),
            main_executable: "hologram-ui".to_string(),
            service_executable: "hologram-service".to_string(),
            setup_executable: "hologram-setup".to_string(),
        }
    }
}

/// Complete setup configuration that can be saved/loaded
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SetupConfig {
    pub product: ProductInfo,

    /// Ordered payload manifest; install copies and uninstall deletes in this order
    pub payload_files: Vec<String>,

    /// Directory the payload-extraction component staged files into
    pub staging_dir: PathBuf,

    /// Root of the persistent installation state
    pub state_dir: PathBuf,
    pub log_dir: PathBuf,
    pub lock_dir: PathBuf,

    pub default_install_dir: PathBuf,

    // Shared launch entry locations
    pub start_menu_dir: PathBuf,
    pub desktop_dir: PathBuf,
    pub autostart_dir: PathBuf,

    /// Upper bound for each service-control invocation
    pub service_timeout_secs: u64,

    /// Held for the whole lifetime of the orchestrator process
    pub setup_lock_name: String,
    /// Held by the running product; taken by Install/Uninstall for their full duration
    pub product_lock_name: String,
}

impl Default for SetupConfig {
    fn default() -> Self {
        let product = ProductInfo::default();
        let name = product.display_name.clone();
        Self {
            payload_files: vec![
                "hologram-runtime".to_string(),
                "libhologram-camera.so".to_string(),
                "hologram-service".to_string(),
                "hologram-ui".to_string(),
                "libtoggle-switch.so".to_string(),
                "libvs-utilities.so".to_string(),
                "libjson-support.so".to_string(),
                "camera_calibration.ini".to_string(),
                "hologram-setup".to_string(),
            ],
            staging_dir: std::env::temp_dir().join(&name),
            state_dir: PathBuf::from("/var/lib/hologram-setup"),
            log_dir: PathBuf::from("/var/log").join(&name),
            lock_dir: PathBuf::from("/run/lock"),
            default_install_dir: PathBuf::from("/opt").join(&name),
            start_menu_dir: PathBuf::from("/usr/share/applications"),
            desktop_dir: PathBuf::from("/usr/share/desktop-directories"),
            autostart_dir: PathBuf::from("/etc/xdg/autostart"),
            service_timeout_secs: 60,
            setup_lock_name: format!("{name}SetupUnique"),
            product_lock_name: format!("{name}UIUnique"),
            product,
        }
    }
}

impl SetupConfig {
    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize setup configuration to JSON")?;

        fs::write(&path, json)
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read configuration from {:?}", path.as_ref()))?;

        let config: Self =
            serde_json::from_str(&content).context("Failed to parse configuration JSON")?;

        Ok(config)
    }

    pub fn service_timeout(&self) -> Duration {
        Duration::from_secs(self.service_timeout_secs)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.product.id.trim().is_empty() {
            anyhow::bail!("Product id must be specified");
        }
        if self.product.display_name.trim().is_empty() {
            anyhow::bail!("Product display name must be specified");
        }
        // The name becomes a directory and file name for shortcuts and the store
        if !is_plain_file_name(&self.product.display_name) {
            anyhow::bail!(
                "Product display name {:?} must be usable as a file name",
                self.product.display_name
            );
        }
        if self.payload_files.is_empty() {
            anyhow::bail!("At least one payload file must be listed");
        }

        for name in &self.payload_files {
            if !is_plain_file_name(name) {
                anyhow::bail!("Payload entry {:?} must be a plain file name", name);
            }
        }

        for exe in [&self.product.main_executable, &self.product.service_executable] {
            if !self.payload_files.contains(exe) {
                anyhow::bail!("Executable {:?} is not part of the payload", exe);
            }
        }

        if self.service_timeout_secs == 0 {
            anyhow::bail!("Service timeout must be greater than zero");
        }

        if self.setup_lock_name == self.product_lock_name {
            anyhow::bail!("Setup and product lock names must differ");
        }

        Ok(())
    }
}

/// A single path component: not empty, not `.`/`..`, no separators
pub(crate) fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains('\0')
}
