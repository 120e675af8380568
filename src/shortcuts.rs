//! Shared launch entries for the installed product.
//!
//! Entries are freedesktop `.desktop` files: one inside a per-product folder
//! of the shared applications menu, one in the shared desktop folder, and an
//! optional autostart entry. Creation and removal are idempotent.

use crate::config::is_plain_file_name;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct ShortcutManager {
    start_menu_dir: PathBuf,
    desktop_dir: PathBuf,
    autostart_dir: PathBuf,
    description: String,
}

impl ShortcutManager {
    pub fn new(
        start_menu_dir: impl Into<PathBuf>,
        desktop_dir: impl Into<PathBuf>,
        autostart_dir: impl Into<PathBuf>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            start_menu_dir: start_menu_dir.into(),
            desktop_dir: desktop_dir.into(),
            autostart_dir: autostart_dir.into(),
            description: description.into(),
        }
    }

    pub fn start_menu_folder(&self, display_name: &str) -> PathBuf {
        self.start_menu_dir.join(display_name)
    }

    pub fn start_menu_entry(&self, display_name: &str) -> PathBuf {
        self.start_menu_folder(display_name)
            .join(format!("{display_name}.desktop"))
    }

    pub fn desktop_entry(&self, display_name: &str) -> PathBuf {
        self.desktop_dir.join(format!("{display_name}.desktop"))
    }

    pub fn autostart_entry(&self, display_name: &str) -> PathBuf {
        self.autostart_dir.join(format!("{display_name}.desktop"))
    }

    fn entry_contents(&self, target: &Path, display_name: &str) -> String {
        // Icon comes from the executable's first icon resource
        format!(
            "[Desktop Entry]\nType=Application\nName={name}\nComment={comment}\nExec=\"{exec}\"\nIcon={exec}\nTerminal=false\n",
            name = display_name,
            comment = self.description,
            exec = target.display(),
        )
    }

    /// Create (or overwrite) the start-menu and desktop entries for `target`
    pub fn create(&self, target: &Path, display_name: &str) -> std::io::Result<()> {
        check_entry_name(display_name)?;
        let contents = self.entry_contents(target, display_name);

        fs::create_dir_all(self.start_menu_folder(display_name))?;
        fs::write(self.start_menu_entry(display_name), &contents)?;

        fs::create_dir_all(&self.desktop_dir)?;
        fs::write(self.desktop_entry(display_name), &contents)?;

        info!("Created launch entries for {}", display_name);
        Ok(())
    }

    /// Remove the start-menu folder, desktop entry and autostart entry
    pub fn remove(&self, display_name: &str) -> std::io::Result<()> {
        check_entry_name(display_name)?;
        let folder = self.start_menu_folder(display_name);
        match fs::remove_dir_all(&folder) {
            Ok(()) => debug!("Removed {:?}", folder),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }

        remove_file_if_present(&self.desktop_entry(display_name))?;
        self.remove_autostart(display_name)?;

        info!("Removed launch entries for {}", display_name);
        Ok(())
    }

    /// Start `target` at login
    pub fn create_autostart(&self, target: &Path, display_name: &str) -> std::io::Result<()> {
        check_entry_name(display_name)?;
        fs::create_dir_all(&self.autostart_dir)?;
        fs::write(
            self.autostart_entry(display_name),
            self.entry_contents(target, display_name),
        )?;
        info!("Enabled autostart for {:?}", target);
        Ok(())
    }

    pub fn remove_autostart(&self, display_name: &str) -> std::io::Result<()> {
        check_entry_name(display_name)?;
        remove_file_if_present(&self.autostart_entry(display_name))
    }
}

/// Entry names become path components under the shared directories
fn check_entry_name(display_name: &str) -> io::Result<()> {
    if is_plain_file_name(display_name) {
        Ok(())
    } else {
        Err(io::Error::new(
            ErrorKind::InvalidInput,
            format!("{display_name:?} cannot name a launch entry"),
        ))
    }
}

fn remove_file_if_present(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!("Removed {:?}", path);
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
