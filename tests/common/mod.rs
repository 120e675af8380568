//! Shared fixtures for the integration tests.
//!
//! A [`Sandbox`] redirects every filesystem root of a [`SetupConfig`] into one
//! temporary directory and stages the nine-file payload there. The staged
//! service-control executable is a shell script that appends its arguments
//! to `service.log` and fails any verb with a matching `fail-<verb>` marker.

#![allow(dead_code)]

use hologram_setup::cli::ModeSelection;
use hologram_setup::config::SetupConfig;
use hologram_setup::config_store::ConfigStore;
use hologram_setup::session::RunContext;
use hologram_setup::shortcuts::ShortcutManager;
use hologram_setup::ProcessMode;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub struct Sandbox {
    pub root: TempDir,
    pub config: SetupConfig,
}

impl Sandbox {
    pub fn new() -> Self {
        let root = tempfile::tempdir().expect("tempdir");
        let base = root.path();
        let defaults = SetupConfig::default();
        let config = SetupConfig {
            staging_dir: base.join("staging"),
            state_dir: base.join("state"),
            log_dir: base.join("log"),
            lock_dir: base.join("lock"),
            default_install_dir: base.join("opt").join("Hologram"),
            start_menu_dir: base.join("menu"),
            desktop_dir: base.join("desktop"),
            autostart_dir: base.join("autostart"),
            service_timeout_secs: 20,
            ..defaults
        };

        let sandbox = Self { root, config };
        sandbox.stage_payload();
        sandbox
    }

    fn stage_payload(&self) {
        fs::create_dir_all(&self.config.staging_dir).expect("staging dir");
        for name in &self.config.payload_files {
            let path = self.config.staging_dir.join(name);
            if *name == self.config.product.service_executable {
                let script = format!(
                    "#!/bin/sh\nverb=${{2#/}}\nif [ -e \"{root}/fail-$verb\" ]; then exit 4; fi\necho \"$@\" >> \"{root}/service.log\"\nexit 0\n",
                    root = self.root.path().display()
                );
                fs::write(&path, script).expect("service script");
                fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod");
            } else {
                fs::write(&path, format!("payload {name}\n")).expect("payload file");
            }
        }
    }

    pub fn install_dir(&self) -> PathBuf {
        self.config.default_install_dir.clone()
    }

    pub fn store(&self) -> ConfigStore {
        ConfigStore::for_product(&self.config.state_dir, &self.config.product)
    }

    pub fn shortcuts(&self) -> ShortcutManager {
        ShortcutManager::new(
            &self.config.start_menu_dir,
            &self.config.desktop_dir,
            &self.config.autostart_dir,
            &self.config.product.comments,
        )
    }

    /// Make the service-control executable exit non-zero for `verb`
    pub fn fail_service(&self, verb: &str) {
        fs::write(self.root.path().join(format!("fail-{verb}")), b"").expect("marker");
    }

    /// Argument lines the service-control executable received, in order
    pub fn service_calls(&self) -> Vec<String> {
        fs::read_to_string(self.root.path().join("service.log"))
            .map(|log| log.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn context(&self, mode: ProcessMode, autostart: bool) -> RunContext {
        let selection = ModeSelection {
            mode,
            serial: String::new(),
        };
        RunContext::new(self.config.clone(), selection, None, autostart)
    }

    /// Replace an installed file with a non-empty directory; neither removal
    /// nor replacement of it can succeed
    pub fn lock_installed_file(&self, name: &str) -> PathBuf {
        let path = self.install_dir().join(name);
        let _ = fs::remove_file(&path);
        fs::create_dir_all(&path).expect("lock dir");
        fs::write(path.join("held"), b"x").expect("lock content");
        path
    }

    pub fn installed(&self, name: &str) -> bool {
        Path::new(&self.install_dir()).join(name).is_file()
    }
}
