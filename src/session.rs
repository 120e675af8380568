//! One launch of the orchestrator: resolves what to do, walks the wizard and
//! runs the deployment engine on a worker thread when a page asks for it.

use crate::cancel::CancelToken;
use crate::cli::{ModeSelection, ProcessMode};
use crate::config::SetupConfig;
use crate::config_store::ConfigStore;
use crate::console::{InstallOptions, Notice, PageView, Presenter};
use crate::engine::{self, DeploymentContext, DeploymentPlan, EngineEvent, RunKind, RunReport, StepFailure};
use crate::error::{Result, SetupError};
use crate::instance_guard::InstanceLock;
use crate::shortcuts::ShortcutManager;
use crate::wizard::{WizardEffect, WizardEvent, WizardState, WizardStateMachine};
use std::fs;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{error, info, warn};

/// Facts fixed at startup and shared read-only by the wizard and engine
#[derive(Debug, Clone)]
pub struct RunContext {
    pub mode: ProcessMode,
    pub serial: String,
    pub installed: bool,
    pub recorded_install_path: Option<PathBuf>,
    /// Offered on the Install page
    pub default_install_dir: PathBuf,
    pub autostart: bool,
    pub config: SetupConfig,
}

impl RunContext {
    pub fn new(config: SetupConfig, selection: ModeSelection, install_dir: Option<PathBuf>, autostart: bool) -> Self {
        let store = ConfigStore::for_product(&config.state_dir, &config.product);
        let recorded_install_path = store.read_installation_record().map(|record| record.install_path);
        let installed = recorded_install_path.is_some();
        info!(
            "Mode {}, installed: {} ({:?})",
            selection.mode, installed, recorded_install_path
        );

        Self {
            mode: selection.mode,
            serial: selection.serial,
            installed,
            recorded_install_path,
            default_install_dir: install_dir.unwrap_or_else(|| config.default_install_dir.clone()),
            autostart,
            config,
        }
    }
}

/// Take the orchestrator-wide lock, held until the returned guard drops.
///
/// Refused with [`SetupError::AlreadyRunning`] while any other setup process
/// (of any product) holds it.
pub fn acquire_setup_lock(config: &SetupConfig) -> Result<InstanceLock> {
    InstanceLock::try_acquire(&config.lock_dir, &config.setup_lock_name)?
        .ok_or_else(|| SetupError::AlreadyRunning(config.product.setup_executable.clone()))
}

/// How the wizard ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    /// `None` when the wizard was never shown
    pub final_state: Option<WizardState>,
    pub report: Option<RunReport>,
    pub launched: bool,
    /// Gave up on a page whose precondition (product lock, install
    /// directory) could not be met
    pub blocked: bool,
}

impl SessionOutcome {
    pub fn exit_code(&self) -> i32 {
        match self.final_state {
            _ if self.blocked => 1,
            Some(WizardState::Failed | WizardState::RemoveFailed) => 1,
            _ => 0,
        }
    }
}

pub struct Session<'a, P: Presenter> {
    ctx: &'a RunContext,
    presenter: P,
    cancel: CancelToken,
    install_path: PathBuf,
    autostart: bool,
    last_report: Option<RunReport>,
}

impl<'a, P: Presenter> Session<'a, P> {
    pub fn new(ctx: &'a RunContext, presenter: P, cancel: CancelToken) -> Self {
        let install_path = ctx
            .recorded_install_path
            .clone()
            .unwrap_or_else(|| ctx.default_install_dir.clone());
        Self {
            ctx,
            presenter,
            cancel,
            install_path,
            autostart: ctx.autostart,
            last_report: None,
        }
    }

    /// Presenter driving this session
    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    pub fn run(&mut self) -> Result<SessionOutcome> {
        let ctx: &'a RunContext = self.ctx;
        let product = &ctx.config.product;

        let Some(mut wizard) = WizardStateMachine::start(ctx.mode, ctx.installed) else {
            info!("Nothing to remove");
            self.presenter
                .notify(Notice::Info, &format!("{} is already uninstalled.", product.display_name));
            return Ok(SessionOutcome {
                final_state: None,
                report: None,
                launched: false,
                blocked: false,
            });
        };

        if ctx.mode == ProcessMode::Register {
            info!("Registration requested (serial {:?})", ctx.serial);
        }

        loop {
            let state = wizard.state();
            let event = match state {
                WizardState::Install => match self.install_page() {
                    Some(event) => event,
                    None if self.presenter.retry() => continue,
                    None => return Ok(self.blocked(state)),
                },
                _ => {
                    let view = PageView {
                        product: &product.display_name,
                        version: &product.version,
                        install_path: &self.install_path,
                        last_report: self.last_report.as_ref(),
                    };
                    self.presenter.choose(state, &view)
                }
            };

            // The product lock is checked before leaving the page, so a refusal
            // keeps the user where they were
            let peek = WizardStateMachine::transition(state, event, ctx.mode == ProcessMode::Upgrade, ctx.installed);
            let run_kind = match peek.map(|t| t.effect) {
                Ok(Some(WizardEffect::RunInstall)) => Some(RunKind::Install),
                Ok(Some(WizardEffect::RunUninstall)) => Some(RunKind::Uninstall),
                _ => None,
            };
            let product_lock = match run_kind {
                Some(_) => match InstanceLock::try_acquire(&ctx.config.lock_dir, &ctx.config.product_lock_name)? {
                    Some(lock) => Some(lock),
                    None => {
                        warn!("{} is running, refusing to continue", product.display_name);
                        self.presenter.notify(
                            Notice::Error,
                            &format!("{} is running. Close it before continuing.", product.display_name),
                        );
                        if self.presenter.retry() {
                            continue;
                        }
                        return Ok(self.blocked(state));
                    }
                },
                None => None,
            };

            let transition = match wizard.fire(event) {
                Ok(t) => t,
                Err(e) => {
                    warn!("Ignoring event: {}", e);
                    continue;
                }
            };

            match transition.effect {
                None => {}
                Some(WizardEffect::Exit) => return Ok(self.outcome(Some(state), false)),
                Some(WizardEffect::LaunchProduct) => {
                    let launched = self.launch_product();
                    return Ok(self.outcome(Some(state), launched));
                }
                Some(WizardEffect::RunInstall) => {
                    let succeeded = self.run_engine(RunKind::Install);
                    drop(product_lock);
                    wizard.fire(engine_event(succeeded))?;
                }
                Some(WizardEffect::RunUninstall) => {
                    let succeeded = self.run_engine(RunKind::Uninstall);
                    drop(product_lock);
                    wizard.fire(engine_event(succeeded))?;
                }
            }
        }
    }

    fn outcome(&self, final_state: Option<WizardState>, launched: bool) -> SessionOutcome {
        SessionOutcome {
            final_state,
            report: self.last_report.clone(),
            launched,
            blocked: false,
        }
    }

    /// Stopped on `state` because a precondition kept failing
    fn blocked(&self, state: WizardState) -> SessionOutcome {
        SessionOutcome {
            blocked: true,
            ..self.outcome(Some(state), false)
        }
    }

    /// `None` keeps the user on the Install page
    fn install_page(&mut self) -> Option<WizardEvent> {
        let defaults = InstallOptions {
            install_dir: self.install_path.clone(),
            autostart: self.autostart,
        };
        let Some(options) = self.presenter.install_options(&defaults) else {
            return Some(WizardEvent::Back);
        };

        match validate_install_dir(&options.install_dir) {
            Ok(()) => {
                self.install_path = options.install_dir;
                self.autostart = options.autostart;
                Some(WizardEvent::Install)
            }
            Err(message) => {
                warn!("{}", message);
                self.presenter.notify(Notice::Error, &message);
                None
            }
        }
    }

    fn shortcuts(&self) -> ShortcutManager {
        let config = &self.ctx.config;
        ShortcutManager::new(
            &config.start_menu_dir,
            &config.desktop_dir,
            &config.autostart_dir,
            &config.product.comments,
        )
    }

    fn prepare_autostart(&mut self) {
        if !self.autostart {
            return;
        }
        let product = &self.ctx.config.product;
        let target = self.install_path.join(&product.main_executable);
        if let Err(e) = self.shortcuts().create_autostart(&target, &product.display_name) {
            warn!("Autostart entry could not be written: {}", e);
            self.presenter
                .notify(Notice::Warning, &format!("{} will not start at login: {}", product.display_name, e));
        }
    }

    /// Run the plan on a worker thread, forwarding its events. Returns whether it succeeded.
    fn run_engine(&mut self, kind: RunKind) -> bool {
        let deployment = DeploymentContext::from_config(&self.ctx.config, &self.install_path, self.cancel.clone());
        let plan = deployment.plan(kind);

        let preflight = match kind {
            RunKind::Install => deployment.check_staged_payload(),
            RunKind::Uninstall => None,
        };
        let report = match preflight {
            Some(failure) => RunReport::not_started(kind, failure),
            None => {
                if kind == RunKind::Install {
                    self.prepare_autostart();
                }
                self.spawn_engine(kind, plan, deployment)
            }
        };

        if let Some(failure) = &report.failure {
            self.presenter.notify(Notice::Error, &failure.message);
        }
        let succeeded = report.succeeded();
        self.last_report = Some(report);
        succeeded
    }

    fn spawn_engine(&mut self, kind: RunKind, plan: DeploymentPlan, deployment: DeploymentContext) -> RunReport {
        match engine::spawn(plan, deployment) {
            Ok((handle, events)) => {
                let mut finished = None;
                for event in events {
                    self.presenter.engine_event(&event);
                    if let EngineEvent::Finished(report) = event {
                        finished = Some(report);
                    }
                }
                match (handle.join(), finished) {
                    (Ok(report), _) => report,
                    (Err(_), Some(report)) => report,
                    (Err(_), None) => self.aborted_report(kind, "The deployment worker stopped unexpectedly."),
                }
            }
            Err(e) => {
                error!("Could not start deployment worker: {}", e);
                self.aborted_report(kind, &format!("The deployment could not be started: {e}."))
            }
        }
    }

    fn aborted_report(&self, kind: RunKind, message: &str) -> RunReport {
        RunReport::not_started(
            kind,
            StepFailure {
                step: kind.to_string(),
                message: format!("{} {}", message, self.ctx.config.product.support_line()),
            },
        )
    }

    fn launch_product(&mut self) -> bool {
        let exe = self.install_path.join(&self.ctx.config.product.main_executable);
        // Own process group, no parent-death signal: it outlives setup
        let result = Command::new(&exe)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .process_group(0)
            .spawn();

        match result {
            Ok(child) => {
                info!("Launched {:?} (pid {})", exe, child.id());
                true
            }
            Err(e) => {
                warn!("Could not launch {:?}: {}", exe, e);
                self.presenter
                    .notify(Notice::Warning, &format!("{} could not be started: {}", exe.display(), e));
                false
            }
        }
    }
}

fn engine_event(succeeded: bool) -> WizardEvent {
    if succeeded {
        WizardEvent::EngineSucceeded
    } else {
        WizardEvent::EngineFailed
    }
}

/// Directory checks made before leaving the Install page
pub fn validate_install_dir(dir: &Path) -> std::result::Result<(), String> {
    if dir.as_os_str().is_empty() {
        return Err("Please choose an install directory.".to_string());
    }
    if !dir.is_absolute() {
        return Err(format!("{} is not an absolute path.", dir.display()));
    }
    fs::create_dir_all(dir)
        .map_err(|e| format!("Could not create {}: {}. Please choose a different directory.", dir.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_validate_install_dir() {
        let dir = tempdir().unwrap();
        assert!(validate_install_dir(Path::new("")).is_err());
        assert!(validate_install_dir(Path::new("relative/dir")).is_err());

        let target = dir.path().join("a/b");
        validate_install_dir(&target).unwrap();
        assert!(target.is_dir());

        // A file in the way cannot become a directory
        let blocked = dir.path().join("file");
        fs::write(&blocked, b"x").unwrap();
        assert!(validate_install_dir(&blocked.join("sub")).is_err());
    }

    #[test]
    fn test_exit_codes() {
        let outcome = |state| SessionOutcome {
            final_state: state,
            report: None,
            launched: false,
            blocked: false,
        };
        assert_eq!(outcome(Some(WizardState::Complete)).exit_code(), 0);
        let blocked = SessionOutcome {
            blocked: true,
            ..outcome(Some(WizardState::Install))
        };
        assert_eq!(blocked.exit_code(), 1);
        assert_eq!(outcome(Some(WizardState::Failed)).exit_code(), 1);
        assert_eq!(outcome(Some(WizardState::RemoveFailed)).exit_code(), 1);
        assert_eq!(outcome(None).exit_code(), 0);
    }
}
