//! Step execution.
//!
//! Install runs are fail-fast: the first failed Fatal step ends the run before
//! the install record is written. Uninstall runs attempt every step; file and
//! directory removal failures collapse into a single `in_use` flag.

use super::plan::{DeploymentPlan, DeploymentStep, InstallPlan, RunKind, StepAction, StepPolicy, UninstallPlan};
use super::progress::ProgressState;
use crate::activation::{ActivationFile, ActivationStore};
use crate::cancel::CancelToken;
use crate::config::{ProductInfo, SetupConfig};
use crate::config_store::{ConfigStore, UninstallRegistration};
use crate::payload::{self, CopyError, PayloadSource, StagingDir};
use crate::service::{ServiceControl, ServiceController, ServiceOutcome, ServiceVerb};
use crate::shortcuts::ShortcutManager;
use chrono::NaiveDate;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Everything a run needs, fixed before the first step executes
#[derive(Clone)]
pub struct DeploymentContext {
    pub product: ProductInfo,
    pub install_path: PathBuf,
    pub service: Arc<dyn ServiceControl>,
    pub store: ConfigStore,
    pub shortcuts: ShortcutManager,
    pub payload: Arc<dyn PayloadSource>,
    pub activation: Arc<dyn ActivationStore>,
    pub cancel: CancelToken,
    /// Stamped into the uninstall registration
    pub install_date: NaiveDate,
}

impl DeploymentContext {
    /// Wire the stock collaborators described by `config` for `install_path`
    pub fn from_config(config: &SetupConfig, install_path: impl Into<PathBuf>, cancel: CancelToken) -> Self {
        let install_path = install_path.into();
        let product = config.product.clone();
        Self {
            service: Arc::new(ServiceController::in_install_dir(
                &install_path,
                &product.service_executable,
                config.service_timeout(),
            )),
            store: ConfigStore::for_product(&config.state_dir, &product),
            shortcuts: ShortcutManager::new(
                &config.start_menu_dir,
                &config.desktop_dir,
                &config.autostart_dir,
                &product.comments,
            ),
            payload: Arc::new(StagingDir::new(&config.staging_dir, config.payload_files.clone())),
            activation: Arc::new(ActivationFile::for_product(&config.state_dir, &product.id)),
            install_date: chrono::Local::now().date_naive(),
            product,
            install_path,
            cancel,
        }
    }

    /// Plan for `kind` over the names the payload source lists
    pub fn plan(&self, kind: RunKind) -> DeploymentPlan {
        let names = self.payload.list_payload_names();
        match kind {
            RunKind::Install => InstallPlan::build(&names),
            RunKind::Uninstall => UninstallPlan::build(&names),
        }
    }

    /// Fatal failure for an install whose staged payload is incomplete
    pub fn check_staged_payload(&self) -> Option<StepFailure> {
        let missing = self.payload.missing_payload_names();
        if missing.is_empty() {
            return None;
        }
        error!("Staged payload is incomplete: {:?}", missing);
        Some(StepFailure {
            step: "Check payload".to_string(),
            message: format!(
                "The setup package is incomplete; missing {}. {}",
                missing.join(", "),
                self.product.support_line()
            ),
        })
    }
}

/// Fatal failure shown to the user
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{step}: {message}")]
pub struct StepFailure {
    pub step: String,
    /// Ends with the support contact line
    pub message: String,
}

/// Result of one run, kept by the session for the outcome pages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub kind: RunKind,
    /// The Fatal failure that ended the run, if any
    pub failure: Option<StepFailure>,
    /// Best-effort failures worth showing, in order
    pub warnings: Vec<String>,
    /// Some payload file or the install directory could not be removed
    pub in_use: bool,
    /// Steps that started, including the one that failed
    pub steps_attempted: usize,
    pub percent: u8,
}

impl RunReport {
    /// Report for a run that failed before its first step
    pub fn not_started(kind: RunKind, failure: StepFailure) -> Self {
        Self {
            kind,
            failure: Some(failure),
            warnings: Vec::new(),
            in_use: false,
            steps_attempted: 0,
            percent: 0,
        }
    }

    /// No Fatal step failed
    #[inline]
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}

/// Notifications from a running engine, in the order they happen
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    StepStarted { index: usize, name: String },
    /// `ok` is false for best-effort failures too
    StepFinished { index: usize, name: String, ok: bool },
    /// New percentage after each finished step
    Progress(u8),
    Warning(String),
    /// Last event of a spawned run
    Finished(RunReport),
}

/// Why a single step did not succeed
#[derive(Debug)]
enum StepError {
    Failed(String),
    /// Removal blocked by something still holding the file
    InUse(String),
}

impl StepError {
    fn message(&self) -> &str {
        match self {
            Self::Failed(m) | Self::InUse(m) => m,
        }
    }
}

type StepResult = std::result::Result<(), StepError>;

/// Execute `plan` on the calling thread, reporting through `on_event`.
///
/// `Finished` is not emitted here; the returned report is the final word.
pub fn run(plan: &DeploymentPlan, ctx: &DeploymentContext, mut on_event: impl FnMut(EngineEvent)) -> RunReport {
    let kind = plan.kind();
    let total = plan.len();
    let mut progress = ProgressState::new(plan.total_weight());
    let mut report = RunReport {
        kind,
        failure: None,
        warnings: Vec::new(),
        in_use: false,
        steps_attempted: 0,
        percent: 0,
    };

    info!("{} of {} to {:?}: {} steps", kind, ctx.product.display_name, ctx.install_path, total);

    for (index, step) in plan.steps().iter().enumerate() {
        if kind == RunKind::Install && ctx.cancel.is_cancelled() {
            warn!("Install cancelled before {}", step.name);
            report.failure = Some(StepFailure {
                step: step.name.clone(),
                message: format!("Installation was cancelled. {}", ctx.product.support_line()),
            });
            break;
        }

        info!("[{}/{}] {}", index + 1, total, step.name);
        on_event(EngineEvent::StepStarted {
            index,
            name: step.name.clone(),
        });
        report.steps_attempted += 1;

        let result = execute_step(step, ctx);
        let ok = result.is_ok();

        match result {
            Ok(()) => debug!("{} done", step.name),
            Err(err) => match (step.policy, err) {
                (StepPolicy::Fatal, err) => {
                    error!("{} failed: {}", step.name, err.message());
                    report.failure = Some(StepFailure {
                        step: step.name.clone(),
                        message: format!("{} {}", err.message(), ctx.product.support_line()),
                    });
                    on_event(EngineEvent::StepFinished {
                        index,
                        name: step.name.clone(),
                        ok,
                    });
                    if kind == RunKind::Install {
                        break;
                    }
                    continue;
                }
                (StepPolicy::BestEffort, StepError::InUse(message)) => {
                    warn!("{}", message);
                    report.in_use = true;
                }
                (StepPolicy::BestEffort, StepError::Failed(message)) => {
                    warn!("{} failed (continuing): {}", step.name, message);
                    report.warnings.push(message.clone());
                    on_event(EngineEvent::Warning(message));
                }
            },
        }

        report.percent = progress.advance(step.weight);
        on_event(EngineEvent::StepFinished {
            index,
            name: step.name.clone(),
            ok,
        });
        on_event(EngineEvent::Progress(report.percent));
    }

    if report.in_use {
        let message = "One or more files were in use and could not be removed".to_string();
        warn!("{}", message);
        report.warnings.push(message.clone());
        on_event(EngineEvent::Warning(message));
    }

    match &report.failure {
        None => info!("{} finished ({}%)", kind, report.percent),
        Some(failure) => error!("{} failed at {}", kind, failure.step),
    }
    report
}

/// Execute `plan` on a dedicated worker thread.
///
/// Events arrive on the returned receiver, ending with `Finished`.
pub fn spawn(
    plan: DeploymentPlan,
    ctx: DeploymentContext,
) -> std::io::Result<(JoinHandle<RunReport>, Receiver<EngineEvent>)> {
    let (tx, rx) = mpsc::channel();
    let handle = thread::Builder::new()
        .name("deployment".to_string())
        .spawn(move || {
            let report = run(&plan, &ctx, |event| {
                // Receiver gone means nobody is watching; keep going regardless
                let _ = tx.send(event);
            });
            let _ = tx.send(EngineEvent::Finished(report.clone()));
            report
        })?;
    Ok((handle, rx))
}

// ============================================================================
// Step Actions
// ============================================================================

fn execute_step(step: &DeploymentStep, ctx: &DeploymentContext) -> StepResult {
    match &step.action {
        StepAction::StopService => service_step(ctx, ServiceVerb::Stop, true),
        StepAction::UninstallService => service_step(ctx, ServiceVerb::Uninstall, true),
        StepAction::InstallService => service_step(ctx, ServiceVerb::Install, false),
        StepAction::StartService => service_step(ctx, ServiceVerb::Start, false),
        StepAction::CopyPayload { name } => copy_step(ctx, name),
        StepAction::WriteRegistration => {
            let registration = UninstallRegistration::for_product(&ctx.product, &ctx.install_path, ctx.install_date);
            ctx.store
                .write_uninstall_registration(&registration)
                .map_err(|e| StepError::Failed(format!("Could not register {} for removal: {}.", ctx.product.display_name, e)))
        }
        StepAction::WriteInstallRecord => ctx
            .store
            .write_install_path(&ctx.install_path)
            .map_err(|e| StepError::Failed(format!("Could not record the install path: {}.", e))),
        StepAction::CreateShortcuts => {
            let target = ctx.install_path.join(&ctx.product.main_executable);
            ctx.shortcuts
                .create(&target, &ctx.product.display_name)
                .map_err(|e| StepError::Failed(format!("Shortcuts could not be created: {}", e)))
        }
        StepAction::RemoveShortcuts => ctx
            .shortcuts
            .remove(&ctx.product.display_name)
            .map_err(|e| StepError::Failed(format!("Shortcuts could not be removed: {}", e))),
        StepAction::DeletePayload { name } => {
            let path = ctx.install_path.join(name);
            payload::remove_payload_file(&path)
                .map(|_| ())
                .map_err(|e| StepError::InUse(format!("{:?} was in use: {}", path, e)))
        }
        StepAction::RemoveRegistration => ctx
            .store
            .remove_uninstall_registration()
            .map(|_| ())
            .map_err(|e| StepError::Failed(format!("Program registration could not be removed: {}", e))),
        StepAction::DeleteInstallDir => match fs::remove_dir(&ctx.install_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StepError::InUse(format!("{:?} could not be removed: {}", ctx.install_path, e))),
        },
        StepAction::RevokeAndForget => {
            if let Err(e) = ctx.activation.revoke() {
                warn!("Activation could not be revoked: {}", e);
            }
            ctx.store
                .remove_install_path()
                .map(|_| ())
                .map_err(|e| StepError::Failed(format!("The installation record could not be removed: {}.", e)))
        }
    }
}

fn service_step(ctx: &DeploymentContext, verb: ServiceVerb, skip_if_absent: bool) -> StepResult {
    if skip_if_absent && !ctx.service.is_present() {
        debug!("No service to {}", verb);
        return Ok(());
    }

    match ctx.service.execute(verb, &ctx.cancel) {
        ServiceOutcome::Success => Ok(()),
        outcome => Err(StepError::Failed(format!("Service {} {}.", verb, outcome))),
    }
}

fn copy_step(ctx: &DeploymentContext, name: &str) -> StepResult {
    fs::create_dir_all(&ctx.install_path).map_err(|e| {
        StepError::Failed(format!("Could not create {:?}: {}.", ctx.install_path, e))
    })?;

    let source = ctx.payload.staged_path_of(name);
    let dest = ctx.install_path.join(name);

    match payload::copy_payload_file(&source, &dest, &ctx.cancel) {
        Ok(_) => Ok(()),
        Err(CopyError::DestinationInUse { path, .. }) => Err(StepError::Failed(format!(
            "{:?} is in use by a running program. Please choose a different install directory.",
            path
        ))),
        Err(CopyError::Cancelled { .. }) => Err(StepError::Failed("Installation was cancelled.".to_string())),
        Err(e) => Err(StepError::Failed(format!("{}.", e))),
    }
}
