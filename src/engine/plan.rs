//! Deployment plans
//!
//! Translates a run kind and the payload manifest into the ordered list of
//! [`DeploymentStep`]s the runner executes.
//!
//! | Run       | Steps generated |
//! |-----------|-----------------|
//! | Install   | Stop → Uninstall service → Copy × N → Install service → Start → Register → Record → Shortcuts |
//! | Uninstall | Shortcuts → Stop → Uninstall service → Delete × N → Unregister → Delete dir → Revoke + forget |
//!
//! # Design
//!
//! - **Pure logic**: no I/O, the plan only describes work
//! - **Uniform policy**: every step carries Fatal or BestEffort, the runner
//!   applies it without special cases
//! - **Single commit point**: on install only `WriteInstallRecord` marks the
//!   product installed, and every Fatal step precedes it

use std::fmt;
use strum::Display;

// ============================================================================
// Step Types
// ============================================================================

/// Which of the two step sequences a run executes.
///
/// Upgrade launches run [`RunKind::Install`]; its pre-clean steps stop and
/// unregister the previous service before the new payload is copied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum RunKind {
    Install,
    Uninstall,
}

/// What happens when a step fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum StepPolicy {
    /// Failure ends an install run and is reported to the user
    Fatal,
    /// Failure is logged and recorded as a warning; the run continues
    BestEffort,
}

/// A single unit of deployment work
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepAction {
    StopService,
    UninstallService,
    /// Copy `<staging>/<name>` to `<install_path>/<name>`
    CopyPayload { name: String },
    InstallService,
    StartService,
    WriteRegistration,
    /// Commit point of an install
    WriteInstallRecord,
    CreateShortcuts,
    RemoveShortcuts,
    DeletePayload { name: String },
    RemoveRegistration,
    DeleteInstallDir,
    /// Commit point of an uninstall: revoke activation and delete the record
    RevokeAndForget,
}

impl fmt::Display for StepAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StopService => write!(f, "Stop background service"),
            Self::UninstallService => write!(f, "Uninstall background service"),
            Self::CopyPayload { name } => write!(f, "Copy {}", name),
            Self::InstallService => write!(f, "Install background service"),
            Self::StartService => write!(f, "Start background service"),
            Self::WriteRegistration => write!(f, "Register for program removal"),
            Self::WriteInstallRecord => write!(f, "Record install path"),
            Self::CreateShortcuts => write!(f, "Create shortcuts"),
            Self::RemoveShortcuts => write!(f, "Remove shortcuts"),
            Self::DeletePayload { name } => write!(f, "Remove {}", name),
            Self::RemoveRegistration => write!(f, "Remove program registration"),
            Self::DeleteInstallDir => write!(f, "Remove install directory"),
            Self::RevokeAndForget => write!(f, "Remove installation record"),
        }
    }
}

/// One entry of a plan: the action plus how its failure is handled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentStep {
    /// Shown on the progress page and in the log
    pub name: String,
    pub action: StepAction,
    pub policy: StepPolicy,
    /// Share of the run's progress bar (always >= 1)
    pub weight: u32,
}

impl DeploymentStep {
    fn new(action: StepAction, policy: StepPolicy) -> Self {
        Self {
            name: action.to_string(),
            action,
            policy,
            weight: 1,
        }
    }

    fn fatal(action: StepAction) -> Self {
        Self::new(action, StepPolicy::Fatal)
    }

    fn best_effort(action: StepAction) -> Self {
        Self::new(action, StepPolicy::BestEffort)
    }
}

// ============================================================================
// Plans
// ============================================================================

/// Ordered steps for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentPlan {
    kind: RunKind,
    steps: Vec<DeploymentStep>,
}

impl DeploymentPlan {
    pub fn kind(&self) -> RunKind {
        self.kind
    }

    /// Steps in execution order
    pub fn steps(&self) -> &[DeploymentStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Sum of all step weights; the denominator of the progress percentage.
    ///
    /// Equals [`len`](Self::len) while every step weighs 1.
    pub fn total_weight(&self) -> u64 {
        self.steps.iter().map(|s| u64::from(s.weight)).sum()
    }

    /// Position of the step that commits this run's outcome to the store
    pub fn commit_index(&self) -> Option<usize> {
        let commit = match self.kind {
            RunKind::Install => StepAction::WriteInstallRecord,
            RunKind::Uninstall => StepAction::RevokeAndForget,
        };
        self.steps.iter().position(|s| s.action == commit)
    }
}

/// Builder for the install sequence
pub struct InstallPlan;

impl InstallPlan {
    /// `payload_names.len() + 7` steps. Everything before the record write
    /// is Fatal except the two pre-clean service steps.
    pub fn build(payload_names: &[String]) -> DeploymentPlan {
        let mut steps = Vec::with_capacity(payload_names.len() + 7);

        // Pre-clean: a previous version may or may not be present
        steps.push(DeploymentStep::best_effort(StepAction::StopService));
        steps.push(DeploymentStep::best_effort(StepAction::UninstallService));

        steps.extend(payload_names.iter().map(|name| {
            DeploymentStep::fatal(StepAction::CopyPayload { name: name.clone() })
        }));

        steps.push(DeploymentStep::fatal(StepAction::InstallService));
        steps.push(DeploymentStep::fatal(StepAction::StartService));
        steps.push(DeploymentStep::fatal(StepAction::WriteRegistration));
        steps.push(DeploymentStep::fatal(StepAction::WriteInstallRecord));
        steps.push(DeploymentStep::best_effort(StepAction::CreateShortcuts));

        DeploymentPlan {
            kind: RunKind::Install,
            steps,
        }
    }
}

/// Builder for the removal sequence, mirroring [`InstallPlan`]
pub struct UninstallPlan;

impl UninstallPlan {
    /// `payload_names.len() + 6` steps, payload deleted in manifest order
    pub fn build(payload_names: &[String]) -> DeploymentPlan {
        let mut steps = Vec::with_capacity(payload_names.len() + 6);

        steps.push(DeploymentStep::best_effort(StepAction::RemoveShortcuts));
        steps.push(DeploymentStep::best_effort(StepAction::StopService));
        steps.push(DeploymentStep::best_effort(StepAction::UninstallService));

        steps.extend(payload_names.iter().map(|name| {
            DeploymentStep::best_effort(StepAction::DeletePayload { name: name.clone() })
        }));

        steps.push(DeploymentStep::best_effort(StepAction::RemoveRegistration));
        steps.push(DeploymentStep::best_effort(StepAction::DeleteInstallDir));
        // Only this failure can turn a removal into RemoveFailed
        steps.push(DeploymentStep::fatal(StepAction::RevokeAndForget));

        DeploymentPlan {
            kind: RunKind::Uninstall,
            steps,
        }
    }
}
