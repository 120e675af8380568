//! Hologram Setup Library
//!
//! Install, upgrade and removal orchestration for the Hologram product: a
//! wizard state machine on top of a step-sequenced deployment engine that
//! stages payload files, drives the background service and keeps the
//! installation record consistent with what is on disk.

pub mod activation;
pub mod cancel;
pub mod cli;
pub mod config;
pub mod config_store;
pub mod console;
pub mod engine;
pub mod error;
pub mod instance_guard;
pub mod logging;
pub mod payload;
pub mod process_guard;
pub mod service;
pub mod session;
pub mod shortcuts;
pub mod wizard;

// Re-export main types for convenience
pub use activation::{ActivationFile, ActivationStore};
pub use cancel::CancelToken;
pub use cli::{ModeSelection, ProcessMode};
pub use config::{ProductInfo, SetupConfig};
pub use config_store::{ConfigStore, InstallationRecord, UninstallRegistration};
pub use console::{ConsolePresenter, Presenter, UnattendedPresenter};
pub use engine::{
    DeploymentContext, DeploymentPlan, DeploymentStep, EngineEvent, InstallPlan, ProgressState, RunKind,
    RunReport, StepAction, StepFailure, StepPolicy, UninstallPlan,
};
pub use error::SetupError;
pub use instance_guard::InstanceLock;
pub use payload::{PayloadSource, StagingDir};
pub use process_guard::{ChildRegistry, CommandProcessGroup, TrackedChild};
pub use service::{ServiceControl, ServiceController, ServiceOutcome, ServiceVerb};
pub use session::{RunContext, Session, SessionOutcome};
pub use shortcuts::ShortcutManager;
pub use wizard::{WizardEvent, WizardState, WizardStateMachine, WizardTransitionError};
