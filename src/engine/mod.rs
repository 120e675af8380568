//! Deployment engine: turns a run kind and a payload manifest into an ordered
//! step plan, then executes it with the install or uninstall failure policy.
//!
//! `plan` is pure data, `progress` is the per-run percent tracker and
//! `runner` does the I/O, either inline or on a worker thread.

pub mod plan;
pub mod progress;
pub mod runner;

pub use plan::{DeploymentPlan, DeploymentStep, InstallPlan, RunKind, StepAction, StepPolicy, UninstallPlan};
pub use progress::ProgressState;
pub use runner::{DeploymentContext, EngineEvent, RunReport, StepFailure, run, spawn};
