//! Wizard State Machine
//!
//! Decides which page the setup wizard shows and which events each page
//! accepts. Rendering lives elsewhere; this module is the transition table.
//!
//! # State Flow
//!
//! ```text
//! Welcome ──start──▶ Legal ──accept──▶ Install ──install──▶ Progress ─┬─▶ Complete
//!    │                                    ▲                            └─▶ Failed ──back──┐
//!    └──start (upgrading, installed)──────┼──────────────▶ Progress                       │
//!                                         └───────────────────────────────────────────────┘
//!
//! Remove ──remove──▶ RemoveProgress ─┬─▶ RemoveDone
//!    ▲                               └─▶ RemoveFailed ──back──┐
//!    └────────────────────────────────────────────────────────┘
//! ```
//!
//! Progress pages only accept engine outcomes. Every other page accepts Exit.

use crate::cli::ProcessMode;
use strum::{Display, EnumIter};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum WizardState {
    Welcome,
    Legal,
    Install,
    Progress,
    Complete,
    Failed,
    Remove,
    RemoveProgress,
    RemoveDone,
    RemoveFailed,
    /// Product activation flow entered with `/register`
    License,
}

impl WizardState {
    /// Pages the wizard ends on; Exit closes the process from here
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Complete | Self::Failed | Self::RemoveDone | Self::RemoveFailed | Self::License
        )
    }

    /// Pages shown while the engine is running
    #[inline]
    pub const fn is_running(self) -> bool {
        matches!(self, Self::Progress | Self::RemoveProgress)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum WizardEvent {
    Start,
    Accept,
    /// Install path confirmed; the caller has already taken the product lock
    /// and validated the directory
    Install,
    Remove,
    EngineSucceeded,
    EngineFailed,
    Back,
    Launch,
    Exit,
}

/// Side effect the driver performs after entering the next state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum WizardEffect {
    RunInstall,
    RunUninstall,
    /// Start the installed product, then exit
    LaunchProduct,
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub next: WizardState,
    pub effect: Option<WizardEffect>,
}

impl Transition {
    const fn to(next: WizardState) -> Self {
        Self { next, effect: None }
    }

    const fn with(next: WizardState, effect: WizardEffect) -> Self {
        Self {
            next,
            effect: Some(effect),
        }
    }
}

/// Errors that can occur during wizard transitions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WizardTransitionError {
    #[error("Event {event} is not accepted on page {state}")]
    InvalidEvent { state: WizardState, event: WizardEvent },

    #[error("Page {state} is final and only accepts Exit")]
    FromTerminalState { state: WizardState },
}

/// First page for a launch, or the decision not to show the wizard at all
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Initial {
    Show(WizardState),
    /// Removal requested for a product that is not installed
    AlreadyUninstalled,
}

pub fn initial_state(mode: ProcessMode, installed: bool) -> Initial {
    match (mode, installed) {
        (ProcessMode::Register, _) => Initial::Show(WizardState::License),
        (ProcessMode::Uninstall, true) => Initial::Show(WizardState::Remove),
        (ProcessMode::Uninstall, false) => Initial::AlreadyUninstalled,
        (ProcessMode::Upgrade, _) => Initial::Show(WizardState::Welcome),
        (ProcessMode::Install, true) => Initial::Show(WizardState::Remove),
        (ProcessMode::Install, false) => Initial::Show(WizardState::Welcome),
    }
}

/// Owns the current page for one run of the wizard
#[derive(Debug, Clone)]
pub struct WizardStateMachine {
    state: WizardState,
    upgrading: bool,
    installed: bool,
    history: Vec<WizardState>,
}

impl WizardStateMachine {
    /// `None` when the wizard should not be shown
    pub fn start(mode: ProcessMode, installed: bool) -> Option<Self> {
        match initial_state(mode, installed) {
            Initial::Show(state) => Some(Self {
                state,
                upgrading: mode == ProcessMode::Upgrade,
                installed,
                history: vec![state],
            }),
            Initial::AlreadyUninstalled => None,
        }
    }

    #[inline]
    pub fn state(&self) -> WizardState {
        self.state
    }

    pub fn history(&self) -> &[WizardState] {
        &self.history
    }

    /// Apply `event` to the current page
    pub fn fire(&mut self, event: WizardEvent) -> Result<Transition, WizardTransitionError> {
        let transition = Self::transition(self.state, event, self.upgrading, self.installed)?;
        if transition.next != self.state {
            self.history.push(transition.next);
        }
        self.state = transition.next;
        Ok(transition)
    }

    /// The transition table
    pub fn transition(
        state: WizardState,
        event: WizardEvent,
        upgrading: bool,
        installed: bool,
    ) -> Result<Transition, WizardTransitionError> {
        use WizardEvent as E;
        use WizardState as S;

        let transition = match (state, event) {
            (s, E::Exit) if !s.is_running() => Transition::with(s, WizardEffect::Exit),

            // An upgrade over an existing install reuses the recorded path
            (S::Welcome, E::Start) if upgrading && installed => Transition::with(S::Progress, WizardEffect::RunInstall),
            (S::Welcome, E::Start) => Transition::to(S::Legal),

            (S::Legal, E::Accept) => Transition::to(S::Install),
            (S::Legal, E::Back) => Transition::to(S::Welcome),

            (S::Install, E::Install) => Transition::with(S::Progress, WizardEffect::RunInstall),
            (S::Install, E::Back) => Transition::to(S::Legal),

            (S::Progress, E::EngineSucceeded) => Transition::to(S::Complete),
            (S::Progress, E::EngineFailed) => Transition::to(S::Failed),

            (S::Complete, E::Launch) => Transition::with(S::Complete, WizardEffect::LaunchProduct),
            (S::Failed, E::Back) => Transition::to(S::Install),

            (S::Remove, E::Remove) => Transition::with(S::RemoveProgress, WizardEffect::RunUninstall),

            (S::RemoveProgress, E::EngineSucceeded) => Transition::to(S::RemoveDone),
            (S::RemoveProgress, E::EngineFailed) => Transition::to(S::RemoveFailed),

            (S::RemoveFailed, E::Back) => Transition::to(S::Remove),

            (s, _) if s.is_terminal() => return Err(WizardTransitionError::FromTerminalState { state: s }),
            (state, event) => return Err(WizardTransitionError::InvalidEvent { state, event }),
        };
        Ok(transition)
    }
}
