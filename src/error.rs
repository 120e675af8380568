//! Error handling module for the setup orchestrator
//!
//! Step failures travel in the engine's `RunReport`. These errors cover the
//! installation store, the instance locks and the session driver.

use thiserror::Error;

/// Main error type for the setup orchestrator
#[derive(Error, Debug)]
pub enum SetupError {
    /// IO errors (store files, lock files)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Persistent installation state errors
    #[error("State store error: {0}")]
    Store(String),

    /// Single-instance lock errors
    #[error("Instance guard error: {0}")]
    Guard(String),

    /// The orchestrator-wide lock is held by another setup process
    #[error("Another instance of {0} is already running.\n\nClose the other instance of the program before running.")]
    AlreadyRunning(String),

    /// Wizard transition errors
    #[error("Wizard transition error: {0}")]
    Transition(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<crate::wizard::WizardTransitionError> for SetupError {
    fn from(e: crate::wizard::WizardTransitionError) -> Self {
        Self::Transition(e.to_string())
    }
}

/// Result type alias for setup operations
pub type Result<T> = std::result::Result<T, SetupError>;

// Convenient error constructors
impl SetupError {
    /// Create a state store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create an instance guard error
    pub fn guard(msg: impl Into<String>) -> Self {
        Self::Guard(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SetupError::store("record missing");
        assert_eq!(err.to_string(), "State store error: record missing");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: SetupError = io_err.into();
        assert!(matches!(err, SetupError::Io(_)));
    }

    #[test]
    fn test_error_constructors() {
        let err = SetupError::guard("already held");
        assert!(matches!(err, SetupError::Guard(_)));

        let err: SetupError = crate::wizard::WizardTransitionError::FromTerminalState {
            state: crate::wizard::WizardState::Complete,
        }
        .into();
        assert_eq!(err.to_string(), "Wizard transition error: Page Complete is final and only accepts Exit");
    }
}
