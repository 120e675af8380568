//! Background service lifecycle control.
//!
//! The product ships a service-control executable that understands
//! `/silent /install|/start|/stop|/uninstall` and reports success with exit
//! code 0. Each invocation is bounded by a timeout and observes the run's
//! cancellation token; either one tears down the child's process group.

use crate::cancel::CancelToken;
use crate::process_guard::{self, CommandProcessGroup, TrackedChild};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use strum::{Display, EnumIter, EnumString};
use tracing::{debug, info, warn};

/// Verbs understood by the service-control executable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum ServiceVerb {
    Install,
    Start,
    Stop,
    Uninstall,
}

impl ServiceVerb {
    /// Command-line flag for this verb, e.g. `/start`
    pub fn flag(self) -> String {
        format!("/{self}")
    }
}

/// Result of one service-control invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceOutcome {
    Success,
    /// Process ran to completion with a non-zero code (-1 if killed by a signal)
    ExitCode(i32),
    Timeout,
    Cancelled,
    SpawnError(String),
}

impl ServiceOutcome {
    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for ServiceOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "succeeded"),
            Self::ExitCode(code) => write!(f, "exited with code {}", code),
            Self::Timeout => write!(f, "timed out"),
            Self::Cancelled => write!(f, "was cancelled"),
            Self::SpawnError(e) => write!(f, "could not be started: {}", e),
        }
    }
}

/// Seam between the engine and the real service-control executable
pub trait ServiceControl: Send + Sync {
    fn execute(&self, verb: ServiceVerb, cancel: &CancelToken) -> ServiceOutcome;

    /// Whether there is anything to control yet. A first install has no
    /// previous service to stop.
    fn is_present(&self) -> bool {
        true
    }
}

/// Runs `<executable> /silent /<verb>` and interprets its exit code
#[derive(Debug, Clone)]
pub struct ServiceController {
    executable: PathBuf,
    timeout: Duration,
    grace_period: Duration,
}

const POLL_INTERVAL: Duration = Duration::from_millis(25);
const SPAWN_RETRIES: u32 = 3;

impl ServiceController {
    pub fn new(executable: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            executable: executable.into(),
            timeout,
            grace_period: Duration::from_secs(2),
        }
    }

    /// Controller for the service executable inside `install_path`
    pub fn in_install_dir(install_path: &Path, service_executable: &str, timeout: Duration) -> Self {
        Self::new(install_path.join(service_executable), timeout)
    }

    fn spawn(&self, verb: ServiceVerb) -> std::io::Result<Child> {
        let mut attempt = 0;
        loop {
            let result = Command::new(&self.executable)
                .arg("/silent")
                .arg(verb.flag())
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .supervised()
                .spawn();

            match result {
                // A just-copied executable can still be open for writing in a
                // forked sibling for a moment
                Err(e) if e.raw_os_error() == Some(nix::libc::ETXTBSY) && attempt < SPAWN_RETRIES => {
                    attempt += 1;
                    debug!("{:?} busy, retrying spawn ({})", self.executable, attempt);
                    std::thread::sleep(Duration::from_millis(50));
                }
                other => return other,
            }
        }
    }

    fn wait_bounded(&self, child: &mut Child, cancel: &CancelToken) -> ServiceOutcome {
        let started = Instant::now();
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    let code = status.code().unwrap_or(-1);
                    return if code == 0 {
                        ServiceOutcome::Success
                    } else {
                        ServiceOutcome::ExitCode(code)
                    };
                }
                Ok(None) => {}
                Err(e) => return ServiceOutcome::SpawnError(format!("wait failed: {}", e)),
            }

            if cancel.is_cancelled() {
                self.kill(child);
                return ServiceOutcome::Cancelled;
            }
            if started.elapsed() >= self.timeout {
                self.kill(child);
                return ServiceOutcome::Timeout;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    fn kill(&self, child: &mut Child) {
        let pid = child.id();
        debug!("Service command {} stopped: {:?}", pid, process_guard::stop_group(pid, self.grace_period));
        if let Err(e) = child.wait() {
            warn!("Failed to reap service command {}: {}", child.id(), e);
        }
    }
}

impl ServiceControl for ServiceController {
    fn is_present(&self) -> bool {
        self.executable.is_file()
    }

    fn execute(&self, verb: ServiceVerb, cancel: &CancelToken) -> ServiceOutcome {
        if cancel.is_cancelled() {
            return ServiceOutcome::Cancelled;
        }

        info!("Service command: {:?} /silent {}", self.executable, verb.flag());

        let mut child = match self.spawn(verb) {
            Ok(child) => child,
            Err(e) => {
                warn!("Service {} could not be started: {}", verb, e);
                return ServiceOutcome::SpawnError(e.to_string());
            }
        };

        let _tracked = TrackedChild::new(child.id(), format!("service {verb}"));
        let outcome = self.wait_bounded(&mut child, cancel);

        info!("Service command {} {}", verb, outcome);
        outcome
    }
}
