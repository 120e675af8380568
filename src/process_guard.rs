//! Supervision of the external commands setup runs.
//!
//! Service-control invocations run as leaders of their own process group with
//! a parent-death signal, so tearing one down reaches everything it started
//! and a crashed setup never leaves a half-done `/install` behind.
//!
//! Signals: the first SIGINT/SIGTERM/SIGHUP cancels the run's [`CancelToken`]
//! and lets the engine stop at its next checkpoint. A second one stops every
//! tracked child and exits with `128 + signo`.

use crate::cancel::CancelToken;
use nix::sys::prctl;
use nix::sys::signal::{self, Signal};
use nix::unistd::{self, Pid};
use std::collections::HashMap;
use std::io;
use std::os::unix::process::CommandExt;
use std::process::Command;
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Grace period between SIGTERM and SIGKILL on a second signal
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

static TRACKER: OnceLock<Mutex<ChildRegistry>> = OnceLock::new();

/// Live supervised children, keyed by PID, with a label for the logs
#[derive(Debug, Default)]
pub struct ChildRegistry {
    children: HashMap<u32, String>,
    shutting_down: bool,
}

impl ChildRegistry {
    pub fn global() -> &'static Mutex<ChildRegistry> {
        TRACKER.get_or_init(|| Mutex::new(ChildRegistry::default()))
    }

    pub fn track(&mut self, pid: u32, label: impl Into<String>) {
        let label = label.into();
        debug!(pid, %label, "Tracking child");
        self.children.insert(pid, label);
    }

    pub fn forget(&mut self, pid: u32) -> Option<String> {
        self.children.remove(&pid)
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Stop every tracked group. Runs once; later calls return 0.
    pub fn stop_all(&mut self, grace: Duration) -> usize {
        if self.shutting_down {
            return 0;
        }
        self.shutting_down = true;

        let stopped = self.children.len();
        for (pid, label) in self.children.drain() {
            info!("Stopping {} (PID {})", label, pid);
            stop_group(pid, grace);
        }
        stopped
    }
}

/// Keeps a PID in the global registry for as long as it is alive
#[derive(Debug)]
pub struct TrackedChild {
    pid: u32,
}

impl TrackedChild {
    pub fn new(pid: u32, label: impl Into<String>) -> Self {
        match ChildRegistry::global().lock() {
            Ok(mut registry) => registry.track(pid, label),
            Err(_) => warn!("Child registry poisoned; PID {} is untracked", pid),
        }
        Self { pid }
    }
}

impl Drop for TrackedChild {
    fn drop(&mut self) {
        if let Ok(mut registry) = ChildRegistry::global().lock() {
            registry.forget(self.pid);
        }
    }
}

/// How a group went away under [`stop_group`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupStop {
    /// Gone within the grace period after SIGTERM
    Terminated,
    /// Still alive after the grace period
    Killed,
}

/// SIGTERM the group led by `pgid`, then SIGKILL it if it outlives `grace`
pub fn stop_group(pgid: u32, grace: Duration) -> GroupStop {
    signal_group(pgid, Signal::SIGTERM);

    let deadline = Instant::now() + grace;
    while Instant::now() < deadline {
        if !is_alive(pgid) {
            return GroupStop::Terminated;
        }
        std::thread::sleep(Duration::from_millis(25));
    }

    if !is_alive(pgid) {
        return GroupStop::Terminated;
    }
    warn!("Process group {} ignored SIGTERM, killing it", pgid);
    signal_group(pgid, Signal::SIGKILL);
    GroupStop::Killed
}

/// Signal the whole group, or the leader alone when the group is gone
fn signal_group(pgid: u32, sig: Signal) {
    let Ok(raw) = i32::try_from(pgid) else {
        return;
    };
    if signal::kill(Pid::from_raw(-raw), sig).is_ok() {
        return;
    }
    if let Err(e) = signal::kill(Pid::from_raw(raw), sig) {
        debug!("{:?} to {} failed: {}", sig, pgid, e);
    }
}

/// Alive and not a zombie
fn is_alive(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if signal::kill(Pid::from_raw(raw), None).is_err() {
        return false;
    }

    // The state follows the parenthesised command name, which may contain spaces
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => stat
            .rsplit_once(')')
            .and_then(|(_, rest)| rest.split_whitespace().next())
            .is_none_or(|state| !matches!(state, "Z" | "X")),
        Err(_) => true,
    }
}

fn signal_label(signo: i32) -> &'static str {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
    match signo {
        SIGINT => "SIGINT",
        SIGTERM => "SIGTERM",
        SIGHUP => "SIGHUP",
        _ => "signal",
    }
}

/// Install handlers for SIGINT, SIGTERM and SIGHUP.
pub fn init_signal_handlers(token: CancelToken) -> io::Result<()> {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])?;

    std::thread::Builder::new()
        .name("signals".into())
        .spawn(move || {
            for signo in signals.forever() {
                if !token.is_cancelled() {
                    info!("{} received, cancelling setup", signal_label(signo));
                    token.cancel();
                    continue;
                }

                let stopped = match ChildRegistry::global().lock() {
                    Ok(mut registry) => registry.stop_all(SHUTDOWN_GRACE),
                    Err(_) => 0,
                };
                info!("{} received again, stopped {} child(ren), exiting", signal_label(signo), stopped);
                std::process::exit(128 + signo);
            }
        })?;

    Ok(())
}

/// Run a [`Command`] under supervision
pub trait CommandProcessGroup {
    /// New process group led by the child, SIGTERM when setup dies
    fn supervised(&mut self) -> &mut Self;
}

impl CommandProcessGroup for Command {
    fn supervised(&mut self) -> &mut Self {
        // SAFETY: setpgid and prctl are async-signal-safe syscalls
        unsafe {
            self.pre_exec(|| {
                unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0)).map_err(io::Error::from)?;
                prctl::set_pdeathsig(Signal::SIGTERM).map_err(io::Error::from)?;
                Ok(())
            });
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_tracks_labels() {
        let mut registry = ChildRegistry::default();
        registry.track(1234, "service start");
        registry.track(5678, "service stop");
        assert_eq!(registry.len(), 2);

        assert_eq!(registry.forget(1234).as_deref(), Some("service start"));
        assert_eq!(registry.forget(1234), None);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_tracked_child_leaves_registry_on_drop() {
        let pid = 999_901;
        {
            let _child = TrackedChild::new(pid, "service start");
            let registry = ChildRegistry::global().lock().unwrap();
            assert!(registry.children.contains_key(&pid));
        }
        let registry = ChildRegistry::global().lock().unwrap();
        assert!(!registry.children.contains_key(&pid));
    }

    #[test]
    fn test_stop_group_terminates_sleeping_child() {
        let mut child = Command::new("sh")
            .args(["-c", "sleep 60"])
            .supervised()
            .spawn()
            .expect("spawn sleep");

        let pid = child.id();
        assert!(is_alive(pid));

        assert_eq!(stop_group(pid, Duration::from_secs(2)), GroupStop::Terminated);
        let status = child.wait().expect("reap child");
        assert!(!status.success());
    }

    #[test]
    fn test_stop_all_runs_once() {
        let mut registry = ChildRegistry::default();
        registry.track(999_999, "gone");
        assert_eq!(registry.stop_all(Duration::from_millis(10)), 1);
        assert!(registry.is_empty());

        registry.track(999_998, "late");
        assert_eq!(registry.stop_all(Duration::from_millis(10)), 0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_missing_pid_is_not_alive() {
        assert!(!is_alive(999_999));
        assert!(!is_alive(u32::MAX));
    }
}
