//! Removal runs end to end
//!
//! These tests verify:
//! - Removal attempts every step even when payload files are in use
//! - The installation record is always the last thing removed
//! - Removal of a product that is not installed ends immediately
//! - A record that cannot be removed fails the run, and Back retries it

mod common;

use common::Sandbox;
use hologram_setup::console::{InstallOptions, Notice, PageView, Presenter};
use hologram_setup::engine::{self, DeploymentContext, EngineEvent, UninstallPlan};
use hologram_setup::instance_guard::InstanceLock;
use hologram_setup::{CancelToken, ProcessMode, Session, UnattendedPresenter, WizardEvent, WizardState};
use std::fs;
use std::path::PathBuf;

fn install(sandbox: &Sandbox) {
    let ctx = sandbox.context(ProcessMode::Install, true);
    let outcome = Session::new(&ctx, UnattendedPresenter::quiet(), CancelToken::new())
        .run()
        .unwrap();
    assert_eq!(outcome.final_state, Some(WizardState::Complete));
}

#[test]
fn test_uninstall_with_two_locked_files_still_completes() {
    let sandbox = Sandbox::new();
    install(&sandbox);
    let locked = [
        sandbox.lock_installed_file("libvs-utilities.so"),
        sandbox.lock_installed_file("camera_calibration.ini"),
    ];

    let ctx = sandbox.context(ProcessMode::Uninstall, false);
    assert!(ctx.installed);
    let outcome = Session::new(&ctx, UnattendedPresenter::quiet().with_mode(ProcessMode::Uninstall), CancelToken::new())
        .run()
        .unwrap();

    assert_eq!(outcome.final_state, Some(WizardState::RemoveDone));
    assert_eq!(outcome.exit_code(), 0);
    let report = outcome.report.unwrap();
    assert!(report.succeeded());
    assert!(report.in_use);
    assert_eq!(report.steps_attempted, 15);
    assert_eq!(
        report.warnings.iter().filter(|w| w.contains("in use")).count(),
        1,
        "in-use failures collapse into one warning"
    );

    let store = sandbox.store();
    assert_eq!(store.read_install_path(), None);
    assert!(store.read_uninstall_registration().is_none());

    for name in &sandbox.config.payload_files {
        assert!(!sandbox.installed(name), "{name} should be gone");
    }
    for path in &locked {
        assert!(path.exists());
    }
    // Directory removal was attempted but the locked entries keep it alive
    assert!(sandbox.install_dir().exists());

    let shortcuts = sandbox.shortcuts();
    assert!(!shortcuts.start_menu_folder("Hologram").exists());
    assert!(!shortcuts.desktop_entry("Hologram").exists());
    assert!(!shortcuts.autostart_entry("Hologram").exists());
}

#[test]
fn test_every_delete_is_attempted_and_exactly_the_locked_ones_fail() {
    let sandbox = Sandbox::new();
    install(&sandbox);
    sandbox.lock_installed_file("hologram-runtime");
    sandbox.lock_installed_file("libjson-support.so");

    let plan = UninstallPlan::build(&sandbox.config.payload_files);
    let deployment = DeploymentContext::from_config(&sandbox.config, sandbox.install_dir(), CancelToken::new());
    let mut events = Vec::new();
    let report = engine::run(&plan, &deployment, |e| events.push(e));

    let failed: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::StepFinished { name, ok: false, .. } => Some(name.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(
        failed,
        vec!["Remove hologram-runtime", "Remove libjson-support.so", "Remove install directory"]
    );

    let started: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::StepStarted { name, .. } => Some(name.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(started.len(), plan.len());
    for name in &sandbox.config.payload_files {
        assert!(started.contains(&format!("Remove {name}").as_str()), "{name} not attempted");
    }
    assert_eq!(started.last(), Some(&"Remove installation record"));

    assert!(report.in_use);
    assert_eq!(report.percent, 100);
    assert!(!sandbox.store().is_installed());
}

#[test]
fn test_clean_uninstall_removes_directory() {
    let sandbox = Sandbox::new();
    install(&sandbox);

    let ctx = sandbox.context(ProcessMode::Uninstall, false);
    let outcome = Session::new(&ctx, UnattendedPresenter::quiet().with_mode(ProcessMode::Uninstall), CancelToken::new())
        .run()
        .unwrap();

    assert_eq!(outcome.final_state, Some(WizardState::RemoveDone));
    assert!(!outcome.report.unwrap().in_use);
    assert!(!sandbox.install_dir().exists());

    let calls = sandbox.service_calls();
    assert_eq!(&calls[calls.len() - 2..], ["/silent /stop", "/silent /uninstall"]);
}

#[test]
fn test_service_failures_do_not_stop_removal() {
    let sandbox = Sandbox::new();
    install(&sandbox);
    sandbox.fail_service("stop");
    sandbox.fail_service("uninstall");

    let ctx = sandbox.context(ProcessMode::Uninstall, false);
    let outcome = Session::new(&ctx, UnattendedPresenter::quiet().with_mode(ProcessMode::Uninstall), CancelToken::new())
        .run()
        .unwrap();

    assert_eq!(outcome.final_state, Some(WizardState::RemoveDone));
    let report = outcome.report.unwrap();
    assert_eq!(report.warnings.len(), 2);
    assert!(!sandbox.store().is_installed());
}

/// Swap the per-product record file for a non-empty directory so it can be
/// neither read nor removed. Returns the file's previous content.
fn jam_install_record(sandbox: &Sandbox) -> (PathBuf, String) {
    let record = sandbox.config.state_dir.join("software").join("Hologram.json");
    let saved = fs::read_to_string(&record).expect("record written by install");
    fs::remove_file(&record).unwrap();
    fs::create_dir_all(&record).unwrap();
    fs::write(record.join("held"), b"x").unwrap();
    (record, saved)
}

#[test]
fn test_unremovable_record_fails_removal() {
    let sandbox = Sandbox::new();
    install(&sandbox);
    let ctx = sandbox.context(ProcessMode::Uninstall, false);
    assert!(ctx.installed);
    jam_install_record(&sandbox);

    let presenter = UnattendedPresenter::quiet().with_mode(ProcessMode::Uninstall);
    let outcome = Session::new(&ctx, presenter, CancelToken::new())
        .run()
        .unwrap();

    assert_eq!(outcome.final_state, Some(WizardState::RemoveFailed));
    assert_eq!(outcome.exit_code(), 1);
    let report = outcome.report.unwrap();
    let failure = report.failure.expect("record step fails");
    assert_eq!(failure.step, "Remove installation record");
    assert!(failure.message.contains("could not be removed"));
    // Every earlier step still ran
    assert_eq!(report.steps_attempted, 15);
    assert!(!sandbox.installed("hologram-ui"));
}

/// Confirms removal, then clears the fault and goes Back on RemoveFailed
struct RetryOnceFixed {
    record: PathBuf,
    saved: String,
    pages: Vec<WizardState>,
}

impl Presenter for RetryOnceFixed {
    fn choose(&mut self, state: WizardState, _view: &PageView<'_>) -> WizardEvent {
        self.pages.push(state);
        match state {
            WizardState::Remove => WizardEvent::Remove,
            WizardState::RemoveFailed => {
                fs::remove_dir_all(&self.record).unwrap();
                fs::write(&self.record, &self.saved).unwrap();
                WizardEvent::Back
            }
            _ => WizardEvent::Exit,
        }
    }

    fn install_options(&mut self, defaults: &InstallOptions) -> Option<InstallOptions> {
        Some(defaults.clone())
    }

    fn engine_event(&mut self, _event: &EngineEvent) {}

    fn notify(&mut self, _level: Notice, _text: &str) {}

    fn retry(&mut self) -> bool {
        false
    }
}

#[test]
fn test_failed_removal_can_be_retried_once_the_record_is_free() {
    let sandbox = Sandbox::new();
    install(&sandbox);
    let ctx = sandbox.context(ProcessMode::Uninstall, false);
    let (record, saved) = jam_install_record(&sandbox);

    let presenter = RetryOnceFixed {
        record,
        saved,
        pages: Vec::new(),
    };
    let mut session = Session::new(&ctx, presenter, CancelToken::new());
    let outcome = session.run().unwrap();

    assert_eq!(outcome.final_state, Some(WizardState::RemoveDone));
    assert_eq!(outcome.exit_code(), 0);
    assert!(outcome.report.unwrap().succeeded());
    assert_eq!(
        session.presenter().pages,
        vec![
            WizardState::Remove,
            WizardState::RemoveFailed,
            WizardState::Remove,
            WizardState::RemoveDone
        ]
    );
    assert!(!sandbox.store().is_installed());
    assert!(!sandbox.install_dir().exists());
}

#[test]
fn test_uninstall_when_not_installed_terminates() {
    let sandbox = Sandbox::new();
    let ctx = sandbox.context(ProcessMode::Uninstall, false);

    let outcome = Session::new(&ctx, UnattendedPresenter::quiet().with_mode(ProcessMode::Uninstall), CancelToken::new())
        .run()
        .unwrap();

    assert_eq!(outcome.final_state, None);
    assert_eq!(outcome.exit_code(), 0);
    assert!(outcome.report.is_none());
}

#[test]
fn test_running_product_blocks_removal() {
    let sandbox = Sandbox::new();
    install(&sandbox);
    let _running = InstanceLock::try_acquire(&sandbox.config.lock_dir, &sandbox.config.product_lock_name)
        .unwrap()
        .expect("test holds the product lock");

    let ctx = sandbox.context(ProcessMode::Uninstall, false);
    let outcome = Session::new(&ctx, UnattendedPresenter::quiet().with_mode(ProcessMode::Uninstall), CancelToken::new())
        .run()
        .unwrap();

    assert!(outcome.blocked);
    assert_eq!(outcome.final_state, Some(WizardState::Remove));
    assert!(sandbox.store().is_installed());
    assert!(sandbox.installed("hologram-ui"));
}

#[test]
fn test_after_removal_default_launch_shows_welcome() {
    let sandbox = Sandbox::new();
    install(&sandbox);
    let ctx = sandbox.context(ProcessMode::Uninstall, false);
    Session::new(&ctx, UnattendedPresenter::quiet().with_mode(ProcessMode::Uninstall), CancelToken::new())
        .run()
        .unwrap();

    let relaunch = sandbox.context(ProcessMode::Install, false);
    assert!(!relaunch.installed);
    assert_eq!(relaunch.recorded_install_path, None);
}
