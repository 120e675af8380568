//! Text front end for the wizard.
//!
//! The session asks a [`Presenter`] which event each page produces and
//! forwards engine events to it; nothing here touches deployment state.

use crate::cli::ProcessMode;
use crate::engine::{EngineEvent, RunReport};
use crate::wizard::{WizardEvent, WizardState};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    Info,
    Warning,
    Error,
}

/// What a page needs to render
#[derive(Debug, Clone, Copy)]
pub struct PageView<'a> {
    pub product: &'a str,
    pub version: &'a str,
    pub install_path: &'a Path,
    pub last_report: Option<&'a RunReport>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOptions {
    pub install_dir: PathBuf,
    pub autostart: bool,
}

pub trait Presenter {
    /// Event produced by `state`. Not called for the Install and progress pages.
    fn choose(&mut self, state: WizardState, view: &PageView<'_>) -> WizardEvent;

    /// Install page. `None` means Back.
    fn install_options(&mut self, defaults: &InstallOptions) -> Option<InstallOptions>;

    fn engine_event(&mut self, event: &EngineEvent);

    fn notify(&mut self, level: Notice, text: &str);

    /// After a refused page: stay and try again, or give up
    fn retry(&mut self) -> bool;
}

/// Answers yes to everything and keeps every default.
///
/// Removal is the exception: the Remove page is confirmed only when the
/// launch asked for `/uninstall`, so a scripted default launch on an
/// installed product leaves it alone.
#[derive(Debug, Default)]
pub struct UnattendedPresenter {
    quiet: bool,
    confirm_removal: bool,
}

impl UnattendedPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Suppress output entirely (tests)
    pub fn quiet() -> Self {
        Self {
            quiet: true,
            ..Self::default()
        }
    }

    /// Confirm the Remove page only for an explicit uninstall launch
    pub fn with_mode(mut self, mode: ProcessMode) -> Self {
        self.confirm_removal = mode == ProcessMode::Uninstall;
        self
    }
}

impl Presenter for UnattendedPresenter {
    fn choose(&mut self, state: WizardState, _view: &PageView<'_>) -> WizardEvent {
        match state {
            WizardState::Welcome => WizardEvent::Start,
            WizardState::Legal => WizardEvent::Accept,
            WizardState::Remove if self.confirm_removal => WizardEvent::Remove,
            _ => WizardEvent::Exit,
        }
    }

    fn install_options(&mut self, defaults: &InstallOptions) -> Option<InstallOptions> {
        Some(defaults.clone())
    }

    fn retry(&mut self) -> bool {
        false
    }

    fn engine_event(&mut self, event: &EngineEvent) {
        if self.quiet {
            return;
        }
        match event {
            EngineEvent::StepStarted { name, .. } => println!("{name}..."),
            EngineEvent::Warning(text) => eprintln!("warning: {text}"),
            _ => {}
        }
    }

    fn notify(&mut self, level: Notice, text: &str) {
        if self.quiet {
            return;
        }
        match level {
            Notice::Info => println!("{text}"),
            Notice::Warning => eprintln!("warning: {text}"),
            Notice::Error => eprintln!("error: {text}"),
        }
    }
}

/// Line-oriented interactive prompts
pub struct ConsolePresenter<R, W> {
    input: R,
    output: W,
}

impl ConsolePresenter<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> ConsolePresenter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Trimmed answer, or `None` at end of input
    fn ask(&mut self, prompt: &str) -> Option<String> {
        let _ = write!(self.output, "{prompt} ");
        let _ = self.output.flush();

        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim().to_string()),
        }
    }

    fn say(&mut self, text: &str) {
        let _ = writeln!(self.output, "{text}");
    }

    fn yes(answer: &str, default: bool) -> bool {
        match answer.to_ascii_lowercase().as_str() {
            "" => default,
            "y" | "yes" => true,
            _ => false,
        }
    }
}

impl<R: BufRead, W: Write> Presenter for ConsolePresenter<R, W> {
    fn choose(&mut self, state: WizardState, view: &PageView<'_>) -> WizardEvent {
        use WizardEvent as E;
        use WizardState as S;

        let failure = view
            .last_report
            .and_then(|r| r.failure.as_ref())
            .map(|f| f.to_string());

        let (prompt, on_yes, on_no, default) = match state {
            S::Welcome => {
                self.say(&format!("Welcome to {} {} setup.", view.product, view.version));
                ("Continue? [Y/n]", E::Start, E::Exit, true)
            }
            S::Legal => {
                self.say(&format!("{} is licensed software. Review the license before continuing.", view.product));
                let Some(answer) = self.ask("Accept the license terms? [y/N, b = back]") else {
                    return E::Exit;
                };
                return match answer.as_str() {
                    "b" | "B" => E::Back,
                    a if Self::yes(a, false) => E::Accept,
                    _ => E::Exit,
                };
            }
            S::Complete => {
                self.say(&format!("{} was installed to {}.", view.product, view.install_path.display()));
                ("Launch it now? [Y/n]", E::Launch, E::Exit, true)
            }
            S::Failed => {
                self.say(&format!("Installation failed: {}", failure.unwrap_or_default()));
                ("Go back and choose another directory? [y/N]", E::Back, E::Exit, false)
            }
            S::Remove => {
                self.say(&format!("{} is installed in {}.", view.product, view.install_path.display()));
                ("Remove it? [y/N]", E::Remove, E::Exit, false)
            }
            S::RemoveDone => {
                self.say(&format!("{} was removed.", view.product));
                return E::Exit;
            }
            S::RemoveFailed => {
                self.say(&format!("Removal failed: {}", failure.unwrap_or_default()));
                ("Try again? [y/N]", E::Back, E::Exit, false)
            }
            S::License => {
                self.say(&format!("Activate {} from within the product.", view.product));
                return E::Exit;
            }
            S::Install | S::Progress | S::RemoveProgress => return E::Exit,
        };

        match self.ask(prompt) {
            Some(answer) if Self::yes(&answer, default) => on_yes,
            _ => on_no,
        }
    }

    fn install_options(&mut self, defaults: &InstallOptions) -> Option<InstallOptions> {
        let prompt = format!("Install directory [{}] (b = back):", defaults.install_dir.display());
        let answer = self.ask(&prompt)?;
        if answer == "b" || answer == "B" {
            return None;
        }

        let install_dir = if answer.is_empty() {
            defaults.install_dir.clone()
        } else {
            PathBuf::from(answer)
        };

        let default_hint = if defaults.autostart { "[Y/n]" } else { "[y/N]" };
        let autostart = self
            .ask(&format!("Start at login? {default_hint}"))
            .map(|a| Self::yes(&a, defaults.autostart))
            .unwrap_or(defaults.autostart);

        Some(InstallOptions { install_dir, autostart })
    }

    fn engine_event(&mut self, event: &EngineEvent) {
        match event {
            EngineEvent::StepStarted { name, .. } => {
                let _ = write!(self.output, "  {name}... ");
                let _ = self.output.flush();
            }
            EngineEvent::StepFinished { ok, .. } => self.say(if *ok { "ok" } else { "failed" }),
            EngineEvent::Progress(p) => self.say(&format!("[{p:>3}%]")),
            EngineEvent::Warning(text) => self.say(&format!("warning: {text}")),
            EngineEvent::Finished(_) => {}
        }
    }

    fn notify(&mut self, level: Notice, text: &str) {
        let prefix = match level {
            Notice::Info => "",
            Notice::Warning => "warning: ",
            Notice::Error => "error: ",
        };
        self.say(&format!("{prefix}{text}"));
    }

    fn retry(&mut self) -> bool {
        self.ask("Try again? [Y/n]")
            .map(|a| Self::yes(&a, true))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn view() -> PageView<'static> {
        PageView {
            product: "Hologram",
            version: "1.0.0",
            install_path: Path::new("/opt/Hologram"),
            last_report: None,
        }
    }

    #[test]
    fn test_unattended_walks_forward() {
        let mut p = UnattendedPresenter::quiet();
        assert_eq!(p.choose(WizardState::Welcome, &view()), WizardEvent::Start);
        assert_eq!(p.choose(WizardState::Legal, &view()), WizardEvent::Accept);
        assert_eq!(p.choose(WizardState::Complete, &view()), WizardEvent::Exit);
        assert!(!p.retry());
    }

    #[test]
    fn test_unattended_removes_only_when_uninstall_was_requested() {
        let mut default_launch = UnattendedPresenter::quiet().with_mode(ProcessMode::Install);
        assert_eq!(default_launch.choose(WizardState::Remove, &view()), WizardEvent::Exit);

        let mut upgrade = UnattendedPresenter::quiet().with_mode(ProcessMode::Upgrade);
        assert_eq!(upgrade.choose(WizardState::Remove, &view()), WizardEvent::Exit);

        let mut uninstall = UnattendedPresenter::quiet().with_mode(ProcessMode::Uninstall);
        assert_eq!(uninstall.choose(WizardState::Remove, &view()), WizardEvent::Remove);
        assert_eq!(uninstall.choose(WizardState::RemoveFailed, &view()), WizardEvent::Exit);
    }

    #[test]
    fn test_console_legal_answers() {
        let mut p = ConsolePresenter::new(Cursor::new("b\ny\n\n"), Vec::new());
        assert_eq!(p.choose(WizardState::Legal, &view()), WizardEvent::Back);
        assert_eq!(p.choose(WizardState::Legal, &view()), WizardEvent::Accept);
        // Empty answer does not accept
        assert_eq!(p.choose(WizardState::Legal, &view()), WizardEvent::Exit);
    }

    #[test]
    fn test_console_end_of_input_exits() {
        let mut p = ConsolePresenter::new(Cursor::new(""), Vec::new());
        assert_eq!(p.choose(WizardState::Welcome, &view()), WizardEvent::Exit);
        assert_eq!(p.choose(WizardState::Remove, &view()), WizardEvent::Exit);
    }

    #[test]
    fn test_console_install_options() {
        let defaults = InstallOptions {
            install_dir: PathBuf::from("/opt/Hologram"),
            autostart: true,
        };

        let mut p = ConsolePresenter::new(Cursor::new("\n\n/srv/holo\nn\nb\n"), Vec::new());
        assert_eq!(p.install_options(&defaults), Some(defaults.clone()));
        assert_eq!(
            p.install_options(&defaults),
            Some(InstallOptions {
                install_dir: PathBuf::from("/srv/holo"),
                autostart: false,
            })
        );
        assert_eq!(p.install_options(&defaults), None);
    }
}
