use clap::Parser;
use std::path::PathBuf;
use strum::Display;

/// Hologram Setup - installs, upgrades and removes Hologram
#[derive(Parser, Debug)]
#[command(name = "hologram-setup")]
#[command(about = "Install, upgrade or remove Hologram")]
#[command(version)]
pub struct Cli {
    /// Path to a JSON setup configuration (defaults are built in)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Write the effective configuration to this file and exit
    #[arg(long)]
    pub save_config: Option<PathBuf>,

    /// Install directory to offer instead of the configured default
    #[arg(long)]
    pub install_dir: Option<PathBuf>,

    /// Answer every prompt affirmatively (scripted installs).
    ///
    /// The removal prompt is only confirmed together with `/uninstall`; a
    /// default launch on an installed product exits instead.
    #[arg(short, long)]
    pub yes: bool,

    /// Do not start the product at login
    #[arg(long)]
    pub no_autostart: bool,

    /// Process mode: /install, /uninstall, /upgrade or /register <serial>
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub mode: Vec<String>,
}

/// What this launch of the orchestrator was asked to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum ProcessMode {
    Install,
    Uninstall,
    Upgrade,
    Register,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeSelection {
    pub mode: ProcessMode,
    /// Only set by `/register`; empty when no serial followed it
    pub serial: String,
}

impl ProcessMode {
    /// First recognised flag wins; anything else is ignored
    pub fn resolve<S: AsRef<str>>(args: &[S]) -> ModeSelection {
        for (i, arg) in args.iter().enumerate() {
            let mode = match arg.as_ref() {
                "/install" => Self::Install,
                "/uninstall" => Self::Uninstall,
                "/upgrade" => Self::Upgrade,
                "/register" => {
                    let serial = args.get(i + 1).map(|s| s.as_ref().to_string()).unwrap_or_default();
                    return ModeSelection {
                        mode: Self::Register,
                        serial,
                    };
                }
                _ => continue,
            };
            return ModeSelection {
                mode,
                serial: String::new(),
            };
        }

        ModeSelection {
            mode: Self::Install,
            serial: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_install() {
        let empty: [&str; 0] = [];
        assert_eq!(ProcessMode::resolve(&empty).mode, ProcessMode::Install);
        assert_eq!(ProcessMode::resolve(&["--foo", "bar"]).mode, ProcessMode::Install);
    }

    #[test]
    fn test_first_match_wins() {
        assert_eq!(ProcessMode::resolve(&["/upgrade", "/uninstall"]).mode, ProcessMode::Upgrade);
        assert_eq!(ProcessMode::resolve(&["x", "/uninstall", "/install"]).mode, ProcessMode::Uninstall);
    }

    #[test]
    fn test_register_consumes_serial() {
        let sel = ProcessMode::resolve(&["/register", "ABCD-1234", "/uninstall"]);
        assert_eq!(sel.mode, ProcessMode::Register);
        assert_eq!(sel.serial, "ABCD-1234");

        let sel = ProcessMode::resolve(&["/register"]);
        assert_eq!(sel.serial, "");
    }

    #[test]
    fn test_flags_are_case_sensitive() {
        assert_eq!(ProcessMode::resolve(&["/UNINSTALL"]).mode, ProcessMode::Install);
    }

    #[test]
    fn test_cli_collects_mode_flags() {
        let cli = Cli::parse_from(["hologram-setup", "--yes", "/register", "SERIAL"]);
        assert!(cli.yes);
        assert_eq!(cli.mode, vec!["/register", "SERIAL"]);

        let sel = ProcessMode::resolve(&cli.mode);
        assert_eq!(sel.mode, ProcessMode::Register);
    }
}
