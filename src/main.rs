//! Hologram Setup - entry point

use anyhow::{Context, Result};
use clap::Parser;
use hologram_setup::cli::{Cli, ProcessMode};
use hologram_setup::config::SetupConfig;
use hologram_setup::console::{ConsolePresenter, UnattendedPresenter};
use hologram_setup::session::{self, RunContext, Session, SessionOutcome};
use hologram_setup::{CancelToken, logging, process_guard};
use tracing::{debug, error, info, warn};

fn load_config(cli: &Cli) -> Result<SetupConfig> {
    let config = match &cli.config {
        Some(path) => SetupConfig::load_from_file(path)?,
        None => SetupConfig::default(),
    };
    config.validate().context("Invalid setup configuration")?;
    Ok(config)
}

fn run(cli: Cli, config: SetupConfig) -> Result<SessionOutcome> {
    let cancel = CancelToken::new();
    if let Err(e) = process_guard::init_signal_handlers(cancel.clone()) {
        // Cancellation is unavailable but the run itself can proceed
        warn!("Failed to initialize signal handlers: {}", e);
    }
    debug!("Signal handlers initialized");

    // Held until the process exits
    let _setup_lock = session::acquire_setup_lock(&config)?;

    let selection = ProcessMode::resolve(&cli.mode);
    let context = RunContext::new(config, selection, cli.install_dir, !cli.no_autostart);

    let outcome = if cli.yes {
        Session::new(&context, UnattendedPresenter::new().with_mode(context.mode), cancel).run()?
    } else {
        Session::new(&context, ConsolePresenter::stdio(), cancel).run()?
    };
    Ok(outcome)
}

fn main() {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("✗ {:#}", e);
            std::process::exit(2);
        }
    };

    if let Some(path) = &cli.save_config {
        match config.save_to_file(path) {
            Ok(()) => {
                println!("✓ Configuration written to {}", path.display());
                return;
            }
            Err(e) => {
                eprintln!("✗ {:#}", e);
                std::process::exit(2);
            }
        }
    }

    let log_prefix = format!("{}Setup", config.product.display_name);
    logging::init_tracing(&config.log_dir, &log_prefix);
    info!("{} setup {} starting", config.product.display_name, config.product.version);

    match run(cli, config) {
        Ok(outcome) => {
            info!("Setup finished: {:?}", outcome.final_state);
            std::process::exit(outcome.exit_code());
        }
        Err(e) => {
            error!("{:#}", e);
            eprintln!("✗ {:#}", e);
            std::process::exit(1);
        }
    }
}
