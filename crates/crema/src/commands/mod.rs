//! Command dispatch: bridges CLI args -> coordinator calls -> output formatting.

pub mod config_cmd;
pub mod sensors;
pub mod status;
pub mod switches;
pub mod watch;

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use crema_core::SyncCoordinator;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a machine-bound command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    coordinator: &SyncCoordinator,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let result = match cmd {
        Command::Status(args) => status::handle(coordinator, &args, global).await,
        Command::Watch(args) => watch::handle(coordinator, &args, global).await,
        Command::Switches(args) => switches::handle(coordinator, args, global).await,
        Command::Sensors => sensors::handle(coordinator, global).await,
        // Config and Completions are handled before a coordinator exists
        Command::Config(_) | Command::Completions(_) => Ok(()),
    };
    coordinator.teardown().await;
    result
}

/// Pull the first snapshot behind a spinner.
pub(crate) async fn initialize(
    coordinator: &SyncCoordinator,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let spinner = spinner(
        &format!("Contacting {}", coordinator.config().display_name()),
        global.quiet,
    );
    let result = coordinator.initialize().await;
    spinner.finish_and_clear();
    result.map_err(CliError::from)
}

fn spinner(message: &str, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        bar.set_style(style);
    }
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}
