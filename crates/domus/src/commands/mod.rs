//! Command handlers for the backend-connected subcommands.

pub mod config_cmd;
pub mod devices;
pub mod settings;
pub mod util;
pub mod watch;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Sign in, run one command against the live session, then shut down.
pub async fn dispatch(cmd: Command, global: &GlobalOpts) -> Result<(), CliError> {
    let link = util::connect(global).await?;

    let result = match cmd {
        Command::Devices(args) => devices::handle(args, &link.session, global).await,
        Command::Watch(_) => watch::handle(&link.session, global).await,
        Command::Settings(args) => settings::handle(args, &link.controller, global).await,
        Command::Config(_) | Command::Completions(_) => Ok(()),
    };

    link.controller.shutdown().await;
    result
}
