//! Command dispatch: bridges CLI args to core operations and output.

pub mod chor;
pub mod config_cmd;
pub mod plugins;
pub mod serve;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a command to its handler.
pub async fn dispatch(cmd: Command, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Serve(args) => serve::handle(args, global).await,
        Command::Plugins => plugins::handle(global),
        Command::Chor(args) => chor::handle(args, global).await,
        Command::Config(args) => config_cmd::handle(&args, global),
        // Completions are handled before dispatch
        Command::Completions(_) => Ok(()),
    }
}
