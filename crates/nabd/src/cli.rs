//! Clap derive structures for the `nabd` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// nabd -- server for Nabaztag/tag rabbits
#[derive(Debug, Parser)]
#[command(
    name = "nabd",
    version,
    about = "Serve Nabaztag/tag rabbits on your own network",
    long_about = "Answers the rabbits' HTTP polls, runs plugins on their button, ear \
        and RFID events, and serves boot code, sounds and choreographies.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (default: platform config dir)
    #[arg(long, short = 'c', env = "NABD_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the device server until interrupted
    Serve(ServeArgs),

    /// List the built-in plugins
    Plugins,

    /// Inspect and generate choreography files
    #[command(alias = "choreography")]
    Chor(ChorArgs),

    /// Manage the configuration file
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Serve ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Address to listen on (overrides server.listen)
    #[arg(long, short = 'l')]
    pub listen: Option<String>,

    /// Host announced to devices (overrides server.advertise)
    #[arg(long)]
    pub advertise: Option<String>,

    /// Directory of served files (overrides paths.resources)
    #[arg(long, short = 'r')]
    pub resources: Option<PathBuf>,

    /// Directory of saved state (overrides paths.state)
    #[arg(long, short = 's')]
    pub state: Option<PathBuf>,

    /// Neither load nor save state
    #[arg(long)]
    pub no_persist: bool,

    /// Send responses in one piece instead of paced chunks
    #[arg(long)]
    pub no_throttle: bool,
}

// ── Choreographies ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ChorArgs {
    #[command(subcommand)]
    pub command: ChorCommand,
}

#[derive(Debug, Subcommand)]
pub enum ChorCommand {
    /// Decode a .chor file and list its commands
    Inspect {
        /// Choreography file in wire format
        file: PathBuf,
    },

    /// Write the built-in red blinking demo to a directory
    RedBlinking {
        /// Target directory (created if missing)
        dir: PathBuf,
    },
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file location
    Path,

    /// Display the resolved configuration
    Show,

    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long, short = 'f')]
        force: bool,
    },
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
