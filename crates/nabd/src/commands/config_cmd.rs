//! Config subcommand handlers.

use nabd_config::{self as config, Config};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

pub fn handle(args: &ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let path = global.config.clone().unwrap_or_else(config::config_path);

    match args.command {
        ConfigCommand::Path => {
            output::print_output(&path.display().to_string(), global.quiet);
        }
        ConfigCommand::Show => {
            let cfg = config::load_config(Some(&path))?;
            // Validate before showing so a broken file is reported, not echoed.
            cfg.to_server_config()?;
            output::print_output(&render(&cfg)?, global.quiet);
        }
        ConfigCommand::Init { force } => {
            config::init_config(&path, force)?;
            output::print_output(
                &format!("Wrote default configuration to {}", path.display()),
                global.quiet,
            );
        }
    }
    Ok(())
}

fn render(cfg: &Config) -> Result<String, CliError> {
    toml::to_string_pretty(cfg).map_err(|err| CliError::from(config::ConfigError::from(err)))
}
