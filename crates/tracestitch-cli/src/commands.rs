use anyhow::{Context, Result};
use std::path::Path;

use tracestitch_runtime::Config;

use super::args::{Cli, Commands, ConfigCommand};
use super::handlers;
use crate::logging;

pub fn run(cli: Cli) -> Result<()> {
    logging::init(cli.log_level);

    let config_path = match cli.config {
        Some(path) => path,
        None => Config::default_path()?,
    };

    match cli.command {
        Commands::Convert(args) => {
            let mut config = load_config(&config_path)?;
            args.apply(&mut config);
            handlers::convert::handle(config, &args)
        }

        Commands::Inspect { input, format } => {
            let config = load_config(&config_path)?;
            handlers::inspect::handle(&input, config, format)
        }

        Commands::Config { command } => match command {
            ConfigCommand::Show => handlers::config::show(&config_path),
            ConfigCommand::Init { force } => handlers::config::init(&config_path, force),
        },
    }
}

fn load_config(path: &Path) -> Result<Config> {
    Config::load_from(path).with_context(|| format!("Failed to load config {}", path.display()))
}
