use std::{process::ExitCode, sync::Arc};

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ledgerkv::{
    commands::{self, CommandError},
    config::{CliArgs, Command, Config},
    ProviderRegistry,
};
use ledgerkv_memory::MemoryProvider;

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let _ = if config.logging.json {
        builder.json().try_init()
    } else {
        builder.with_target(false).try_init()
    };
}

fn run(registry: &ProviderRegistry, config: &Config, command: &Command) -> Result<(), CommandError> {
    match command {
        Command::Providers => {
            print!("{}", commands::list_providers(registry));
        }
        Command::Inspect { location, json } => {
            println!("{}", commands::inspect(registry, config, location, *json)?);
        }
        Command::Set { location, path, value } => {
            let book = commands::set_slot(registry, config, location, path, value)?;
            println!("{}", book.slots);
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = CliArgs::parse();
    let config = Config::load(&cli);
    init_logging(&config);

    let registry = ProviderRegistry::global();
    registry.register(Arc::new(MemoryProvider::new()));
    info!(access_methods = ?registry.access_methods(), "Providers registered");

    match run(registry, &config, &cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Command failed");
            ExitCode::FAILURE
        }
    }
}
