// ABOUTME: Entry point for the stackroll CLI application.
// ABOUTME: Parses arguments, installs logging, and dispatches to command handlers.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands, SnapshotCommands};
use stackroll::config::{self, Config};
use stackroll::error::Result;
use stackroll::output::{Output, OutputMode};
use std::env;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise the verbose flag picks the level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("warn")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let mode = OutputMode::from_flags(cli.quiet, cli.json);
    let result = run(cli, mode).await;

    if let Err(e) = result {
        Output::new(mode).error(&e.to_string());
        std::process::exit(1);
    }
}

async fn run(cli: Cli, mode: OutputMode) -> Result<()> {
    let output = Output::new(mode);
    let cwd = env::current_dir()?;

    match cli.command {
        Commands::Init { region, force } => {
            config::init_config(&cwd, region.as_deref(), force)?;
            output.success(&format!("Created {}", config::CONFIG_FILENAME));
            Ok(())
        }
        Commands::Deploy {
            stack,
            deployment_type,
            force,
        } => {
            let config = Config::discover(&cwd)?;
            commands::deploy(config, &stack, &deployment_type, force, output).await
        }
        Commands::Rollback {
            stack,
            mode,
            reason,
            force,
        } => {
            let config = Config::discover(&cwd)?;
            commands::rollback(config, &stack, &mode, &reason, force, output).await
        }
        Commands::Status { stack } => {
            let config = Config::discover(&cwd)?;
            commands::status(config, &stack, output).await
        }
        Commands::Abort { stack } => {
            let config = Config::discover(&cwd)?;
            commands::abort(config, &stack, output).await
        }
        Commands::Signal {
            stack,
            variable,
            value,
        } => {
            let config = Config::discover(&cwd)?;
            commands::signal(config, &stack, &variable, &value, output).await
        }
        Commands::Snapshot { command } => {
            let config = Config::discover(&cwd)?;
            match command {
                SnapshotCommands::Create { stack } => {
                    commands::snapshot_create(config, stack.as_deref(), output).await
                }
                SnapshotCommands::List { stack } => {
                    commands::snapshot_list(config, stack.as_deref(), output).await
                }
                SnapshotCommands::Restore { id, stack } => {
                    commands::snapshot_restore(config, &id, stack.as_deref(), output).await
                }
                SnapshotCommands::Cleanup { days } => {
                    commands::snapshot_cleanup(config, days, output).await
                }
            }
        }
    }
}
