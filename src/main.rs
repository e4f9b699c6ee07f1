//! firmloop - continuous firmware build, flash and test loop
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use firmloop::cli::{Cli, Commands};
use firmloop::config::ConfigManager;
use firmloop::error::FirmloopResult;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

/// 0 = warn, 1 = info, 2+ = debug
fn init_logging(verbose: u8, format: &str) {
    let filter = match verbose {
        0 => EnvFilter::new("firmloop=warn"),
        1 => EnvFilter::new("firmloop=info"),
        _ => EnvFilter::new("firmloop=debug"),
    };

    if format == "json" {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .without_time()
            .init();
    }
}

async fn run() -> FirmloopResult<()> {
    let cli = Cli::parse();
    firmloop::ui::init_theme();

    let config_manager = if let Some(ref path) = cli.config {
        ConfigManager::with_path(path.clone())
    } else {
        ConfigManager::new()
    };

    // Config command works on broken config files too
    if let Commands::Config(args) = cli.command {
        init_logging(cli.verbose, "text");
        return firmloop::cli::commands::config(args, &config_manager).await;
    }

    let config = config_manager.load().await?;
    init_logging(cli.verbose, &config.general.log_format);
    debug!("Loaded config from {}", config_manager.path().display());

    match cli.command {
        Commands::Config(_) => unreachable!("Config handled above"),
        Commands::Run(args) => firmloop::cli::commands::run(args, &config).await,
        Commands::Watch(args) => firmloop::cli::commands::watch(args, &config).await,
        Commands::Newer(args) => firmloop::cli::commands::newer(args, &config).await,
        Commands::Steps(args) => firmloop::cli::commands::steps(args, &config).await,
    }
}
