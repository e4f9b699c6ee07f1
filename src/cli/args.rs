//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// firmloop - continuous firmware build, flash and test loop
///
/// Resolves the next firmware package, builds it on the build farm when
/// needed, flashes it onto a device and runs the configured tester.
#[derive(Parser, Debug)]
#[command(name = "firmloop")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "FIRMLOOP_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Flash one package onto a device and test it
    Run(RunArgs),

    /// Keep flashing and testing every newer package
    Watch(WatchArgs),

    /// Wait for a package newer than the given one and print its name
    Newer(NewerArgs),

    /// Print the packages between two packages, oldest first
    Steps(StepsArgs),

    /// Show or initialize configuration
    Config(ConfigArgs),
}

/// Device and test selection shared by `run` and `watch`
#[derive(Parser, Debug, Clone)]
pub struct TargetArgs {
    /// Device serial (defaults to the first configured device)
    #[arg(short, long)]
    pub device: Option<String>,

    /// Run only this test case instead of the whole task
    #[arg(short, long)]
    pub test_case: Option<String>,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Package to flash
    pub package: String,

    #[command(flatten)]
    pub target: TargetArgs,
}

#[derive(Parser, Debug)]
pub struct WatchArgs {
    /// Package currently on the device
    #[arg(long, default_value = "")]
    pub from: String,

    /// Stop after the first tested package
    #[arg(long)]
    pub once: bool,

    #[command(flatten)]
    pub target: TargetArgs,
}

#[derive(Parser, Debug)]
pub struct NewerArgs {
    /// Package to compare against
    #[arg(default_value = "")]
    pub current: String,
}

#[derive(Parser, Debug)]
pub struct StepsArgs {
    /// Older package
    pub from: String,

    /// Newer package
    pub to: String,
}

#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Write the default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_run() {
        let cli = Cli::parse_from([
            "firmloop",
            "run",
            "dayu200_20230101_120000",
            "--device",
            "7001005458323933328a01bce01c3800",
            "--test-case",
            "wifi",
        ]);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.package, "dayu200_20230101_120000");
                assert_eq!(
                    args.target.device.as_deref(),
                    Some("7001005458323933328a01bce01c3800")
                );
                assert_eq!(args.target.test_case.as_deref(), Some("wifi"));
            }
            _ => panic!("expected Run command"),
        }
    }

    #[test]
    fn cli_parses_steps() {
        let cli = Cli::parse_from(["firmloop", "-vv", "steps", "a", "b"]);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Steps(args) => {
                assert_eq!(args.from, "a");
                assert_eq!(args.to, "b");
            }
            _ => panic!("expected Steps command"),
        }
    }

    #[test]
    fn cli_parses_watch_defaults() {
        let cli = Cli::parse_from(["firmloop", "watch", "--once"]);
        match cli.command {
            Commands::Watch(args) => {
                assert!(args.once);
                assert_eq!(args.from, "");
                assert!(args.target.device.is_none());
            }
            _ => panic!("expected Watch command"),
        }
    }

    #[test]
    fn cli_parses_config_path() {
        let cli = Cli::parse_from(["firmloop", "--config", "/tmp/f.toml", "config", "path"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/f.toml")));
        assert!(matches!(
            cli.command,
            Commands::Config(ConfigArgs {
                action: Some(ConfigAction::Path)
            })
        ));
    }
}
