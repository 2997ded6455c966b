//! CLI command handling.
//!
//! Provides subcommands for:
//! - Bringing the environment up (`up`)
//! - Tearing it down, keeping volumes (`down`)
//! - Listing managed containers (`status`)
//! - Writing a starter manifest (`init`)
//! - Generating shell completions (`completion`)

mod completion;
mod down;
mod init;
mod status;
mod up;

pub use completion::Completion;
pub use down::run_down_command;
pub use init::run_init_command;
pub use status::{render_status_table, run_status_command};
pub use up::run_up_command;

use std::path::PathBuf;

use anyhow::Context;
use clap::{ColorChoice, Parser, Subcommand};

use crate::config::Config;
use crate::manifest::Environment;
use crate::runtime::{DockerRuntime, diagnose_unreachable};

#[derive(Parser, Debug)]
#[command(name = "stasis")]
#[command(about = "Declarative local development environments")]
#[command(
    long_about = "Stasis brings up the services declared in stasis.yaml as labelled containers on a private network.\nExamples:\n  stasis up  # Start everything\n  stasis status  # Show what is running"
)]
#[command(version)]
#[command(color = ColorChoice::Auto)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Manifest file (default: stasis.yaml)
    #[arg(short, long, global = true, env = "STASIS_FILE")]
    pub file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the development environment
    #[command(
        about = "Start the development environment",
        long_about = "Creates the project network, pulls images and (re)creates every declared service.\nExample: stasis up"
    )]
    Up,

    /// Stop and remove services
    #[command(
        about = "Stop and remove services",
        long_about = "Stops and removes every declared service, then the project network. Volumes are kept.\nExample: stasis down --remove-orphans"
    )]
    Down {
        /// Also remove managed containers for services no longer declared
        #[arg(long)]
        remove_orphans: bool,
    },

    /// List services of this project
    #[command(
        about = "List running services",
        long_about = "Lists every container labelled with this project, running or stopped.\nExample: stasis status"
    )]
    Status,

    /// Write a starter stasis.yaml
    #[command(
        about = "Create a starter manifest",
        long_about = "Writes a starter manifest in the current directory.\nExample: stasis init --name demo"
    )]
    Init {
        /// Project name (defaults to the current directory name)
        #[arg(long)]
        name: Option<String>,
    },

    /// Generate shell completion scripts
    #[command(
        about = "Generate completions",
        long_about = "Generates shell completion scripts.\nExample: stasis completion --shell bash > stasis.bash"
    )]
    Completion(Completion),
}

impl Cli {
    /// Resolve configuration, letting `--file` override the environment.
    pub fn config(&self) -> anyhow::Result<Config> {
        let mut config = Config::from_env().context("invalid configuration")?;
        if let Some(ref file) = self.file {
            config.manifest_path = file.clone();
        }
        Ok(config)
    }
}

/// Load the manifest named by the configuration.
pub(crate) fn load_environment(config: &Config) -> anyhow::Result<Environment> {
    let env = Environment::load(&config.manifest_path)?;
    tracing::info!("Loaded config for project: {}", env.name);
    Ok(env)
}

/// Connect to the runtime, adding install/start guidance on failure.
pub(crate) async fn connect_runtime() -> anyhow::Result<DockerRuntime> {
    DockerRuntime::connect()
        .await
        .map_err(|e| anyhow::anyhow!("{}\n  {}", e, diagnose_unreachable().hint()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_version() {
        let cmd = Cli::command();
        assert_eq!(
            cmd.get_version().unwrap_or("unknown"),
            env!("CARGO_PKG_VERSION")
        );
    }

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_down_flags() {
        let cli = Cli::try_parse_from(["stasis", "down", "--remove-orphans", "-f", "dev.yaml"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Command::Down {
                remove_orphans: true
            }
        ));
        assert_eq!(cli.file, Some(PathBuf::from("dev.yaml")));
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["stasis"]).is_err());
    }

    #[test]
    fn test_help_mentions_commands() {
        let help = Cli::command().render_help().to_string();
        for name in ["up", "down", "status", "init", "completion"] {
            assert!(help.contains(name), "help should list {name}");
        }
    }
}
