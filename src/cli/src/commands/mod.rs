//! CLI command definitions and dispatch.

mod deploy;
mod list;
mod load;
mod login;
mod logout;
mod pull;
mod remove;

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use oscar_core::config::OscarConfig;

/// tedge-oscar - manage thin-edge.io flow images and instances.
#[derive(Parser)]
#[command(name = "tedge-oscar", version, about)]
pub struct Cli {
    /// Configuration file (default: $TEDGE_OSCAR_CONFIG or the standard locations)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level filter (e.g. "info", "debug"); overrides RUST_LOG
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Manage flows
    Flows(FlowsArgs),
    /// Store registry credentials
    Login(login::LoginArgs),
    /// Remove stored registry credentials
    Logout(logout::LogoutArgs),
}

#[derive(Args)]
pub struct FlowsArgs {
    #[command(subcommand)]
    pub command: FlowsCommand,
}

#[derive(Subcommand)]
pub enum FlowsCommand {
    /// Manage flow images
    #[command(subcommand)]
    Images(ImagesCommand),
    /// Manage flow instances
    #[command(subcommand)]
    Instances(InstancesCommand),
}

#[derive(Subcommand)]
pub enum ImagesCommand {
    /// Pull a flow image from an OCI registry
    Pull(pull::PullArgs),
    /// Load a flow image from a tarball (local path or URL)
    Load(load::LoadArgs),
}

#[derive(Subcommand)]
pub enum InstancesCommand {
    /// List deployed flow instances
    #[command(visible_aliases = ["ls", "ps"])]
    List(list::ListArgs),
    /// Deploy a flow instance
    #[command(visible_alias = "run")]
    Deploy(deploy::DeployArgs),
    /// Remove a deployed flow instance
    #[command(visible_alias = "rm")]
    Remove(remove::RemoveArgs),
}

/// Load the configuration selected by `--config` or the default lookup.
pub(crate) fn load_config(path: Option<&Path>) -> Result<OscarConfig, Box<dyn std::error::Error>> {
    let path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(OscarConfig::default_path);
    tracing::debug!(path = %path.display(), "Loading configuration");
    Ok(OscarConfig::load(&path)?)
}

/// Dispatch a parsed CLI to the appropriate command handler.
pub async fn dispatch(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = cli.config.as_deref();
    match cli.command {
        Command::Flows(flows) => match flows.command {
            FlowsCommand::Images(ImagesCommand::Pull(args)) => pull::execute(args, config).await,
            FlowsCommand::Images(ImagesCommand::Load(args)) => load::execute(args, config).await,
            FlowsCommand::Instances(InstancesCommand::List(args)) => list::execute(args, config).await,
            FlowsCommand::Instances(InstancesCommand::Deploy(args)) => {
                deploy::execute(args, config).await
            }
            FlowsCommand::Instances(InstancesCommand::Remove(args)) => {
                remove::execute(args, config).await
            }
        },
        Command::Login(args) => login::execute(args, config).await,
        Command::Logout(args) => logout::execute(args, config).await,
    }
}
