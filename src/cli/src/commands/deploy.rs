//! `tedge-oscar flows instances deploy` command.

use std::path::Path;

use clap::Args;
use oscar_core::config::DEFAULT_MAPPER;
use oscar_runtime::flow::{deploy, DeployRequest};

#[derive(Args)]
pub struct DeployArgs {
    /// Instance name, used as the definition file name
    pub instance_name: String,

    /// Image reference (e.g., "ghcr.io/thin-edge/connectivity-counter:1.0")
    pub image: String,

    /// Input topic (repeatable)
    #[arg(long = "topics")]
    pub topics: Vec<String>,

    /// Interval applied to every step (e.g. "5s")
    #[arg(long)]
    pub interval: Option<String>,

    /// Mapper to deploy the flow to
    #[arg(long, default_value = DEFAULT_MAPPER)]
    pub mapper: String,
}

pub async fn execute(args: DeployArgs, config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let deploy_dir = config.deploy_dir(&args.mapper)?;

    let request = DeployRequest {
        instance_name: args.instance_name,
        image: args.image,
        topics: args.topics,
        interval: args.interval,
    };
    let deployment = deploy(&config, &request, &deploy_dir).await?;

    if deployment.pulled {
        eprintln!("Image {} pulled", request.image);
    }
    eprintln!(
        "Instance {} deployed at {}",
        deployment.instance_name,
        deployment.path.display()
    );
    Ok(())
}
