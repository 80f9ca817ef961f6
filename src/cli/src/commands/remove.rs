//! `tedge-oscar flows instances remove` command.

use std::path::Path;

use clap::Args;
use oscar_core::config::DEFAULT_MAPPER;
use oscar_runtime::flow::{instance_path, remove_instance};

#[derive(Args)]
pub struct RemoveArgs {
    /// Instance name
    pub instance_name: String,

    /// Mapper to remove the flow from
    #[arg(long, default_value = DEFAULT_MAPPER)]
    pub mapper: String,
}

pub async fn execute(args: RemoveArgs, config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let deploy_dir = config.deploy_dir(&args.mapper)?;

    if remove_instance(&deploy_dir, &args.instance_name)? {
        eprintln!(
            "Instance {} removed ({})",
            args.instance_name,
            instance_path(&deploy_dir, &args.instance_name).display()
        );
    } else {
        eprintln!(
            "Instance {} does not exist, skipping removal.",
            args.instance_name
        );
    }
    Ok(())
}
