//! `tedge-oscar logout` command - Remove stored registry credentials.

use std::path::Path;

use clap::Args;
use oscar_runtime::oci::CredentialStore;

#[derive(Args)]
pub struct LogoutArgs {
    /// Registry server (e.g. ghcr.io)
    pub server: String,
}

pub async fn execute(args: LogoutArgs, config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;

    let path = config
        .credential_store_path()
        .ok_or("No location available for the credential store")?;
    let removed = CredentialStore::new(path).remove(&args.server)?;

    if removed {
        println!("Removing login credentials for {}", args.server);
    } else {
        println!("Not logged in to {}", args.server);
    }

    Ok(())
}
