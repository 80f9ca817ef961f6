//! `tedge-oscar flows images pull` command.

use std::path::{Path, PathBuf};

use clap::Args;
use oscar_runtime::oci::{resolve, ArtifactPuller, PullOptions};

#[derive(Args)]
pub struct PullArgs {
    /// Image reference (e.g., "ghcr.io/thin-edge/connectivity-counter:1.0")
    pub image: String,

    /// Directory to download the artifact contents to (default: <image_dir>/<name>)
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Also save the artifact as a tarball next to the output directory
    #[arg(long)]
    pub tarball: bool,

    /// Do not read or write the local blob cache
    #[arg(long)]
    pub no_cache: bool,
}

pub async fn execute(args: PullArgs, config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;

    let name = resolve(&args.image)?;
    let output_dir = args
        .output_dir
        .unwrap_or_else(|| config.image_dir.join(&name));
    let tarball_path = args.tarball.then(|| tarball_path_for(&output_dir));

    let options = PullOptions {
        tarball_path: tarball_path.clone(),
        cache_disabled: args.no_cache,
    };
    let pulled = ArtifactPuller::new(&config)
        .pull(&args.image, &output_dir, &options)
        .await?;

    match tarball_path {
        Some(tarball) => eprintln!("Image {} pulled to {}", args.image, tarball.display()),
        None => eprintln!("Image {} pulled to {}", args.image, pulled.path.display()),
    }
    Ok(())
}

/// `<output_dir>.tar`, a sibling of the output directory.
fn tarball_path_for(output_dir: &Path) -> PathBuf {
    let mut name = output_dir
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "artifact".into());
    name.push(".tar");
    output_dir.with_file_name(name)
}
