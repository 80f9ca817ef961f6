//! `tedge-oscar flows images load` command.

use std::path::{Path, PathBuf};

use clap::Args;
use oscar_runtime::oci::load_tarball;

#[derive(Args)]
pub struct LoadArgs {
    /// Tarball path or http(s) URL (".tar", ".tar.gz" or ".tgz")
    pub source: String,

    /// Artifact name inside the image directory (default: derived from the source)
    #[arg(long)]
    pub name: Option<String>,

    /// Directory to extract to (overrides --name)
    #[arg(long)]
    pub output_dir: Option<PathBuf>,
}

pub async fn execute(args: LoadArgs, config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;

    let output_dir = match (args.output_dir, args.name) {
        (Some(dir), _) => dir,
        (None, Some(name)) => config.image_dir.join(name),
        (None, None) => {
            let name = name_from_source(&args.source)
                .ok_or_else(|| format!("Cannot derive an image name from '{}', use --name", args.source))?;
            config.image_dir.join(name)
        }
    };

    let summary = load_tarball(&args.source, &output_dir).await?;
    eprintln!(
        "Image loaded to {} ({} files)",
        output_dir.display(),
        summary.files
    );
    Ok(())
}

/// Last path segment of the source with archive suffixes removed.
fn name_from_source(source: &str) -> Option<String> {
    let path = source.split(['?', '#']).next().unwrap_or(source);
    let file = path.rsplit('/').next().unwrap_or(path);
    let stem = [".tar.gz", ".tgz", ".tar", ".gz"]
        .iter()
        .find_map(|suffix| file.strip_suffix(suffix))
        .unwrap_or(file);
    (!stem.is_empty()).then(|| stem.to_string())
}
