//! Instance deployment.
//!
//! Turns a locally cached artifact plus user overrides into an instance
//! definition file in the deploy directory. Every deploy regenerates the
//! whole file; nothing is merged with a previous deployment.

use std::path::{Path, PathBuf};

use oscar_core::config::OscarConfig;
use oscar_core::error::{OscarError, Result};

use super::instance::{instance_path, validate_instance_name};
use super::template::{find_template, merge_template, minimal_document, Overrides};
use crate::oci::{resolve, ArtifactPuller, PullOptions};

/// Entrypoint location inside every artifact.
pub const ENTRYPOINT: &str = "lib/main.js";

/// What to deploy.
#[derive(Debug, Clone, Default)]
pub struct DeployRequest {
    pub instance_name: String,
    /// Artifact reference, e.g. `ghcr.io/thin-edge/counter:1.0`
    pub image: String,
    /// Replaces `input.mqtt.topics` when non-empty
    pub topics: Vec<String>,
    /// Applied to every step when set
    pub interval: Option<String>,
}

/// Outcome of a deployment.
#[derive(Debug, Clone)]
pub struct Deployment {
    pub instance_name: String,
    /// Written definition file
    pub path: PathBuf,
    /// Entrypoint referenced by every step
    pub script: PathBuf,
    /// Template the definition was derived from, if the artifact had one
    pub template: Option<PathBuf>,
    /// Whether the artifact had to be pulled first
    pub pulled: bool,
}

/// Deploy an instance into `deploy_dir`, pulling the artifact if needed.
pub async fn deploy(config: &OscarConfig, request: &DeployRequest, deploy_dir: &Path) -> Result<Deployment> {
    validate_instance_name(&request.instance_name)?;

    let name = resolve(&request.image)?;
    let artifact_dir = config.image_dir.join(&name);

    let pulled = if artifact_dir.exists() {
        false
    } else {
        tracing::info!(image = %request.image, "Artifact not found locally, pulling");
        ArtifactPuller::new(config)
            .pull(&request.image, &artifact_dir, &PullOptions::default())
            .await?;
        true
    };

    match deploy_local(request, &artifact_dir, deploy_dir) {
        Ok(mut deployment) => {
            deployment.pulled = pulled;
            Ok(deployment)
        }
        Err(OscarError::ArtifactMissingError { entrypoint, .. }) => Err(OscarError::ArtifactMissingError {
            reference: request.image.clone(),
            entrypoint,
        }),
        Err(e) => Err(e),
    }
}

/// Deploy from an artifact directory that is already present.
pub fn deploy_local(request: &DeployRequest, artifact_dir: &Path, deploy_dir: &Path) -> Result<Deployment> {
    validate_instance_name(&request.instance_name)?;

    let script = artifact_dir.join(ENTRYPOINT);
    if !script.is_file() {
        return Err(OscarError::ArtifactMissingError {
            reference: artifact_dir.display().to_string(),
            entrypoint: script.display().to_string(),
        });
    }

    let overrides = Overrides {
        script: script.display().to_string(),
        topics: request.topics.clone(),
        interval: request.interval.clone().filter(|i| !i.is_empty()),
    };

    let template = find_template(artifact_dir);
    let doc = match &template {
        Some(path) => {
            let contents = std::fs::read_to_string(path).map_err(|e| OscarError::TemplateError {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
            merge_template(&contents, path, &overrides)?
        }
        None => minimal_document(&overrides)?,
    };
    let rendered = toml::to_string(&doc)?;

    std::fs::create_dir_all(deploy_dir).map_err(|e| OscarError::local_write(deploy_dir, e))?;
    let path = instance_path(deploy_dir, &request.instance_name);
    std::fs::write(&path, rendered).map_err(|e| OscarError::local_write(&path, e))?;

    tracing::info!(
        instance = %request.instance_name,
        path = %path.display(),
        template = ?template,
        "Instance deployed"
    );

    Ok(Deployment {
        instance_name: request.instance_name.clone(),
        path,
        script,
        template,
        pulled: false,
    })
}
