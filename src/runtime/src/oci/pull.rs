//! High-level artifact pull orchestrator.
//!
//! Resolves credentials, pulls through the registry client into a staging
//! directory next to the destination, and swaps the staging directory into
//! place only once the pull succeeded. A failed pull leaves any previous
//! content of the destination untouched.

use std::fs::File;
use std::path::{Path, PathBuf};

use oscar_core::config::OscarConfig;
use oscar_core::error::{OscarError, Result};

use super::auth::CredentialChain;
use super::reference::ImageReference;
use super::registry::{RegistryAuth, RegistryPuller};
use crate::cache::BlobCache;

/// Result of a successful pull.
#[derive(Debug, Clone)]
pub struct PulledArtifact {
    /// Normalized reference that was pulled
    pub reference: String,
    /// Manifest digest
    pub digest: String,
    /// Directory holding the artifact
    pub path: PathBuf,
}

/// Options controlling a pull.
#[derive(Debug, Clone, Default)]
pub struct PullOptions {
    /// Also write a tar snapshot of the pulled directory here
    pub tarball_path: Option<PathBuf>,
    /// Bypass the local blob cache
    pub cache_disabled: bool,
}

/// Pulls artifacts into the local image directory.
pub struct ArtifactPuller {
    credentials: CredentialChain,
    cache_dir: PathBuf,
    insecure_registries: Vec<String>,
}

impl ArtifactPuller {
    /// Create a puller using the credential chain, cache and registry
    /// settings of `config`.
    pub fn new(config: &OscarConfig) -> Self {
        Self {
            credentials: CredentialChain::from_config(config),
            cache_dir: blob_cache_dir(&config.image_dir),
            insecure_registries: config.insecure_registries.clone(),
        }
    }

    /// Pull `reference` into `output_dir`.
    pub async fn pull(
        &self,
        reference: &str,
        output_dir: &Path,
        options: &PullOptions,
    ) -> Result<PulledArtifact> {
        let parsed = ImageReference::parse(reference)?;
        let credential = self.credentials.resolve(&parsed.registry);

        let mut puller = RegistryPuller::new(RegistryAuth::from(credential), &self.insecure_registries);
        if !options.cache_disabled {
            puller = puller.with_cache(BlobCache::new(&self.cache_dir));
        }

        let staging = staging_dir(output_dir)?;
        let pulled = puller.pull_into(&parsed, staging.path()).await?;

        if let Some(ref tarball) = options.tarball_path {
            write_snapshot(staging.path(), tarball)?;
        }

        replace_dir(staging.keep(), output_dir)?;

        tracing::info!(
            reference = %parsed,
            digest = %pulled.digest,
            path = %output_dir.display(),
            "Artifact ready"
        );

        Ok(PulledArtifact {
            reference: parsed.full_reference(),
            digest: pulled.digest,
            path: output_dir.to_path_buf(),
        })
    }
}

/// Location of the blob cache inside an image directory.
pub fn blob_cache_dir(image_dir: &Path) -> PathBuf {
    image_dir.join(".cache").join("blobs")
}

/// Create a staging directory on the same filesystem as `output_dir`.
fn staging_dir(output_dir: &Path) -> Result<tempfile::TempDir> {
    let parent = output_dir
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent).map_err(|e| OscarError::local_write(parent, e))?;

    tempfile::Builder::new()
        .prefix(".pull-")
        .tempdir_in(parent)
        .map_err(|e| OscarError::local_write(parent, e))
}

/// Move `staged` to `output_dir`, replacing whatever was there.
fn replace_dir(staged: PathBuf, output_dir: &Path) -> Result<()> {
    let result = (|| {
        if output_dir.exists() {
            std::fs::remove_dir_all(output_dir)?;
        }
        std::fs::rename(&staged, output_dir)
    })();

    result.map_err(|e| {
        let _ = std::fs::remove_dir_all(&staged);
        OscarError::local_write(output_dir, e)
    })
}

/// Write every regular file below `dir` into a tar at `tarball`.
///
/// Entry names are relative to `dir`, so loading the snapshot reproduces the
/// directory.
pub fn write_snapshot(dir: &Path, tarball: &Path) -> Result<()> {
    if let Some(parent) = tarball.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| OscarError::local_write(parent, e))?;
    }
    let file = File::create(tarball).map_err(|e| OscarError::local_write(tarball, e))?;
    let mut builder = tar::Builder::new(file);

    let mut files = Vec::new();
    collect_files(dir, dir, &mut files).map_err(|e| OscarError::local_write(tarball, e))?;
    files.sort();

    for relative in &files {
        builder
            .append_path_with_name(dir.join(relative), relative)
            .map_err(|e| OscarError::local_write(tarball, e))?;
    }
    builder
        .finish()
        .map_err(|e| OscarError::local_write(tarball, e))?;

    tracing::debug!(
        tarball = %tarball.display(),
        files = files.len(),
        "Wrote artifact snapshot"
    );
    Ok(())
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let path = entry.path();
        if file_type.is_dir() {
            collect_files(root, &path, out)?;
        } else if file_type.is_file() {
            if let Ok(relative) = path.strip_prefix(root) {
                out.push(relative.to_path_buf());
            }
        }
    }
    Ok(())
}
