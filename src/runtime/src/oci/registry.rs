//! OCI registry client for pulling flow artifacts.
//!
//! Uses the `oci-distribution` crate to talk to registries (GHCR, Docker Hub,
//! self-hosted). Blobs go through an optional [`BlobCache`] and are verified
//! against their descriptor digest before use.

use std::path::Path;

use oci_distribution::client::{ClientConfig, ClientProtocol};
use oci_distribution::errors::{OciDistributionError, OciErrorCode};
use oci_distribution::manifest::{OciDescriptor, OciImageManifest};
use oci_distribution::secrets::RegistryAuth as OciRegistryAuth;
use oci_distribution::{Client, Reference};
use oscar_core::config::RegistryCredential;
use oscar_core::error::{OscarError, Result};

use super::artifact::{materialize_layer, MANIFEST_FILE};
use super::reference::ImageReference;
use crate::cache::{sha256_digest, BlobCache};

/// Authentication credentials for a registry.
#[derive(Debug, Clone)]
pub struct RegistryAuth {
    username: Option<String>,
    password: Option<String>,
}

impl RegistryAuth {
    /// Create anonymous authentication (no credentials).
    pub fn anonymous() -> Self {
        Self {
            username: None,
            password: None,
        }
    }

    /// Create basic authentication with username and password.
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
        }
    }

    /// Whether credentials are attached.
    pub fn is_anonymous(&self) -> bool {
        self.username.is_none() || self.password.is_none()
    }

    /// Convert to oci-distribution auth type.
    fn to_oci_auth(&self) -> OciRegistryAuth {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) => OciRegistryAuth::Basic(u.clone(), p.clone()),
            _ => OciRegistryAuth::Anonymous,
        }
    }
}

impl From<Option<RegistryCredential>> for RegistryAuth {
    fn from(credential: Option<RegistryCredential>) -> Self {
        match credential {
            Some(c) => Self::basic(c.username, c.password),
            None => Self::anonymous(),
        }
    }
}

/// Manifest of a pulled artifact.
#[derive(Debug, Clone)]
pub struct PulledManifest {
    /// Manifest digest (e.g., "sha256:abc...")
    pub digest: String,
    pub manifest: OciImageManifest,
}

/// Pulls flow artifacts from OCI registries.
pub struct RegistryPuller {
    client: Client,
    auth: RegistryAuth,
    cache: Option<BlobCache>,
}

impl RegistryPuller {
    /// Create a registry puller.
    ///
    /// Hosts listed in `insecure_registries` are reached over plain HTTP,
    /// every other registry over HTTPS.
    pub fn new(auth: RegistryAuth, insecure_registries: &[String]) -> Self {
        let protocol = if insecure_registries.is_empty() {
            ClientProtocol::Https
        } else {
            ClientProtocol::HttpsExcept(insecure_registries.to_vec())
        };
        let config = ClientConfig {
            protocol,
            ..Default::default()
        };
        let client = Client::new(config);

        Self {
            client,
            auth,
            cache: None,
        }
    }

    /// Reuse and populate a blob cache.
    pub fn with_cache(mut self, cache: BlobCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Pull an artifact and materialize its layers into `target_dir`.
    ///
    /// Layers are applied in manifest order; the manifest itself is written
    /// to `manifest.json` at the root of `target_dir`.
    pub async fn pull_into(
        &self,
        reference: &ImageReference,
        target_dir: &Path,
    ) -> Result<PulledManifest> {
        let oci_ref = self.to_oci_reference(reference)?;

        tracing::info!(
            reference = %reference,
            target = %target_dir.display(),
            authenticated = !self.auth.is_anonymous(),
            "Pulling artifact from registry"
        );

        std::fs::create_dir_all(target_dir).map_err(|e| OscarError::local_write(target_dir, e))?;

        let auth = self.auth.to_oci_auth();
        let (manifest, digest) = self
            .client
            .pull_image_manifest(&oci_ref, &auth)
            .await
            .map_err(|e| classify_error(reference, "pull manifest", e))?;

        for layer in &manifest.layers {
            tracing::debug!(
                digest = %layer.digest,
                size = layer.size,
                media_type = %layer.media_type,
                "Pulling layer"
            );
            let data = self.pull_blob(&oci_ref, reference, layer).await?;
            materialize_layer(layer, &data, target_dir)?;
        }

        let manifest_path = target_dir.join(MANIFEST_FILE);
        let manifest_json = serde_json::to_vec_pretty(&manifest)?;
        std::fs::write(&manifest_path, &manifest_json)
            .map_err(|e| OscarError::local_write(&manifest_path, e))?;

        tracing::info!(
            reference = %reference,
            digest = %digest,
            layers = manifest.layers.len(),
            "Artifact pulled successfully"
        );

        Ok(PulledManifest { digest, manifest })
    }

    /// Fetch one blob, consulting the cache first.
    async fn pull_blob(
        &self,
        oci_ref: &Reference,
        reference: &ImageReference,
        descriptor: &OciDescriptor,
    ) -> Result<Vec<u8>> {
        if let Some(data) = self.cache.as_ref().and_then(|c| c.get(&descriptor.digest)) {
            return Ok(data);
        }

        let mut data: Vec<u8> = Vec::new();
        self.client
            .pull_blob(oci_ref, descriptor, &mut data)
            .await
            .map_err(|e| classify_error(reference, &format!("pull layer {}", descriptor.digest), e))?;

        verify_blob(reference, descriptor, &data)?;

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.put(&descriptor.digest, &data) {
                tracing::warn!(digest = %descriptor.digest, error = %e, "Failed to cache blob");
            }
        }
        Ok(data)
    }

    /// Convert an ImageReference to an oci-distribution Reference.
    fn to_oci_reference(&self, reference: &ImageReference) -> Result<Reference> {
        let ref_str = if let Some(ref digest) = reference.digest {
            format!("{}/{}@{}", reference.registry, reference.repository, digest)
        } else if let Some(ref tag) = reference.tag {
            format!("{}/{}:{}", reference.registry, reference.repository, tag)
        } else {
            format!("{}/{}:latest", reference.registry, reference.repository)
        };

        ref_str
            .parse::<Reference>()
            .map_err(|e| OscarError::InvalidReferenceError {
                reference: ref_str.clone(),
                message: e.to_string(),
            })
    }
}

/// Check downloaded bytes against their `sha256:` descriptor digest.
///
/// Digests of other algorithms are accepted unchecked.
fn verify_blob(reference: &ImageReference, descriptor: &OciDescriptor, data: &[u8]) -> Result<()> {
    if descriptor.digest.starts_with("sha256:") && sha256_digest(data) != descriptor.digest {
        return Err(OscarError::NetworkError {
            reference: reference.to_string(),
            message: format!("digest mismatch for layer {}", descriptor.digest),
        });
    }
    Ok(())
}

/// Map a registry client error onto the error taxonomy.
fn classify_error(reference: &ImageReference, action: &str, err: OciDistributionError) -> OscarError {
    let reference = reference.to_string();
    let message = format!("Failed to {}: {}", action, err);

    let auth = || OscarError::AuthError {
        reference: reference.clone(),
        message: message.clone(),
    };
    let not_found = || OscarError::NotFoundError {
        target: reference.clone(),
        message: message.clone(),
    };
    let network = || OscarError::NetworkError {
        reference: reference.clone(),
        message: message.clone(),
    };

    match &err {
        OciDistributionError::AuthenticationFailure(_)
        | OciDistributionError::UnauthorizedError { .. } => auth(),
        OciDistributionError::ImageManifestNotFoundError(_) => not_found(),
        OciDistributionError::RegistryError { envelope, .. } => {
            let codes = || envelope.errors.iter().map(|e| &e.code);
            if codes().any(|c| matches!(c, OciErrorCode::Unauthorized | OciErrorCode::Denied)) {
                auth()
            } else if codes().any(|c| {
                matches!(
                    c,
                    OciErrorCode::ManifestUnknown
                        | OciErrorCode::BlobUnknown
                        | OciErrorCode::NameUnknown
                        | OciErrorCode::ManifestBlobUnknown
                )
            }) {
                not_found()
            } else {
                network()
            }
        }
        OciDistributionError::ServerError { code, .. } => match code {
            401 | 403 => auth(),
            404 => not_found(),
            _ => network(),
        },
        OciDistributionError::RequestError(_) => network(),
        _ => {
            let text = err.to_string().to_lowercase();
            if text.contains("unauthorized") || text.contains("denied") {
                auth()
            } else if text.contains("not found") || text.contains("unknown") {
                not_found()
            } else {
                network()
            }
        }
    }
}
