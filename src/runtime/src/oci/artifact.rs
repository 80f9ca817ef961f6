//! Materialize artifact layers into a directory.
//!
//! Flow artifacts are pushed with ORAS-style annotations. A layer carrying a
//! title annotation is a plain file (or a packed directory when the unpack
//! annotation is set); an untitled tar layer is an image-style filesystem
//! layer that is extracted in place.

use std::path::Path;

use oci_distribution::manifest::OciDescriptor;
use oscar_core::error::{OscarError, Result};

use super::layers::{extract_stream, sanitize_entry_path};

/// File name of the manifest copy kept at the root of every pulled artifact.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Layer annotation holding the file name of the layer.
pub const TITLE_ANNOTATION: &str = "org.opencontainers.image.title";

/// Layer annotation marking a packed directory to unpack.
pub const UNPACK_ANNOTATION: &str = "io.deis.oras.content.unpack";

/// Manifest annotation holding the artifact version.
pub const VERSION_ANNOTATION: &str = "org.opencontainers.image.version";

/// What to do with a layer's content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LayerAction {
    /// Write the blob as a file at this relative path
    File(String),
    /// Extract the blob as a tar stream
    Unpack { gzip: bool },
    /// Ignore the layer
    Skip,
}

/// Decide how a layer is materialized from its media type and annotations.
pub(crate) fn classify_layer(media_type: &str, title: Option<&str>, unpack: bool) -> LayerAction {
    let is_tar = media_type.contains(".tar") || media_type.ends_with("tar");
    let gzip = media_type.contains("gzip");

    if unpack {
        return LayerAction::Unpack { gzip };
    }
    match title {
        Some(title) if !title.is_empty() => LayerAction::File(title.to_string()),
        _ if is_tar => LayerAction::Unpack { gzip },
        _ => LayerAction::Skip,
    }
}

/// Write one layer into `target_dir`.
pub fn materialize_layer(descriptor: &OciDescriptor, data: &[u8], target_dir: &Path) -> Result<()> {
    let annotation = |key: &str| {
        descriptor
            .annotations
            .as_ref()
            .and_then(|a| a.get(key))
            .map(|v| v.as_str())
    };
    let unpack = annotation(UNPACK_ANNOTATION) == Some("true");

    match classify_layer(&descriptor.media_type, annotation(TITLE_ANNOTATION), unpack) {
        LayerAction::File(title) => write_titled_file(&title, data, target_dir),
        LayerAction::Unpack { gzip } => {
            // Some registries report a plain tar media type for gzipped blobs.
            let gzip = gzip || data.starts_with(&[0x1f, 0x8b]);
            extract_stream(data, gzip, &descriptor.digest, target_dir)?;
            Ok(())
        }
        LayerAction::Skip => {
            tracing::warn!(
                digest = %descriptor.digest,
                media_type = %descriptor.media_type,
                "Skipping layer with no title and no archive media type"
            );
            Ok(())
        }
    }
}

fn write_titled_file(title: &str, data: &[u8], target_dir: &Path) -> Result<()> {
    let Some(relative) = sanitize_entry_path(Path::new(title)) else {
        tracing::warn!(title, "Skipping layer whose title uses '..' within the path");
        return Ok(());
    };

    let out_path = target_dir.join(relative);
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| OscarError::local_write(parent, e))?;
    }
    std::fs::write(&out_path, data).map_err(|e| OscarError::local_write(&out_path, e))?;
    tracing::debug!(path = %out_path.display(), bytes = data.len(), "Wrote layer file");
    Ok(())
}
