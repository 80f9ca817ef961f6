//! Content-addressed cache for registry blobs.
//!
//! Each blob is stored by its digest under `<cache_dir>/sha256/<hex>`, so a
//! layer shared between artifacts, or re-pulled unchanged, is downloaded once.
//! Entries are re-hashed on read; a mismatching entry is treated as a miss.

use std::path::{Path, PathBuf};

use oscar_core::error::{OscarError, Result};
use sha2::{Digest, Sha256};

/// Content-addressed blob cache.
pub struct BlobCache {
    /// Root directory (e.g., ~/.tedge/images/.cache/blobs)
    cache_dir: PathBuf,
}

impl BlobCache {
    /// Create a blob cache rooted at `cache_dir`. The directory is created lazily.
    pub fn new(cache_dir: &Path) -> Self {
        Self {
            cache_dir: cache_dir.to_path_buf(),
        }
    }

    /// Get a cached blob by digest.
    ///
    /// Returns `None` when the blob is absent, uses an unsupported algorithm,
    /// or no longer matches its digest.
    pub fn get(&self, digest: &str) -> Option<Vec<u8>> {
        let path = self.blob_path(digest)?;
        let data = std::fs::read(&path).ok()?;
        if sha256_digest(&data) != digest {
            tracing::debug!(digest, path = %path.display(), "Discarding stale cached blob");
            if let Err(e) = self.invalidate(digest) {
                tracing::warn!(digest, error = %e, "Failed to remove stale cached blob");
            }
            return None;
        }
        tracing::debug!(digest, size = data.len(), "Using cached blob");
        Some(data)
    }

    /// Store a blob under its digest (write tmp, rename).
    pub fn put(&self, digest: &str, data: &[u8]) -> Result<()> {
        let Some(path) = self.blob_path(digest) else {
            tracing::debug!(digest, "Not caching blob with unsupported digest");
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| OscarError::local_write(parent, e))?;
        }

        let tmp_path = path.with_extension("tmp");
        std::fs::write(&tmp_path, data).map_err(|e| OscarError::local_write(&tmp_path, e))?;
        std::fs::rename(&tmp_path, &path).map_err(|e| OscarError::local_write(&path, e))?;
        Ok(())
    }

    /// Remove a cached blob. Missing entries are not an error.
    pub fn invalidate(&self, digest: &str) -> Result<()> {
        if let Some(path) = self.blob_path(digest) {
            if path.exists() {
                std::fs::remove_file(&path).map_err(|e| OscarError::local_write(&path, e))?;
            }
        }
        Ok(())
    }

    /// Map a `sha256:<hex>` digest to its path; other algorithms are not cached.
    fn blob_path(&self, digest: &str) -> Option<PathBuf> {
        let hex = digest.strip_prefix("sha256:")?;
        if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        Some(self.cache_dir.join("sha256").join(hex))
    }
}

/// Compute the `sha256:<hex>` digest of `data`.
pub fn sha256_digest(data: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(data)))
}
