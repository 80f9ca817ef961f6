use thiserror::Error;

/// Oscar error types
#[derive(Error, Debug)]
pub enum OscarError {
    /// Artifact reference could not be parsed
    #[error("Invalid reference '{reference}': {message}")]
    InvalidReferenceError { reference: String, message: String },

    /// Registry rejected the supplied credentials
    #[error("Authentication failed for {reference}: {message}")]
    AuthError { reference: String, message: String },

    /// Reference or local source does not exist
    #[error("Not found: {target} - {message}")]
    NotFoundError { target: String, message: String },

    /// Transport failure while talking to a registry
    #[error("Network error for {reference}: {message}")]
    NetworkError { reference: String, message: String },

    /// Tarball download failed
    #[error("Failed to fetch {source_url}: {message}")]
    FetchError { source_url: String, message: String },

    /// Archive stream is not a valid (gzip) tar
    #[error("Corrupt archive {source_name}: {message}")]
    CorruptArchiveError { source_name: String, message: String },

    /// Failed to persist content to the local filesystem
    #[error("Failed to write {path}: {message}")]
    LocalWriteError { path: String, message: String },

    /// Artifact is present locally but lacks the expected entrypoint
    #[error("Artifact {reference} does not contain the expected entrypoint {entrypoint}")]
    ArtifactMissingError { reference: String, entrypoint: String },

    /// Bundled flow template could not be decoded or merged
    #[error("Template error in {path}: {message}")]
    TemplateError { path: String, message: String },

    /// Instance name cannot be used as a file name
    #[error("Invalid instance name '{0}'")]
    InvalidInstanceName(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl OscarError {
    /// Wrap a filesystem failure with the path it happened on.
    pub fn local_write(path: &std::path::Path, err: impl std::fmt::Display) -> Self {
        OscarError::LocalWriteError {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for OscarError {
    fn from(err: serde_json::Error) -> Self {
        OscarError::SerializationError(err.to_string())
    }
}

impl From<toml::de::Error> for OscarError {
    fn from(err: toml::de::Error) -> Self {
        OscarError::SerializationError(err.to_string())
    }
}

impl From<toml::ser::Error> for OscarError {
    fn from(err: toml::ser::Error) -> Self {
        OscarError::SerializationError(err.to_string())
    }
}

/// Result type alias for Oscar operations
pub type Result<T> = std::result::Result<T, OscarError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_reference_display() {
        let error = OscarError::InvalidReferenceError {
            reference: "ghcr.io//repo".to_string(),
            message: "empty path component".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid reference 'ghcr.io//repo': empty path component"
        );
    }

    #[test]
    fn test_auth_error_display() {
        let error = OscarError::AuthError {
            reference: "ghcr.io/example/counter:1.0".to_string(),
            message: "401 Unauthorized".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Authentication failed for ghcr.io/example/counter:1.0: 401 Unauthorized"
        );
    }

    #[test]
    fn test_artifact_missing_display() {
        let error = OscarError::ArtifactMissingError {
            reference: "ghcr.io/example/counter:1.0".to_string(),
            entrypoint: "/images/example/counter/lib/main.js".to_string(),
        };
        assert!(error.to_string().contains("/images/example/counter/lib/main.js"));
    }

    #[test]
    fn test_local_write_helper() {
        let error = OscarError::local_write(std::path::Path::new("/tmp/x"), "disk full");
        assert_eq!(error.to_string(), "Failed to write /tmp/x: disk full");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: OscarError = io_error.into();
        assert!(matches!(error, OscarError::IoError(_)));
        assert!(error.to_string().contains("file not found"));
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let result: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ invalid");
        let error: OscarError = result.unwrap_err().into();
        assert!(matches!(error, OscarError::SerializationError(_)));
    }

    #[test]
    fn test_toml_error_conversion() {
        let result: std::result::Result<toml::Table, _> = toml::from_str("steps = [");
        let error: OscarError = result.unwrap_err().into();
        assert!(matches!(error, OscarError::SerializationError(_)));
    }
}
