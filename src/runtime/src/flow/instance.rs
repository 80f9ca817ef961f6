//! Deployed flow instances: naming, listing and removal.

use std::fs::ReadDir;
use std::path::{Path, PathBuf};

use oscar_core::error::{OscarError, Result};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use crate::oci::{trim_version, MANIFEST_FILE, VERSION_ANNOTATION};

/// Extension of instance definition files.
pub const INSTANCE_EXTENSION: &str = "toml";

const INVALID_IMAGE: &str = "<invalid>";
const UNKNOWN_VERSION: &str = "<unknown>";

/// Typed view of an instance definition, used for listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InstanceDefinition {
    /// Steps in file order, from either `[[steps]]` or `[steps.<name>]`
    #[serde(default, deserialize_with = "steps_in_order")]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub input: Option<Input>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Step {
    pub script: String,
    #[serde(default)]
    pub interval: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Input {
    #[serde(default)]
    pub mqtt: Option<Mqtt>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Mqtt {
    #[serde(default)]
    pub topics: Vec<String>,
}

fn steps_in_order<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Vec<Step>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Steps {
        Sequence(Vec<Step>),
        Named(toml::Table),
    }

    match Steps::deserialize(deserializer)? {
        Steps::Sequence(steps) => Ok(steps),
        Steps::Named(table) => table
            .into_iter()
            .map(|(name, step)| {
                step.try_into::<Step>()
                    .map_err(|e| D::Error::custom(format!("step '{}': {}", name, e)))
            })
            .collect(),
    }
}

impl InstanceDefinition {
    /// Subscription topics, empty when the input section is absent.
    pub fn topics(&self) -> &[String] {
        self.input
            .as_ref()
            .and_then(|i| i.mqtt.as_ref())
            .map(|m| m.topics.as_slice())
            .unwrap_or_default()
    }
}

/// One row of an instance listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceSummary {
    pub name: String,
    /// Definition path as shown to the user
    pub path: String,
    /// Topics joined by ", "
    pub topics: String,
    pub image: String,
    #[serde(rename = "imageVersion")]
    pub image_version: String,
}

impl InstanceSummary {
    /// Value of a listing column by its display name.
    pub fn column(&self, name: &str) -> Option<&str> {
        match name {
            "name" => Some(&self.name),
            "path" => Some(&self.path),
            "topics" => Some(&self.topics),
            "image" => Some(&self.image),
            "imageVersion" => Some(&self.image_version),
            _ => None,
        }
    }
}

/// Column names of an instance listing, in display order.
pub const SUMMARY_COLUMNS: [&str; 5] = ["name", "path", "topics", "image", "imageVersion"];

/// Reject names that cannot serve as a file name in the deploy directory.
pub fn validate_instance_name(name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.contains('\0');
    if invalid {
        return Err(OscarError::InvalidInstanceName(name.to_string()));
    }
    Ok(())
}

/// Path of the definition file of `name`.
pub fn instance_path(deploy_dir: &Path, name: &str) -> PathBuf {
    deploy_dir.join(format!("{}.{}", name, INSTANCE_EXTENSION))
}

/// Read side over a deploy directory.
#[derive(Debug, Clone)]
pub struct InstanceRegistry {
    deploy_dir: PathBuf,
    display_dir: String,
}

impl InstanceRegistry {
    /// Create a registry over `deploy_dir`.
    ///
    /// Paths in summaries are shown below `display_dir`, typically the
    /// deploy directory as written in the configuration.
    pub fn new(deploy_dir: impl Into<PathBuf>, display_dir: impl Into<String>) -> Self {
        Self {
            deploy_dir: deploy_dir.into(),
            display_dir: display_dir.into(),
        }
    }

    /// Start a fresh pass over the deploy directory.
    ///
    /// A missing directory yields an empty listing.
    pub fn list(&self) -> Result<Instances<'_>> {
        let entries = match std::fs::read_dir(&self.deploy_dir) {
            Ok(entries) => Some(entries),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(OscarError::IoError(e)),
        };
        tracing::debug!(path = %self.deploy_dir.display(), "Reading deploy directory");
        Ok(Instances {
            registry: self,
            entries,
        })
    }

    fn summarize(&self, file_name: &str, name: &str, path: &Path) -> InstanceSummary {
        let mut summary = InstanceSummary {
            name: name.to_string(),
            path: display_path(&self.display_dir, file_name),
            topics: String::new(),
            image: INVALID_IMAGE.to_string(),
            image_version: UNKNOWN_VERSION.to_string(),
        };

        let definition = match read_definition(path) {
            Ok(definition) => definition,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read instance definition");
                return summary;
            }
        };
        let Some(first) = definition.steps.first() else {
            tracing::warn!(path = %path.display(), "Instance definition has no steps");
            return summary;
        };

        summary.topics = definition.topics().join(", ");

        // <image_dir>/<name>/lib/main.js
        let artifact_dir = Path::new(&first.script).parent().and_then(Path::parent);
        if let Some(dir) = artifact_dir {
            if let Some(base) = dir.file_name().and_then(|n| n.to_str()) {
                summary.image = trim_version(base);
            }
            if let Some(version) = read_manifest_version(&dir.join(MANIFEST_FILE)) {
                summary.image_version = version;
            }
        }
        summary
    }
}

/// Lazy iterator over the instances of a deploy directory.
pub struct Instances<'a> {
    registry: &'a InstanceRegistry,
    entries: Option<ReadDir>,
}

impl Iterator for Instances<'_> {
    type Item = InstanceSummary;

    fn next(&mut self) -> Option<Self::Item> {
        let entries = self.entries.as_mut()?;
        for entry in entries.by_ref() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read deploy directory entry");
                    continue;
                }
            };
            let path = entry.path();
            if path.is_dir() {
                continue;
            }
            let Some(file_name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let Some(name) = file_name.strip_suffix(&format!(".{}", INSTANCE_EXTENSION)) else {
                continue;
            };
            return Some(self.registry.summarize(&file_name, name, &path));
        }
        None
    }
}

/// Delete `<deploy_dir>/<name>.toml`. Returns false if it did not exist.
pub fn remove_instance(deploy_dir: &Path, name: &str) -> Result<bool> {
    validate_instance_name(name)?;
    let path = instance_path(deploy_dir, name);
    match std::fs::remove_file(&path) {
        Ok(()) => {
            tracing::info!(instance = name, path = %path.display(), "Instance removed");
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(instance = name, "Instance does not exist, nothing to remove");
            Ok(false)
        }
        Err(e) => Err(OscarError::local_write(&path, e)),
    }
}

/// Decode an instance definition file.
pub fn read_definition(path: &Path) -> Result<InstanceDefinition> {
    let contents = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&contents)?)
}

fn read_manifest_version(path: &Path) -> Option<String> {
    let contents = std::fs::read_to_string(path).ok()?;
    let manifest: serde_json::Value = serde_json::from_str(&contents).ok()?;
    manifest
        .get("annotations")?
        .get(VERSION_ANNOTATION)?
        .as_str()
        .map(str::to_string)
}

fn display_path(display_dir: &str, file_name: &str) -> String {
    if display_dir.is_empty() {
        return file_name.to_string();
    }
    Path::new(display_dir).join(file_name).display().to_string()
}
