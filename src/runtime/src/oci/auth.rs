//! Registry credential resolution.
//!
//! Credentials are looked up through an ordered chain of sources:
//!
//! 1. the Docker-compatible native store (`config.json`, credential helpers)
//! 2. the generic on-disk [`CredentialStore`]
//! 3. the static `registries` list from the configuration
//!
//! The first source yielding a non-empty username and password wins. A
//! source that fails internally is treated as a miss.

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use base64::Engine;
use oscar_core::config::{OscarConfig, RegistryCredential};
use oscar_core::error::{OscarError, Result};
use serde::Deserialize;

use super::credentials::CredentialStore;

/// A single place registry credentials can come from.
pub trait CredentialSource: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Look up credentials for a registry host.
    fn lookup(&self, registry: &str) -> Result<Option<RegistryCredential>>;
}

/// Priority-ordered list of credential sources.
pub struct CredentialChain {
    sources: Vec<Box<dyn CredentialSource>>,
}

impl CredentialChain {
    /// Build the standard chain for a configuration.
    pub fn from_config(config: &OscarConfig) -> Self {
        let mut sources: Vec<Box<dyn CredentialSource>> = Vec::new();
        if let Some(dir) = config.docker_config_dir() {
            sources.push(Box::new(DockerCredentials::new(dir)));
        }
        if let Some(path) = config.credential_store_path() {
            sources.push(Box::new(CredentialStore::new(path)));
        }
        sources.push(Box::new(StaticCredentials::new(config.registries.clone())));
        Self::with_sources(sources)
    }

    /// Build a chain from explicit sources, consulted in order.
    pub fn with_sources(sources: Vec<Box<dyn CredentialSource>>) -> Self {
        Self { sources }
    }

    /// Return the best available credential for `registry`, if any.
    ///
    /// `None` means the registry should be accessed anonymously.
    pub fn resolve(&self, registry: &str) -> Option<RegistryCredential> {
        for source in &self.sources {
            match source.lookup(registry) {
                Ok(Some(cred)) if !cred.username.is_empty() && !cred.password.is_empty() => {
                    tracing::debug!(registry, source = source.name(), "Using registry credentials");
                    return Some(cred);
                }
                Ok(_) => {
                    tracing::debug!(registry, source = source.name(), "No credentials found");
                }
                Err(e) => {
                    tracing::debug!(
                        registry,
                        source = source.name(),
                        error = %e,
                        "Credential source failed, trying next"
                    );
                }
            }
        }
        tracing::debug!(registry, "No credentials found, using anonymous access");
        None
    }
}

impl CredentialSource for CredentialStore {
    fn name(&self) -> &'static str {
        "credential-store"
    }

    fn lookup(&self, registry: &str) -> Result<Option<RegistryCredential>> {
        Ok(self.get(registry)?.map(|(username, password)| RegistryCredential {
            registry: registry.to_string(),
            username,
            password,
        }))
    }
}

/// Credentials listed in the configuration file, matched by exact host.
pub struct StaticCredentials {
    entries: Vec<RegistryCredential>,
}

impl StaticCredentials {
    pub fn new(entries: Vec<RegistryCredential>) -> Self {
        Self { entries }
    }
}

impl CredentialSource for StaticCredentials {
    fn name(&self) -> &'static str {
        "config"
    }

    fn lookup(&self, registry: &str) -> Result<Option<RegistryCredential>> {
        Ok(self.entries.iter().find(|c| c.registry == registry).cloned())
    }
}

/// Docker client `config.json` contents relevant to authentication.
#[derive(Debug, Default, Deserialize)]
struct DockerConfigFile {
    #[serde(default)]
    auths: HashMap<String, DockerAuthEntry>,
    #[serde(default, rename = "credHelpers")]
    cred_helpers: HashMap<String, String>,
    #[serde(default, rename = "credsStore")]
    creds_store: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DockerAuthEntry {
    auth: Option<String>,
    username: Option<String>,
    password: Option<String>,
}

/// Response of `docker-credential-<helper> get`.
#[derive(Debug, Deserialize)]
struct HelperResponse {
    #[serde(rename = "Username")]
    username: String,
    #[serde(rename = "Secret")]
    secret: String,
}

/// Docker-compatible native credential store.
///
/// Honors `credHelpers` and `credsStore` by invoking the
/// `docker-credential-<helper>` binary, and falls back to inline `auths`.
pub struct DockerCredentials {
    config_dir: PathBuf,
}

impl DockerCredentials {
    pub fn new(config_dir: PathBuf) -> Self {
        Self { config_dir }
    }

    fn load(&self) -> Result<Option<DockerConfigFile>> {
        let path = self.config_dir.join("config.json");
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&data)?))
    }
}

impl CredentialSource for DockerCredentials {
    fn name(&self) -> &'static str {
        "docker"
    }

    fn lookup(&self, registry: &str) -> Result<Option<RegistryCredential>> {
        let Some(config) = self.load()? else {
            return Ok(None);
        };

        let helper = config
            .cred_helpers
            .get(registry)
            .or(config.creds_store.as_ref());
        if let Some(helper) = helper {
            match run_credential_helper(helper, registry) {
                Ok(Some(cred)) => return Ok(Some(cred)),
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(registry, helper, error = %e, "Credential helper failed, trying auths");
                }
            }
        }

        let entry = config
            .auths
            .iter()
            .find(|(key, _)| canonical_host(auth_key_host(key)) == canonical_host(registry))
            .map(|(_, entry)| entry);
        match entry {
            Some(entry) => decode_auth_entry(registry, entry).map(Some),
            None => Ok(None),
        }
    }
}

/// Reduce an `auths` key such as `https://index.docker.io/v1/` to its host.
fn auth_key_host(key: &str) -> &str {
    let key = key
        .strip_prefix("https://")
        .or_else(|| key.strip_prefix("http://"))
        .unwrap_or(key);
    key.split('/').next().unwrap_or(key)
}

/// Docker Hub is known under several names; `auths` uses the index one.
fn canonical_host(host: &str) -> &str {
    match host {
        "docker.io" | "registry-1.docker.io" => "index.docker.io",
        other => other,
    }
}

fn decode_auth_entry(registry: &str, entry: &DockerAuthEntry) -> Result<RegistryCredential> {
    if let Some(auth) = entry.auth.as_deref().filter(|a| !a.is_empty()) {
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(auth)
            .map_err(|e| OscarError::ConfigError(format!("Invalid docker auth for {}: {}", registry, e)))?;
        let decoded = String::from_utf8(decoded)
            .map_err(|e| OscarError::ConfigError(format!("Invalid docker auth for {}: {}", registry, e)))?;
        let (username, password) = decoded.split_once(':').ok_or_else(|| {
            OscarError::ConfigError(format!("Invalid docker auth for {}: missing ':'", registry))
        })?;
        return Ok(RegistryCredential {
            registry: registry.to_string(),
            username: username.to_string(),
            password: password.to_string(),
        });
    }

    Ok(RegistryCredential {
        registry: registry.to_string(),
        username: entry.username.clone().unwrap_or_default(),
        password: entry.password.clone().unwrap_or_default(),
    })
}

fn run_credential_helper(helper: &str, registry: &str) -> Result<Option<RegistryCredential>> {
    let program = format!("docker-credential-{}", helper);
    let mut child = Command::new(&program)
        .arg("get")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(registry.as_bytes())?;
    }
    let output = child.wait_with_output()?;
    if !output.status.success() {
        // Helpers exit non-zero when they hold nothing for this host.
        return Ok(None);
    }

    let response: HelperResponse = serde_json::from_slice(&output.stdout)?;
    if response.username == "<token>" {
        tracing::debug!(registry, helper, "Identity tokens are not supported, skipping");
        return Ok(None);
    }
    Ok(Some(RegistryCredential {
        registry: registry.to_string(),
        username: response.username,
        password: response.secret,
    }))
}
