use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{OscarError, Result};

/// Mapper used when none is given on the command line.
pub const DEFAULT_MAPPER: &str = "flows";

/// thin-edge configuration directory assumed when `TEDGE_CONFIG_DIR` is unset.
pub const DEFAULT_TEDGE_CONFIG_DIR: &str = "/etc/tedge";

/// Environment variable overriding the configuration file location.
const CONFIG_PATH_ENV: &str = "TEDGE_OSCAR_CONFIG";

/// System-wide configuration file, used when present.
const SYSTEM_CONFIG_PATH: &str = "/etc/tedge/plugins/tedge-oscar.toml";

/// Built-in configuration, used when no configuration file exists.
const EMBEDDED_CONFIG: &str = include_str!("default-config.toml");

/// Static credential entry for a registry host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryCredential {
    /// Registry hostname, matched exactly (e.g. "ghcr.io")
    pub registry: String,
    pub username: String,
    pub password: String,
}

/// Oscar configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OscarConfig {
    /// Local cache root holding one directory per pulled artifact
    #[serde(default)]
    pub image_dir: PathBuf,

    /// Deploy directory template; may contain `{{.Mapper}}` and `{{.Env.NAME}}`
    #[serde(default)]
    pub deploy_dir: String,

    /// Static registry credentials, consulted after the credential stores
    #[serde(default)]
    pub registries: Vec<RegistryCredential>,

    /// Generic credential store file (JSON)
    #[serde(default)]
    pub credential_store: Option<PathBuf>,

    /// Directory holding the Docker `config.json`
    #[serde(default)]
    pub docker_config_dir: Option<PathBuf>,

    /// Registry hosts (`host` or `host:port`) reached over plain HTTP
    #[serde(default)]
    pub insecure_registries: Vec<String>,

    /// Value of `TEDGE_CONFIG_DIR` when the variable is not set
    #[serde(default)]
    pub tedge_config_dir: Option<String>,

    /// `image_dir` as written in the file, before expansion
    #[serde(skip)]
    pub unexpanded_image_dir: String,

    /// `deploy_dir` as written in the file, before expansion
    #[serde(skip)]
    pub unexpanded_deploy_dir: String,
}

impl OscarConfig {
    /// Resolve the configuration file location.
    ///
    /// Order: `$TEDGE_OSCAR_CONFIG`, the system-wide plugin file, the
    /// per-user config directory, then `./tedge-oscar.toml`.
    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            if !path.is_empty() {
                return PathBuf::from(expand_vars(&path, &process_env));
            }
        }

        let system = Path::new(SYSTEM_CONFIG_PATH);
        if system.exists() {
            return system.to_path_buf();
        }

        dirs::config_dir()
            .map(|dir| dir.join("tedge-oscar").join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("./tedge-oscar.toml"))
    }

    /// Load configuration from `path`, falling back to the built-in defaults
    /// when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "Config file not found, using built-in defaults");
            return Self::from_toml(EMBEDDED_CONFIG).map_err(|e| {
                OscarError::ConfigError(format!("Failed to load embedded config: {}", e))
            });
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            OscarError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&contents).map_err(|e| {
            OscarError::ConfigError(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    /// Parse a configuration document and expand it against the process environment.
    pub fn from_toml(contents: &str) -> Result<Self> {
        Self::from_toml_with(contents, &process_env)
    }

    /// Parse a configuration document, resolving variables through `lookup`.
    pub fn from_toml_with(contents: &str, lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config: OscarConfig = toml::from_str(contents)?;
        config.expand_with(lookup);
        Ok(config)
    }

    /// Expand `$VAR` references in every path and credential field.
    fn expand_with(&mut self, lookup: &dyn Fn(&str) -> Option<String>) {
        let tedge_dir = self
            .tedge_config_dir
            .clone()
            .unwrap_or_else(|| DEFAULT_TEDGE_CONFIG_DIR.to_string());
        let lookup = |name: &str| {
            lookup(name).or_else(|| (name == "TEDGE_CONFIG_DIR").then(|| tedge_dir.clone()))
        };

        self.unexpanded_image_dir = self.image_dir.to_string_lossy().into_owned();
        self.unexpanded_deploy_dir = self.deploy_dir.clone();

        self.image_dir = PathBuf::from(expand_vars(&self.unexpanded_image_dir, &lookup));
        self.deploy_dir = expand_vars(&self.deploy_dir, &lookup);
        self.credential_store = self
            .credential_store
            .take()
            .map(|p| PathBuf::from(expand_vars(&p.to_string_lossy(), &lookup)));
        self.docker_config_dir = self
            .docker_config_dir
            .take()
            .map(|p| PathBuf::from(expand_vars(&p.to_string_lossy(), &lookup)));

        for host in &mut self.insecure_registries {
            *host = expand_vars(host, &lookup);
        }
        for cred in &mut self.registries {
            cred.registry = expand_vars(&cred.registry, &lookup);
            cred.username = expand_vars(&cred.username, &lookup);
            cred.password = expand_vars(&cred.password, &lookup);
        }
    }

    /// Evaluate the deploy directory template for a mapper.
    pub fn deploy_dir(&self, mapper: &str) -> Result<PathBuf> {
        let tedge_dir = self
            .tedge_config_dir
            .clone()
            .unwrap_or_else(|| DEFAULT_TEDGE_CONFIG_DIR.to_string());
        let lookup = |name: &str| {
            process_env(name).or_else(|| (name == "TEDGE_CONFIG_DIR").then(|| tedge_dir.clone()))
        };
        render_template(&self.deploy_dir, mapper, &lookup).map(PathBuf::from)
    }

    /// Deploy directory for display: as written in the file, mapper filled in.
    ///
    /// Falls back to the evaluated directory when the configuration was not
    /// loaded from a document.
    pub fn display_deploy_dir(&self, mapper: &str) -> String {
        if self.unexpanded_deploy_dir.is_empty() {
            return self
                .deploy_dir(mapper)
                .map(|p| p.display().to_string())
                .unwrap_or_default();
        }
        self.unexpanded_deploy_dir
            .replace("{{.Mapper}}", mapper)
            .replace("{{ .Mapper }}", mapper)
    }

    /// Location of the generic credential store.
    pub fn credential_store_path(&self) -> Option<PathBuf> {
        self.credential_store.clone().or_else(|| {
            dirs::config_dir().map(|dir| dir.join("tedge-oscar").join("credentials.json"))
        })
    }

    /// Directory containing the Docker client configuration.
    pub fn docker_config_dir(&self) -> Option<PathBuf> {
        self.docker_config_dir
            .clone()
            .or_else(|| std::env::var_os("DOCKER_CONFIG").map(PathBuf::from))
            .or_else(|| dirs::home_dir().map(|home| home.join(".docker")))
    }
}

fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Expand `$NAME` and `${NAME}` references. Unknown names expand to "".
pub fn expand_vars(input: &str, lookup: &dyn Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some(braced) = after.strip_prefix('{') {
            if let Some(end) = braced.find('}') {
                out.push_str(&lookup(&braced[..end]).unwrap_or_default());
                rest = &braced[end + 1..];
                continue;
            }
        }

        let len = after
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(after.len());
        if len == 0 {
            out.push('$');
        } else {
            out.push_str(&lookup(&after[..len]).unwrap_or_default());
        }
        rest = &after[len..];
    }

    out.push_str(rest);
    out
}

/// Replace `{{.Mapper}}` and `{{.Env.NAME}}` placeholders.
fn render_template(
    template: &str,
    mapper: &str,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find("}}").ok_or_else(|| {
            OscarError::ConfigError(format!("Unterminated placeholder in '{}'", template))
        })?;
        let field = after[..end].trim();

        if field == ".Mapper" {
            out.push_str(mapper);
        } else if let Some(name) = field.strip_prefix(".Env.") {
            out.push_str(&lookup(name).unwrap_or_default());
        } else {
            return Err(OscarError::ConfigError(format!(
                "Unknown placeholder '{{{{{}}}}}' in '{}'",
                field, template
            )));
        }
        rest = &after[end + 2..];
    }

    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_expand_vars() {
        let lookup = env(&[("HOME", "/home/op"), ("USER", "op")]);
        assert_eq!(expand_vars("$HOME/.tedge", &lookup), "/home/op/.tedge");
        assert_eq!(expand_vars("${USER}-x", &lookup), "op-x");
        assert_eq!(expand_vars("$MISSING/a", &lookup), "/a");
        assert_eq!(expand_vars("cost: 5$", &lookup), "cost: 5$");
        assert_eq!(expand_vars("plain", &lookup), "plain");
    }

    #[test]
    fn test_from_toml_expands_fields() {
        let lookup = env(&[("HOME", "/home/op"), ("TOKEN", "s3cret")]);
        let config = OscarConfig::from_toml_with(
            r#"
image_dir = "$HOME/.tedge/images"
deploy_dir = "$TEDGE_CONFIG_DIR/mappers/{{.Mapper}}/flows"

[[registries]]
registry = "ghcr.io"
username = "bot"
password = "$TOKEN"
"#,
            &lookup,
        )
        .unwrap();

        assert_eq!(config.image_dir, PathBuf::from("/home/op/.tedge/images"));
        assert_eq!(config.unexpanded_image_dir, "$HOME/.tedge/images");
        assert_eq!(config.deploy_dir, "/etc/tedge/mappers/{{.Mapper}}/flows");
        assert_eq!(config.registries[0].password, "s3cret");
    }

    #[test]
    fn test_tedge_config_dir_override() {
        let lookup = env(&[]);
        let config = OscarConfig::from_toml_with(
            r#"
deploy_dir = "$TEDGE_CONFIG_DIR/flows"
tedge_config_dir = "/opt/tedge"
"#,
            &lookup,
        )
        .unwrap();
        assert_eq!(config.deploy_dir, "/opt/tedge/flows");
    }

    #[test]
    fn test_render_template() {
        let lookup = env(&[("ROOT", "/srv")]);
        let out = render_template("{{.Env.ROOT}}/mappers/{{ .Mapper }}/flows", "local", &lookup)
            .unwrap();
        assert_eq!(out, "/srv/mappers/local/flows");
    }

    #[test]
    fn test_render_template_unknown_placeholder() {
        let lookup = env(&[]);
        let result = render_template("/x/{{.Nope}}", "flows", &lookup);
        assert!(matches!(result, Err(OscarError::ConfigError(_))));
    }

    #[test]
    fn test_deploy_dir_with_mapper() {
        let config = OscarConfig {
            deploy_dir: "/etc/tedge/mappers/{{.Mapper}}/flows".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.deploy_dir("flows").unwrap(),
            PathBuf::from("/etc/tedge/mappers/flows/flows")
        );
    }

    #[test]
    fn test_display_deploy_dir_keeps_variables() {
        let lookup = env(&[]);
        let config = OscarConfig::from_toml_with(
            r#"deploy_dir = "$TEDGE_CONFIG_DIR/mappers/{{.Mapper}}/flows""#,
            &lookup,
        )
        .unwrap();
        assert_eq!(
            config.display_deploy_dir("local"),
            "$TEDGE_CONFIG_DIR/mappers/local/flows"
        );
    }

    #[test]
    fn test_load_missing_file_uses_embedded() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = OscarConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.unexpanded_image_dir, "$HOME/.tedge/images");
        assert!(config.registries.is_empty());
    }

    #[test]
    fn test_load_malformed_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "image_dir = [").unwrap();
        let result = OscarConfig::load(&path);
        assert!(matches!(result, Err(OscarError::ConfigError(_))));
    }

    #[test]
    fn test_insecure_registries() {
        let lookup = env(&[("REGISTRY_PORT", "5000")]);
        let config = OscarConfig::from_toml_with(
            r#"insecure_registries = ["localhost:$REGISTRY_PORT"]"#,
            &lookup,
        )
        .unwrap();
        assert_eq!(config.insecure_registries, vec!["localhost:5000".to_string()]);

        let config = OscarConfig::from_toml_with("", &lookup).unwrap();
        assert!(config.insecure_registries.is_empty());
    }
}
