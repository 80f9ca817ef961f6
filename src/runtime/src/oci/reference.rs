//! Artifact reference parsing.
//!
//! Parses references like `ghcr.io/thin-edge/counter:1.0` into structured
//! components and derives the normalized artifact name used as the local
//! cache directory.

use oscar_core::error::{OscarError, Result};

/// Default registry when none is specified.
const DEFAULT_REGISTRY: &str = "docker.io";

/// Default tag when none is specified.
const DEFAULT_TAG: &str = "latest";

/// Parsed OCI artifact reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    /// Registry hostname (e.g., "ghcr.io", "docker.io")
    pub registry: String,
    /// Repository path (e.g., "thin-edge/counter")
    pub repository: String,
    /// Tag (e.g., "latest", "1.0")
    pub tag: Option<String>,
    /// Digest (e.g., "sha256:abc123...")
    pub digest: Option<String>,
}

impl ImageReference {
    /// Parse a reference string.
    ///
    /// Supports formats:
    /// - `counter` → docker.io/library/counter:latest
    /// - `org/counter:1.0` → docker.io/org/counter:1.0
    /// - `ghcr.io/org/counter:1.0` → ghcr.io/org/counter:1.0
    /// - `ghcr.io/org/counter@sha256:abc...` → ghcr.io/org/counter@sha256:abc...
    /// - `localhost:5000/counter` → localhost:5000/counter:latest
    pub fn parse(reference: &str) -> Result<Self> {
        let original = reference;
        let reference = reference.trim();
        let invalid = |message: &str| OscarError::InvalidReferenceError {
            reference: original.to_string(),
            message: message.to_string(),
        };

        if reference.is_empty() {
            return Err(invalid("empty reference"));
        }
        if reference.chars().any(char::is_whitespace) {
            return Err(invalid("reference must not contain whitespace"));
        }

        // Split off digest first (@ separator)
        let (name_tag, digest) = match reference.rfind('@') {
            Some(at_pos) => {
                let digest = &reference[at_pos + 1..];
                if !is_valid_digest(digest) {
                    return Err(invalid("invalid digest, expected algorithm:hex"));
                }
                (&reference[..at_pos], Some(digest.to_string()))
            }
            None => (reference, None),
        };

        // A tag colon must follow the last slash. A `host:port` colon always
        // precedes a slash, and a name without a slash has no host.
        let last_segment_start = name_tag.rfind('/').map(|p| p + 1).unwrap_or(0);
        let (name, tag) = match name_tag[last_segment_start..].rfind(':') {
            Some(colon) => {
                let colon = last_segment_start + colon;
                let tag = &name_tag[colon + 1..];
                if !is_valid_tag(tag) {
                    return Err(invalid("invalid tag"));
                }
                (&name_tag[..colon], Some(tag.to_string()))
            }
            None => (name_tag, None),
        };

        let (registry, repository) = Self::split_registry_repository(name)
            .map_err(|message| invalid(&message))?;

        // Apply default tag if no tag and no digest
        let tag = if tag.is_none() && digest.is_none() {
            Some(DEFAULT_TAG.to_string())
        } else {
            tag
        };

        Ok(ImageReference {
            registry,
            repository,
            tag,
            digest,
        })
    }

    /// Split a name into registry and repository components.
    fn split_registry_repository(name: &str) -> std::result::Result<(String, String), String> {
        if name.is_empty() {
            return Err("missing repository".to_string());
        }

        // The first component is a registry if it looks like a hostname
        // (contains a dot or colon, or is "localhost").
        let (registry, repository) = match name.split_once('/') {
            Some((first, rest))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                (first.to_string(), rest.to_string())
            }
            _ if name.contains('/') => (DEFAULT_REGISTRY.to_string(), name.to_string()),
            _ => (DEFAULT_REGISTRY.to_string(), format!("library/{}", name)),
        };

        if repository.is_empty() {
            return Err("empty repository".to_string());
        }
        for component in repository.split('/') {
            if !is_valid_path_component(component) {
                return Err(format!("invalid repository path component '{}'", component));
            }
        }

        Ok((registry, repository))
    }

    /// Normalized artifact name: the repository path without registry, tag or digest.
    pub fn artifact_name(&self) -> &str {
        &self.repository
    }

    /// Get the full reference string.
    pub fn full_reference(&self) -> String {
        let mut s = format!("{}/{}", self.registry, self.repository);
        if let Some(ref tag) = self.tag {
            s.push(':');
            s.push_str(tag);
        }
        if let Some(ref digest) = self.digest {
            s.push('@');
            s.push_str(digest);
        }
        s
    }
}

impl std::fmt::Display for ImageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.full_reference())
    }
}

/// Resolve a reference to its normalized artifact name.
///
/// Pull and deploy both go through this function so that an artifact
/// pulled under one reference form is always found by the other.
pub fn resolve(reference: &str) -> Result<String> {
    ImageReference::parse(reference).map(|r| r.repository)
}

/// Strip tag, digest and trailing version suffixes from an artifact
/// directory name for display (`counter-1.2.0` → `counter`).
pub fn trim_version(name: &str) -> String {
    let name = name.split('@').next().unwrap_or(name);
    let name = name.split(':').next().unwrap_or(name);

    let cut = name
        .rfind(|c: char| c == '-' || c == '_')
        .filter(|&pos| pos > 0 && looks_like_version(&name[pos + 1..]));
    match cut {
        Some(pos) => name[..pos].to_string(),
        None => name.to_string(),
    }
}

fn looks_like_version(s: &str) -> bool {
    let s = s.strip_prefix('v').unwrap_or(s);
    s.starts_with(|c: char| c.is_ascii_digit())
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '.')
}

fn is_valid_path_component(component: &str) -> bool {
    let bytes = component.as_bytes();
    !bytes.is_empty()
        && bytes[0].is_ascii_alphanumeric()
        && bytes[bytes.len() - 1].is_ascii_alphanumeric()
        && bytes.iter().all(|&b| {
            b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'.' || b == b'_' || b == b'-'
        })
        && !component.contains("..")
}

fn is_valid_tag(tag: &str) -> bool {
    !tag.is_empty()
        && tag.len() <= 128
        && !tag.starts_with(['.', '-'])
        && tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-')
}

fn is_valid_digest(digest: &str) -> bool {
    match digest.split_once(':') {
        Some((algorithm, hex)) => {
            !algorithm.is_empty()
                && !hex.is_empty()
                && algorithm
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "+._-".contains(c))
                && hex.chars().all(|c| c.is_ascii_alphanumeric())
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIGEST: &str = "sha256:abcdef1234567890abcdef1234567890abcdef1234567890abcdef1234567890";

    #[test]
    fn test_parse_simple_name() {
        let r = ImageReference::parse("counter").unwrap();
        assert_eq!(r.registry, "docker.io");
        assert_eq!(r.repository, "library/counter");
        assert_eq!(r.tag, Some("latest".to_string()));
        assert_eq!(r.digest, None);
    }

    #[test]
    fn test_parse_custom_registry() {
        let r = ImageReference::parse("ghcr.io/thin-edge/counter:1.0").unwrap();
        assert_eq!(r.registry, "ghcr.io");
        assert_eq!(r.repository, "thin-edge/counter");
        assert_eq!(r.tag, Some("1.0".to_string()));
    }

    #[test]
    fn test_parse_digest_only() {
        let r = ImageReference::parse(&format!("ghcr.io/thin-edge/counter@{}", DIGEST)).unwrap();
        assert_eq!(r.repository, "thin-edge/counter");
        assert_eq!(r.tag, None);
        assert_eq!(r.digest, Some(DIGEST.to_string()));
    }

    #[test]
    fn test_parse_tag_and_digest() {
        let r = ImageReference::parse("ghcr.io/org/counter:1.0@sha256:abcdef12").unwrap();
        assert_eq!(r.tag, Some("1.0".to_string()));
        assert_eq!(r.digest, Some("sha256:abcdef12".to_string()));
    }

    #[test]
    fn test_parse_registry_with_port() {
        let r = ImageReference::parse("myregistry.io:5000/counter:v1").unwrap();
        assert_eq!(r.registry, "myregistry.io:5000");
        assert_eq!(r.repository, "counter");
        assert_eq!(r.tag, Some("v1".to_string()));
    }

    #[test]
    fn test_parse_numeric_tag_without_registry() {
        let r = ImageReference::parse("counter:10").unwrap();
        assert_eq!(r.registry, "docker.io");
        assert_eq!(r.repository, "library/counter");
        assert_eq!(r.tag, Some("10".to_string()));
        assert_eq!(resolve("counter:10").unwrap(), "library/counter");
    }

    #[test]
    fn test_parse_localhost_registry() {
        let r = ImageReference::parse("localhost/flows/counter:test").unwrap();
        assert_eq!(r.registry, "localhost");
        assert_eq!(r.repository, "flows/counter");
    }

    #[test]
    fn test_parse_deep_repository_path() {
        let r = ImageReference::parse("ghcr.io/org/sub/counter:v1").unwrap();
        assert_eq!(r.repository, "org/sub/counter");
    }

    #[test]
    fn test_resolve_ignores_tag_and_digest() {
        let plain = resolve("ghcr.io/example/counter").unwrap();
        let tagged = resolve("ghcr.io/example/counter:1.0").unwrap();
        let pinned = resolve(&format!("ghcr.io/example/counter@{}", DIGEST)).unwrap();
        assert_eq!(plain, "example/counter");
        assert_eq!(plain, tagged);
        assert_eq!(plain, pinned);
    }

    #[test]
    fn test_resolve_never_contains_host() {
        let name = resolve("registry.example.com:443/team/flow:2").unwrap();
        assert_eq!(name, "team/flow");
    }

    #[test]
    fn test_parse_malformed_references() {
        for bad in [
            "",
            "   ",
            "ghcr.io//counter",
            "ghcr.io/counter/",
            "ghcr.io/counter:",
            "ghcr.io/counter@",
            "ghcr.io/counter@invaliddigest",
            "ghcr.io/Counter",
            "ghcr.io/../etc",
            "ghcr.io/",
            "ghcr.io/a b",
        ] {
            let result = ImageReference::parse(bad);
            assert!(
                matches!(result, Err(OscarError::InvalidReferenceError { .. })),
                "expected {:?} to be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_full_reference() {
        let r = ImageReference::parse("ghcr.io/thin-edge/counter:1.0").unwrap();
        assert_eq!(r.full_reference(), "ghcr.io/thin-edge/counter:1.0");
        assert_eq!(format!("{}", r), "ghcr.io/thin-edge/counter:1.0");
    }

    #[test]
    fn test_trim_version() {
        assert_eq!(trim_version("counter"), "counter");
        assert_eq!(trim_version("counter-1.2.0"), "counter");
        assert_eq!(trim_version("counter_v2"), "counter");
        assert_eq!(trim_version("counter:1.0"), "counter");
        assert_eq!(trim_version("connectivity-counter"), "connectivity-counter");
    }
}
