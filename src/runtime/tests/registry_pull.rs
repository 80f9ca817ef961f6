//! Registry pulls against an in-process OCI registry reached over plain
//! HTTP: layer materialization, blob cache use, digest checks and error
//! mapping.

use std::path::PathBuf;

use oscar_core::config::OscarConfig;
use oscar_core::error::{OscarError, Result};
use oscar_runtime::cache::{sha256_digest, BlobCache};
use oscar_runtime::oci::{
    blob_cache_dir, ArtifactPuller, PullOptions, PulledArtifact, MANIFEST_FILE, TITLE_ANNOTATION,
    VERSION_ANNOTATION,
};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MANIFEST_PATH: &str = "/v2/example/counter/manifests/1.0";
const SCRIPT: &str = "export function onMessage(message) { return [message]; }";
const TEMPLATE: &str = "[[steps]]\nscript = \"main.js\"\n";

struct Layer {
    title: &'static str,
    data: Vec<u8>,
}

impl Layer {
    fn new(title: &'static str, data: &str) -> Self {
        Self {
            title,
            data: data.as_bytes().to_vec(),
        }
    }

    fn digest(&self) -> String {
        sha256_digest(&self.data)
    }

    fn descriptor(&self) -> serde_json::Value {
        json!({
            "mediaType": "application/octet-stream",
            "digest": self.digest(),
            "size": self.data.len(),
            "annotations": { TITLE_ANNOTATION: self.title },
        })
    }
}

fn counter_layers() -> Vec<Layer> {
    vec![Layer::new("lib/main.js", SCRIPT), Layer::new("flow.toml", TEMPLATE)]
}

struct Registry {
    server: MockServer,
}

impl Registry {
    async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    fn host(&self) -> String {
        self.server.address().to_string()
    }

    fn reference(&self) -> String {
        format!("{}/example/counter:1.0", self.host())
    }

    /// Serve an image manifest for the layers; returns the manifest digest.
    async fn serve_manifest(&self, layers: &[Layer]) -> String {
        let manifest = json!({
            "schemaVersion": 2,
            "mediaType": "application/vnd.oci.image.manifest.v1+json",
            "config": {
                "mediaType": "application/vnd.oci.empty.v1+json",
                "digest": sha256_digest(b"{}"),
                "size": 2,
            },
            "layers": layers.iter().map(Layer::descriptor).collect::<Vec<_>>(),
            "annotations": { VERSION_ANNOTATION: "1.0" },
        });
        let body = serde_json::to_vec(&manifest).unwrap();

        Mock::given(method("GET"))
            .and(path(MANIFEST_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", "application/vnd.oci.image.manifest.v1+json")
                    .set_body_bytes(body.clone()),
            )
            .mount(&self.server)
            .await;
        sha256_digest(&body)
    }

    async fn serve_blob(&self, digest: &str, data: &[u8], calls: u64) {
        Mock::given(method("GET"))
            .and(path(format!("/v2/example/counter/blobs/{}", digest)))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(data.to_vec()))
            .expect(calls)
            .mount(&self.server)
            .await;
    }

    async fn serve_layers(&self, layers: &[Layer], calls: u64) {
        for layer in layers {
            self.serve_blob(&layer.digest(), &layer.data, calls).await;
        }
    }
}

struct Env {
    root: TempDir,
    config: OscarConfig,
}

impl Env {
    fn new(registry: &Registry) -> Self {
        let root = TempDir::new().unwrap();
        let config = OscarConfig {
            image_dir: root.path().join("images"),
            docker_config_dir: Some(root.path().join("docker")),
            credential_store: Some(root.path().join("credentials.json")),
            insecure_registries: vec![registry.host()],
            ..Default::default()
        };
        Self { root, config }
    }

    fn output(&self) -> PathBuf {
        self.config.image_dir.join("example").join("counter")
    }

    fn cached(&self, digest: &str) -> PathBuf {
        blob_cache_dir(&self.config.image_dir)
            .join("sha256")
            .join(digest.trim_start_matches("sha256:"))
    }

    async fn pull(&self, reference: &str, options: &PullOptions) -> Result<PulledArtifact> {
        ArtifactPuller::new(&self.config)
            .pull(reference, &self.output(), options)
            .await
    }
}

#[tokio::test]
async fn pull_materializes_layers_and_manifest() {
    let registry = Registry::start().await;
    let layers = counter_layers();
    let manifest_digest = registry.serve_manifest(&layers).await;
    registry.serve_layers(&layers, 1).await;
    let env = Env::new(&registry);

    let pulled = env.pull(&registry.reference(), &PullOptions::default()).await.unwrap();

    assert_eq!(pulled.digest, manifest_digest);
    assert_eq!(pulled.path, env.output());
    assert_eq!(std::fs::read_to_string(env.output().join("lib/main.js")).unwrap(), SCRIPT);
    assert_eq!(std::fs::read_to_string(env.output().join("flow.toml")).unwrap(), TEMPLATE);

    let manifest: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(env.output().join(MANIFEST_FILE)).unwrap())
            .unwrap();
    assert_eq!(manifest["annotations"][VERSION_ANNOTATION], "1.0");
    assert_eq!(manifest["layers"].as_array().unwrap().len(), 2);

    for layer in &layers {
        assert!(env.cached(&layer.digest()).exists());
    }
}

#[tokio::test]
async fn second_pull_is_served_from_cache() {
    let registry = Registry::start().await;
    let layers = counter_layers();
    registry.serve_manifest(&layers).await;
    registry.serve_layers(&layers, 1).await;
    let env = Env::new(&registry);

    env.pull(&registry.reference(), &PullOptions::default()).await.unwrap();
    std::fs::remove_dir_all(env.output()).unwrap();
    env.pull(&registry.reference(), &PullOptions::default()).await.unwrap();

    assert!(env.output().join("lib/main.js").exists());
    registry.server.verify().await;
}

#[tokio::test]
async fn disabled_cache_is_neither_read_nor_written() {
    let registry = Registry::start().await;
    let layers = counter_layers();
    registry.serve_manifest(&layers).await;
    registry.serve_layers(&layers, 1).await;
    let env = Env::new(&registry);

    // The script is already cached, but must still be fetched
    let script = &layers[0];
    BlobCache::new(&blob_cache_dir(&env.config.image_dir))
        .put(&script.digest(), &script.data)
        .unwrap();

    let options = PullOptions {
        cache_disabled: true,
        ..Default::default()
    };
    env.pull(&registry.reference(), &options).await.unwrap();

    assert!(env.output().join("flow.toml").exists());
    assert!(!env.cached(&layers[1].digest()).exists());
    registry.server.verify().await;
}

#[tokio::test]
async fn digest_mismatch_keeps_previous_content() {
    let registry = Registry::start().await;
    let layers = counter_layers();
    registry.serve_manifest(&layers).await;
    registry
        .serve_blob(&layers[0].digest(), b"export function tampered() {}", 1)
        .await;
    let env = Env::new(&registry);
    std::fs::create_dir_all(env.output()).unwrap();
    std::fs::write(env.output().join("keep.txt"), "previous pull").unwrap();

    let result = env.pull(&registry.reference(), &PullOptions::default()).await;

    match result {
        Err(OscarError::NetworkError { message, .. }) => assert!(message.contains("digest mismatch")),
        other => panic!("expected NetworkError, got {:?}", other),
    }
    assert!(env.output().join("keep.txt").exists());
    assert!(!env.output().join("lib/main.js").exists());
    assert!(!env.cached(&layers[0].digest()).exists());
}

#[tokio::test]
async fn repull_replaces_previous_content_and_writes_snapshot() {
    let registry = Registry::start().await;
    let layers = counter_layers();
    registry.serve_manifest(&layers).await;
    registry.serve_layers(&layers, 1).await;
    let env = Env::new(&registry);
    std::fs::create_dir_all(env.output()).unwrap();
    std::fs::write(env.output().join("stale.js"), "old").unwrap();

    let tarball = env.root.path().join("counter.tar");
    let options = PullOptions {
        tarball_path: Some(tarball.clone()),
        ..Default::default()
    };
    env.pull(&registry.reference(), &options).await.unwrap();

    assert!(!env.output().join("stale.js").exists());
    assert!(env.output().join("lib/main.js").exists());

    let mut archive = tar::Archive::new(std::fs::File::open(&tarball).unwrap());
    let mut entries: Vec<String> = archive
        .entries()
        .unwrap()
        .map(|entry| entry.unwrap().path().unwrap().display().to_string())
        .collect();
    entries.sort();
    assert_eq!(entries, vec!["flow.toml", "lib/main.js", MANIFEST_FILE]);
}

#[tokio::test]
async fn unauthorized_manifest_is_auth_error() {
    let registry = Registry::start().await;
    Mock::given(method("GET"))
        .and(path(MANIFEST_PATH))
        .respond_with(ResponseTemplate::new(401))
        .mount(&registry.server)
        .await;
    let env = Env::new(&registry);

    let result = env.pull(&registry.reference(), &PullOptions::default()).await;

    assert!(matches!(result, Err(OscarError::AuthError { .. })), "{:?}", result);
    assert!(!env.output().exists());
}

#[tokio::test]
async fn unknown_manifest_is_not_found() {
    let registry = Registry::start().await;
    Mock::given(method("GET"))
        .and(path(MANIFEST_PATH))
        .respond_with(ResponseTemplate::new(404).set_body_string(
            r#"{"errors":[{"code":"MANIFEST_UNKNOWN","message":"manifest unknown"}]}"#,
        ))
        .mount(&registry.server)
        .await;
    let env = Env::new(&registry);

    let result = env.pull(&registry.reference(), &PullOptions::default()).await;

    assert!(matches!(result, Err(OscarError::NotFoundError { .. })), "{:?}", result);
}
