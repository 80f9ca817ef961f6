//! OCI artifact support for tedge-oscar.
//!
//! Flow artifacts live in OCI registries or in plain tarballs. This module
//! provides:
//!
//! - reference parsing and name resolution
//! - registry credential lookup
//! - pulling with a content-addressed blob cache
//! - tarball loading from disk or HTTP(S)
//!
//! # Layout
//!
//! ```text
//! image_dir/
//! ├── .cache/blobs/sha256/<hex>     (blob cache)
//! └── <artifact name>/              (one directory per artifact)
//!     ├── manifest.json
//!     ├── flow.toml                 (optional template)
//!     └── lib/main.js               (entrypoint)
//! ```

mod artifact;
pub mod auth;
pub mod credentials;
mod layers;
mod load;
mod pull;
pub mod reference;
pub mod registry;

pub use artifact::{MANIFEST_FILE, TITLE_ANNOTATION, UNPACK_ANNOTATION, VERSION_ANNOTATION};
pub use auth::{CredentialChain, CredentialSource, DockerCredentials, StaticCredentials};
pub use credentials::CredentialStore;
pub use layers::{extract_layer, extract_stream, ExtractSummary};
pub use load::load_tarball;
pub use pull::{blob_cache_dir, write_snapshot, ArtifactPuller, PullOptions, PulledArtifact};
pub use reference::{resolve, trim_version, ImageReference};
pub use registry::{RegistryAuth, RegistryPuller};
