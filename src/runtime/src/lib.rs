//! tedge-oscar runtime.
//!
//! Artifact acquisition (registry pull, tarball load) and flow instance
//! deployment on top of the local image and deploy directories.

#![allow(clippy::result_large_err)]

pub mod cache;
pub mod flow;
pub mod oci;

pub use cache::BlobCache;
pub use flow::{deploy, DeployRequest, Deployment, InstanceRegistry, InstanceSummary};
pub use oci::{load_tarball, resolve, ArtifactPuller, CredentialChain, ImageReference, PullOptions};

/// Runtime version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
