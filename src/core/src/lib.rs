//! Oscar Core - Foundational Types
//!
//! Configuration and error types shared by the flow package manager
//! runtime and its command-line front-end.

pub mod config;
pub mod error;

// Re-export commonly used types
pub use config::{OscarConfig, RegistryCredential, DEFAULT_MAPPER};
pub use error::{OscarError, Result};

/// Oscar version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
