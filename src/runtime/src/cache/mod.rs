//! Local caches for registry content.
//!
//! - `BlobCache`: content-addressed cache for registry blobs, keyed by digest

pub mod blob_cache;

pub use blob_cache::{sha256_digest, BlobCache};
