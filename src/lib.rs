//! rebuild-cache - Artifact-cache gateway core
//!
//! Presents a package-repository-compatible read interface in front of
//! content-addressed backend storage, so isolated build jobs resolve
//! dependencies deterministically without reaching the public internet.

pub mod config;
pub mod error;
pub mod fallback;
pub mod gateway;
pub mod hash;
pub mod metadata;
pub mod policy;
pub mod registry;
pub mod storage;
pub mod synth;
pub mod version;

pub use error::{CacheError, CacheResult};
pub use gateway::CacheGateway;
