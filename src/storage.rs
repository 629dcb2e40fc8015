//! Backend storage contract
//!
//! The storage facade itself lives outside this crate; the core only
//! consumes these two lookups and owns the streams they hand back.

use crate::error::{CacheError, CacheResult};
use crate::policy::RepositoryDescriptor;
use std::collections::HashMap;
use std::io::Read;

/// Metadata key carrying the provenance repository name
pub const META_REPO: &str = "maven-repo";
/// Metadata key carrying the HTTP-date the artifact was last modified
pub const META_LAST_MODIFIED: &str = "last-modified";

/// An opened artifact: a byte stream plus string metadata
///
/// Exclusively owned by the caller that requested it. The stream is
/// released either by an explicit [`close`](Self::close) or on drop,
/// never twice.
pub struct ArtifactResult {
    data: Option<Box<dyn Read + Send>>,
    metadata: HashMap<String, String>,
    size: u64,
}

impl ArtifactResult {
    pub fn new(
        data: Box<dyn Read + Send>,
        metadata: HashMap<String, String>,
        size: u64,
    ) -> Self {
        Self {
            data: Some(data),
            metadata,
            size,
        }
    }

    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }

    /// Declared content size, 0 when the backend did not report one
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Whether the stream has not been released yet
    pub fn is_open(&self) -> bool {
        self.data.is_some()
    }

    /// Read the entire stream, then release it
    pub fn read_all(&mut self) -> CacheResult<Vec<u8>> {
        let mut stream = self
            .data
            .take()
            .ok_or_else(|| CacheError::Internal("artifact stream already consumed".to_string()))?;
        let mut buf = if self.size > 0 {
            Vec::with_capacity(self.size as usize)
        } else {
            Vec::new()
        };
        stream
            .read_to_end(&mut buf)
            .map_err(|e| CacheError::backend(format!("reading artifact stream: {}", e)))?;
        Ok(buf)
    }

    /// Take ownership of the stream for pass-through responses
    pub fn into_reader(mut self) -> Option<Box<dyn Read + Send>> {
        self.data.take()
    }

    /// Release the stream; idempotent
    pub fn close(&mut self) {
        self.data.take();
    }
}

impl Drop for ArtifactResult {
    fn drop(&mut self) {
        // dropping the boxed reader releases the stream
        self.data.take();
    }
}

impl std::fmt::Debug for ArtifactResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactResult")
            .field("open", &self.is_open())
            .field("size", &self.size)
            .field("metadata", &self.metadata)
            .finish()
    }
}

/// Read interface of the content-addressed backend storage
///
/// Implemented by the external storage facade; an in-memory fake backs
/// the tests.
pub trait StorageBackend: Send + Sync {
    /// Open every index file the policy's repositories hold for a group
    ///
    /// Returns one entry per repository that has the file, in policy
    /// search order. Empty means not found.
    fn get_metadata_files(
        &self,
        policy: &str,
        group: &str,
        filename: &str,
    ) -> CacheResult<Vec<(RepositoryDescriptor, ArtifactResult)>>;

    /// Look up a single artifact file
    ///
    /// `tracked` records the request against the build; metadata probes
    /// (descriptor timestamp checks) pass `false`.
    fn get_artifact_file(
        &self,
        policy: &str,
        group: &str,
        artifact: &str,
        version: &str,
        target: &str,
        tracked: bool,
    ) -> CacheResult<Option<ArtifactResult>>;
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn read_all_returns_body_and_releases() {
        let mut backend = FakeBackend::default();
        backend.put_artifact(
            "org/example",
            "app",
            "1.0",
            "app-1.0.jar",
            FakeArtifact::without_metadata(b"bytes"),
        );
        let mut result = backend
            .get_artifact_file("default", "org/example", "app", "1.0", "app-1.0.jar", true)
            .unwrap()
            .unwrap();
        assert!(result.is_open());
        assert_eq!(result.read_all().unwrap(), b"bytes");
        assert!(!result.is_open());
        drop(result);
        backend.assert_all_streams_released();
    }

    #[test]
    fn close_is_idempotent() {
        let mut backend = FakeBackend::default();
        backend.put_artifact(
            "g",
            "a",
            "1",
            "t",
            FakeArtifact::without_metadata(b"x"),
        );
        let mut result = backend
            .get_artifact_file("default", "g", "a", "1", "t", true)
            .unwrap()
            .unwrap();
        result.close();
        result.close();
        drop(result);
        backend.assert_all_streams_released();
    }

    #[test]
    fn drop_without_close_still_releases_once() {
        let mut backend = FakeBackend::default();
        backend.put_artifact(
            "g",
            "a",
            "1",
            "t",
            FakeArtifact::without_metadata(b"x"),
        );
        let result = backend
            .get_artifact_file("default", "g", "a", "1", "t", true)
            .unwrap()
            .unwrap();
        drop(result);
        backend.assert_all_streams_released();
    }

    #[test]
    fn read_all_twice_is_an_error() {
        let mut backend = FakeBackend::default();
        backend.put_artifact(
            "g",
            "a",
            "1",
            "t",
            FakeArtifact::without_metadata(b"x"),
        );
        let mut result = backend
            .get_artifact_file("default", "g", "a", "1", "t", true)
            .unwrap()
            .unwrap();
        result.read_all().unwrap();
        assert!(result.read_all().is_err());
    }
}
