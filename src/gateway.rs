//! Artifact retrieval gateway
//!
//! Read-through facade over the backend storage: never persists or
//! mutates backend state; index merging and version fallback produce
//! computed views only. This is the surface the routing layer calls.

use crate::error::CacheResult;
use crate::fallback::{self, FallbackOutcome};
use crate::hash::sha1_hex;
use crate::storage::{ArtifactResult, StorageBackend};
use crate::synth::synthesize;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};

/// Read-through gateway over content-addressed backend storage
pub struct CacheGateway<B: StorageBackend + ?Sized> {
    backend: Arc<B>,
}

impl<B: StorageBackend + ?Sized> Clone for CacheGateway<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
        }
    }
}

impl<B: StorageBackend + ?Sized> CacheGateway<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    /// Look up one artifact file; `Ok(None)` is a plain miss
    ///
    /// Provenance (`maven-repo`) and declared size travel on the
    /// returned [`ArtifactResult`] for the routing layer to surface as
    /// response attributes.
    pub fn resolve_artifact(
        &self,
        policy: &str,
        group: &str,
        artifact: &str,
        version: &str,
        target: &str,
    ) -> CacheResult<Option<ArtifactResult>> {
        debug!("Retrieving artifact {}/{}/{}/{}", group, artifact, version, target);
        let result = self
            .backend
            .get_artifact_file(policy, group, artifact, version, target, true)?;
        if result.is_none() {
            info!("Failed to get artifact {}/{}/{}/{}", group, artifact, version, target);
        }
        Ok(result)
    }

    /// Synthesize the merged index document for a group
    ///
    /// With `digest`, returns the SHA-1 hex digest of the serialized
    /// document instead of its bytes.
    pub fn resolve_index(
        &self,
        policy: &str,
        group: &str,
        cutoff: Option<DateTime<Utc>>,
        digest: bool,
    ) -> CacheResult<Option<Vec<u8>>> {
        let merged = match synthesize(self.backend.as_ref(), policy, group, cutoff)? {
            Some(merged) => merged,
            None => {
                debug!("Failed retrieving index file for {}", group);
                return Ok(None);
            }
        };
        let bytes = merged.to_xml()?;
        if digest {
            Ok(Some(sha1_hex(&bytes).into_bytes()))
        } else {
            Ok(Some(bytes))
        }
    }

    /// Serve an index request by its checksum suffix
    ///
    /// Only the plain file and its `.sha1` checksum exist; any other
    /// suffix is a miss.
    pub fn resolve_index_file(
        &self,
        policy: &str,
        group: &str,
        cutoff: Option<DateTime<Utc>>,
        suffix: &str,
    ) -> CacheResult<Option<Vec<u8>>> {
        match suffix {
            "" => self.resolve_index(policy, group, cutoff, false),
            ".sha1" => self.resolve_index(policy, group, cutoff, true),
            other => {
                info!("Refusing index checksum suffix {} for {}", other, group);
                Ok(None)
            }
        }
    }

    /// Look up an artifact, substituting the nearest version on a miss
    pub fn resolve_with_fallback(
        &self,
        policy: &str,
        group: &str,
        artifact: &str,
        version: &str,
        target: &str,
    ) -> CacheResult<Option<FallbackOutcome>> {
        debug!("Retrieving artifact {}/{}/{}/{}", group, artifact, version, target);
        fallback::resolve_with_fallback(
            self.backend.as_ref(),
            policy,
            group,
            artifact,
            version,
            target,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::IndexDocument;
    use crate::storage::testing::{FakeArtifact, FakeBackend};
    use crate::storage::META_REPO;
    use std::collections::HashMap;

    fn index_doc(versions: &[&str]) -> String {
        let mut xml = String::from(
            "<metadata><groupId>org.example</groupId><artifactId>app</artifactId><versioning><versions>",
        );
        for v in versions {
            xml.push_str(&format!("<version>{}</version>", v));
        }
        xml.push_str("</versions></versioning></metadata>");
        xml
    }

    fn gateway(backend: FakeBackend) -> CacheGateway<FakeBackend> {
        CacheGateway::new(Arc::new(backend))
    }

    #[test]
    fn artifact_hit_streams_through_with_metadata() {
        let mut backend = FakeBackend::default();
        let mut metadata = HashMap::new();
        metadata.insert(META_REPO.to_string(), "central".to_string());
        backend.put_artifact(
            "org/example",
            "app",
            "1.0",
            "app-1.0.jar",
            FakeArtifact::Found {
                body: b"jarbytes".to_vec(),
                metadata,
            },
        );
        let gw = gateway(backend);

        let mut result = gw
            .resolve_artifact("default", "org/example", "app", "1.0", "app-1.0.jar")
            .unwrap()
            .unwrap();
        assert_eq!(result.metadata().get(META_REPO).map(String::as_str), Some("central"));
        assert_eq!(result.size(), 8);
        assert_eq!(result.read_all().unwrap(), b"jarbytes");
    }

    #[test]
    fn artifact_miss_is_none() {
        let gw = gateway(FakeBackend::default());
        let result = gw
            .resolve_artifact("default", "org/example", "app", "1.0", "app-1.0.jar")
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn index_bytes_parse_back() {
        let doc = index_doc(&["1.0", "1.1"]);
        let gw = gateway(FakeBackend::with_index_documents(&[&doc]));

        let bytes = gw
            .resolve_index("default", "org/example/app", None, false)
            .unwrap()
            .unwrap();
        let parsed = IndexDocument::from_xml(&bytes).unwrap();
        assert_eq!(parsed.versions(), &["1.0", "1.1"]);
    }

    #[test]
    fn index_digest_matches_bytes() {
        let doc = index_doc(&["1.0"]);
        let backend = FakeBackend::with_index_documents(&[&doc, &doc]);
        let gw = gateway(backend);

        let bytes = gw
            .resolve_index("default", "org/example/app", None, false)
            .unwrap()
            .unwrap();
        let digest = gw
            .resolve_index("default", "org/example/app", None, true)
            .unwrap()
            .unwrap();
        assert_eq!(digest, sha1_hex(&bytes).into_bytes());
    }

    #[test]
    fn index_missing_is_none() {
        let gw = gateway(FakeBackend::default());
        let result = gw
            .resolve_index("default", "org/example/app", None, false)
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn index_file_rejects_unknown_suffix() {
        let doc = index_doc(&["1.0"]);
        let gw = gateway(FakeBackend::with_index_documents(&[&doc]));

        assert!(gw
            .resolve_index_file("default", "org/example/app", None, ".md5")
            .unwrap()
            .is_none());
        assert!(gw
            .resolve_index_file("default", "org/example/app", None, ".sha1")
            .unwrap()
            .is_some());
    }

    #[test]
    fn fallback_substitutes_nearest_version_for_plain_file() {
        let doc = index_doc(&["1.0", "1.2", "1.5", "2.0"]);
        // two copies so the merge path is exercised
        let mut backend = FakeBackend::with_index_documents(&[&doc, &doc]);
        backend.put_artifact(
            "org/example",
            "app",
            "1.5",
            "app-1.5.jar",
            FakeArtifact::without_metadata(b"jar for 1.5"),
        );
        let gw = gateway(backend);

        let outcome = gw
            .resolve_with_fallback("default", "org/example", "app", "1.3", "app-1.3.jar")
            .unwrap()
            .unwrap();
        match outcome {
            FallbackOutcome::Stream(mut result) => {
                assert_eq!(result.read_all().unwrap(), b"jar for 1.5");
            }
            FallbackOutcome::Rewritten(_) => panic!("expected streamed artifact"),
        }
    }

    #[test]
    fn fallback_rewrites_descriptor_to_requested_version() {
        let doc = index_doc(&["1.0", "2.0"]);
        let mut backend = FakeBackend::with_index_documents(&[&doc, &doc]);
        let pom = "<project><groupId>org.example</groupId><artifactId>app</artifactId><version>2.0</version></project>";
        backend.put_artifact(
            "org/example",
            "app",
            "2.0",
            "app-2.0.pom",
            FakeArtifact::without_metadata(pom.as_bytes()),
        );
        let gw = gateway(backend);

        let outcome = gw
            .resolve_with_fallback("default", "org/example", "app", "3.0", "app-3.0.pom")
            .unwrap()
            .unwrap();
        match outcome {
            FallbackOutcome::Rewritten(bytes) => {
                let text = String::from_utf8(bytes).unwrap();
                // the caller sees its own requested version
                assert!(text.contains("<version>3.0</version>"));
                assert!(!text.contains("<version>2.0</version>"));
            }
            FallbackOutcome::Stream(_) => panic!("expected rewritten descriptor"),
        }
    }

    #[test]
    fn fallback_descriptor_digest_matches_rewritten_bytes() {
        let doc = index_doc(&["2.0"]);
        let mut backend = FakeBackend::with_index_documents(&[&doc, &doc]);
        let pom = "<project><version>2.0</version></project>";
        backend.put_artifact(
            "org/example",
            "app",
            "2.0",
            "app-2.0.pom",
            FakeArtifact::without_metadata(pom.as_bytes()),
        );
        let gw = gateway(backend);

        let pom_outcome = gw
            .resolve_with_fallback("default", "org/example", "app", "3.0", "app-3.0.pom")
            .unwrap()
            .unwrap();
        let digest_outcome = gw
            .resolve_with_fallback("default", "org/example", "app", "3.0", "app-3.0.pom.sha1")
            .unwrap()
            .unwrap();
        match (pom_outcome, digest_outcome) {
            (FallbackOutcome::Rewritten(pom_bytes), FallbackOutcome::Rewritten(digest)) => {
                assert_eq!(digest, sha1_hex(&pom_bytes).into_bytes());
            }
            _ => panic!("expected rewritten outcomes"),
        }
    }

    #[test]
    fn fallback_with_no_known_versions_is_none() {
        let gw = gateway(FakeBackend::default());
        let outcome = gw
            .resolve_with_fallback("default", "org/example", "app", "1.0", "app-1.0.jar")
            .unwrap();
        assert!(outcome.is_none());
    }

    #[test]
    fn fallback_prefers_exact_hit() {
        let mut backend = FakeBackend::default();
        backend.put_artifact(
            "org/example",
            "app",
            "1.0",
            "app-1.0.jar",
            FakeArtifact::without_metadata(b"exact"),
        );
        let gw = gateway(backend);

        let outcome = gw
            .resolve_with_fallback("default", "org/example", "app", "1.0", "app-1.0.jar")
            .unwrap()
            .unwrap();
        match outcome {
            FallbackOutcome::Stream(mut result) => {
                assert_eq!(result.read_all().unwrap(), b"exact");
            }
            FallbackOutcome::Rewritten(_) => panic!("expected streamed artifact"),
        }
    }
}
