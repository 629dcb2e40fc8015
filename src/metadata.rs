//! Repository index documents
//!
//! The per-(group, artifact) index file listing known versions, mapped
//! to the conventional `maven-metadata.xml` schema so existing
//! dependency-resolution clients can consume merged output unchanged.

use crate::error::{CacheError, CacheResult};
use serde::{Deserialize, Serialize};

/// Name of the index file the synthesizer merges
pub const INDEX_FILENAME: &str = "maven-metadata.xml";

const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

/// A repository index for one (group, artifact) pair
///
/// Multiple backing repositories may each supply one of these for the
/// same coordinates; merging produces a fresh document, never a shared
/// one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IndexDocument {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub versioning: Option<Versioning>,
}

/// The versioning block of an index document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Versioning {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub release: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub versions: Option<Versions>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
}

/// Wrapper for the `<versions>` element
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Versions {
    #[serde(default, rename = "version")]
    pub version: Vec<String>,
}

impl IndexDocument {
    /// Parse an index document from raw XML bytes
    pub fn from_xml(bytes: &[u8]) -> CacheResult<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| CacheError::MalformedDocument(format!("index document not UTF-8: {}", e)))?;
        quick_xml::de::from_str(text)
            .map_err(|e| CacheError::MalformedDocument(format!("index document: {}", e)))
    }

    /// Serialize to the repository-metadata XML wire format
    pub fn to_xml(&self) -> CacheResult<Vec<u8>> {
        let body = quick_xml::se::to_string_with_root("metadata", self)
            .map_err(|e| CacheError::Internal(format!("serializing index document: {}", e)))?;
        let mut out = String::with_capacity(XML_DECLARATION.len() + body.len() + 1);
        out.push_str(XML_DECLARATION);
        out.push_str(&body);
        out.push('\n');
        Ok(out.into_bytes())
    }

    /// The listed versions, empty when the versioning block is absent
    pub fn versions(&self) -> &[String] {
        self.versioning
            .as_ref()
            .and_then(|v| v.versions.as_ref())
            .map(|v| v.version.as_slice())
            .unwrap_or(&[])
    }

    /// Append a version to the versioning block, creating it on demand
    pub fn push_version(&mut self, version: String) {
        self.versioning
            .get_or_insert_with(Versioning::default)
            .versions
            .get_or_insert_with(Versions::default)
            .version
            .push(version);
    }
}
