//! Build policies and repository descriptors
//!
//! A build policy is the ordered backend search list for a cache
//! request, fixed at configuration time and read-only afterwards.

use serde::{Deserialize, Serialize};

/// Protocol kind of a backing repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RepositoryType {
    /// Plain index-file store speaking the repository layout directly
    Maven2,
    /// Content-addressed object store holding rebuilt artifacts
    S3,
    /// Container registry, reached through the registry auth client
    OciRegistry,
}

impl RepositoryType {
    /// Whether lookups against this repository are scoped by build policy
    ///
    /// Only the rebuilt-artifact object store partitions its contents
    /// per policy; upstream stores serve one shared namespace.
    pub fn build_policy_used(&self) -> bool {
        matches!(self, RepositoryType::S3)
    }
}

/// One backing repository: a name and a protocol kind
///
/// Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub repo_type: RepositoryType,
}

impl RepositoryDescriptor {
    pub fn new(name: impl Into<String>, repo_type: RepositoryType) -> Self {
        Self {
            name: name.into(),
            repo_type,
        }
    }
}

/// Ordered, immutable backend search order for a cache request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildPolicy {
    repositories: Vec<RepositoryDescriptor>,
    transformed: bool,
}

impl BuildPolicy {
    pub fn new(repositories: Vec<RepositoryDescriptor>, transformed: bool) -> Self {
        Self {
            repositories,
            transformed,
        }
    }

    /// Repositories in search order
    pub fn repositories(&self) -> &[RepositoryDescriptor] {
        &self.repositories
    }

    /// Whether this policy serves source-rebuilt (transformed) artifacts
    pub fn is_transformed(&self) -> bool {
        self.transformed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_policy_flag_only_for_object_store() {
        assert!(!RepositoryType::Maven2.build_policy_used());
        assert!(RepositoryType::S3.build_policy_used());
        assert!(!RepositoryType::OciRegistry.build_policy_used());
    }

    #[test]
    fn policy_preserves_repository_order() {
        let policy = BuildPolicy::new(
            vec![
                RepositoryDescriptor::new("rebuilt", RepositoryType::S3),
                RepositoryDescriptor::new("central", RepositoryType::Maven2),
            ],
            true,
        );
        let names: Vec<&str> = policy.repositories().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["rebuilt", "central"]);
        assert!(policy.is_transformed());
    }

    #[test]
    fn repository_type_serde_names() {
        let descriptor = RepositoryDescriptor::new("registry", RepositoryType::OciRegistry);
        let toml = toml::to_string(&descriptor).unwrap();
        assert!(toml.contains("type = \"oci-registry\""));
        let back: RepositoryDescriptor = toml::from_str(&toml).unwrap();
        assert_eq!(back, descriptor);
    }
}
