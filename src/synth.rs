//! Metadata synthesis
//!
//! Merges the per-repository index documents for one (group, artifact)
//! pair into a single filtered view. Document order is significant: the
//! backend's search order decides which document seeds the non-version
//! fields, and the merge must not be parallelized or reordered.

use crate::error::CacheResult;
use crate::metadata::{IndexDocument, Versioning, INDEX_FILENAME};
use crate::storage::{ArtifactResult, StorageBackend, META_LAST_MODIFIED};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

/// Format used by the `lastUpdated` field of an index document
const LAST_UPDATED_FORMAT: &str = "%Y%m%d%H%M%S";

/// Merge the index documents a policy's repositories hold for a group
///
/// With a `cutoff`, versions whose build descriptor postdates it are
/// filtered out of the merged view; without one, every listed version
/// passes through. A single source document is returned unchanged, with
/// no per-version filtering. `Ok(None)` means no repository had an
/// index file.
pub fn synthesize<B: StorageBackend + ?Sized>(
    backend: &B,
    policy: &str,
    group: &str,
    cutoff: Option<DateTime<Utc>>,
) -> CacheResult<Option<IndexDocument>> {
    debug!("Retrieving file {}/{}", group, INDEX_FILENAME);
    let mut sources = backend.get_metadata_files(policy, group, INDEX_FILENAME)?;
    if sources.is_empty() {
        return Ok(None);
    }

    if sources.len() == 1 {
        let (_, source) = &mut sources[0];
        let document = read_document(source);
        source.close();
        return document.map(Some);
    }

    let outcome = merge_documents(backend, policy, group, cutoff, &mut sources);

    // defensive pass: anything the merge left open (e.g. after an early
    // error) is released here, and only logged, never propagated
    for (repo, source) in &mut sources {
        if source.is_open() {
            warn!("Closing index stream from {} left open by merge", repo.name);
            source.close();
        }
    }

    outcome
}

fn merge_documents<B: StorageBackend + ?Sized>(
    backend: &B,
    policy: &str,
    group: &str,
    cutoff: Option<DateTime<Utc>>,
    sources: &mut [(crate::policy::RepositoryDescriptor, ArtifactResult)],
) -> CacheResult<Option<IndexDocument>> {
    // the group path packs both ids on this lookup form: the final
    // segment is the artifact id, the rest is the group id
    let (group_id, artifact_id) = match group.rsplit_once('/') {
        Some((g, a)) => (g, a),
        None => ("", group),
    };

    let mut output: Option<IndexDocument> = None;
    let mut first_file = true;

    // we assume the first document is the most correct one for the
    // release and latest fields; later documents contribute versions only
    for (_, source) in sources.iter_mut() {
        let document = read_document(source)?;
        source.close();

        if first_file {
            let mut seeded = document.clone();
            seeded
                .versioning
                .get_or_insert_with(Versioning::default)
                .versions = None;
            output = Some(seeded);
        }
        let merged = output.as_mut().expect("output seeded by first document");

        if document.versioning.is_some() {
            let mut release: Option<String> = None;
            for version in document.versions() {
                match cutoff {
                    None => merged.push_version(version.clone()),
                    Some(cutoff) => {
                        if let Some(accepted) = check_version_against_cutoff(
                            backend,
                            policy,
                            group,
                            group_id,
                            artifact_id,
                            version,
                            cutoff,
                        ) {
                            if accepted {
                                release = Some(version.clone());
                            }
                            merged.push_version(version.clone());
                        }
                    }
                }
            }
            if first_file {
                if let Some(cutoff) = cutoff {
                    let versioning = merged
                        .versioning
                        .get_or_insert_with(Versioning::default);
                    versioning.release = release.clone();
                    versioning.latest = release;
                    versioning.last_updated =
                        Some(cutoff.format(LAST_UPDATED_FORMAT).to_string());
                }
            }
        }
        first_file = false;
    }

    Ok(output)
}

/// Decide whether a version is visible at the cutoff
///
/// `None` drops the version entirely. `Some(true)` accepts it with a
/// verified timestamp, making it a release/latest candidate when seen
/// in the first document; `Some(false)` accepts it without one.
fn check_version_against_cutoff<B: StorageBackend + ?Sized>(
    backend: &B,
    policy: &str,
    group: &str,
    group_id: &str,
    artifact_id: &str,
    version: &str,
    cutoff: DateTime<Utc>,
) -> Option<bool> {
    let descriptor = format!("{}-{}.pom", artifact_id, version);
    let probe = backend.get_artifact_file(policy, group_id, artifact_id, version, &descriptor, false);
    let mut probe = match probe {
        Ok(Some(probe)) => probe,
        Ok(None) => return None,
        Err(e) => {
            // backend trouble on a single sub-lookup degrades to "not
            // found" for that version instead of aborting the merge
            debug!("Descriptor lookup for {}:{} failed: {}", artifact_id, version, e);
            return None;
        }
    };
    let last_modified = probe.metadata().get(META_LAST_MODIFIED).cloned();
    probe.close();

    match last_modified {
        None => Some(false),
        Some(raw) => match parse_http_date(&raw) {
            Some(date) if date > cutoff => {
                // released after the point in history the caller is
                // pinned to
                info!(
                    "Removing version {} from {}/{}",
                    version, group, INDEX_FILENAME
                );
                None
            }
            _ => Some(true),
        },
    }
}

fn read_document(source: &mut ArtifactResult) -> CacheResult<IndexDocument> {
    let bytes = source.read_all()?;
    IndexDocument::from_xml(&bytes)
}

/// Parse an HTTP-date (`Sun, 06 Nov 1994 08:49:37 GMT`) leniently
fn parse_http_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(raw)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}
