//! Version-fallback resolution (legacy index compatibility)
//!
//! Builds that reference retired upstream hosts sometimes pin versions
//! that no longer exist anywhere. When the caller opts in, a miss is
//! answered with the nearest available version, preferring the closest
//! newer one, and project descriptors are rewritten so the substitution
//! is invisible to the artifact's own declared identity.

use crate::error::{CacheError, CacheResult};
use crate::hash::sha1_hex;
use crate::storage::{ArtifactResult, StorageBackend};
use crate::synth::synthesize;
use crate::version::ComparableVersion;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use tracing::info;

/// Result of a fallback lookup
///
/// Rewritten descriptor content is materialized in memory; everything
/// else streams straight from the backend.
pub enum FallbackOutcome {
    Stream(ArtifactResult),
    Rewritten(Vec<u8>),
}

/// Resolve an artifact, substituting the nearest version on a miss
pub fn resolve_with_fallback<B: StorageBackend + ?Sized>(
    backend: &B,
    policy: &str,
    group: &str,
    artifact: &str,
    version: &str,
    target: &str,
) -> CacheResult<Option<FallbackOutcome>> {
    if let Some(result) = backend.get_artifact_file(policy, group, artifact, version, target, true)? {
        return Ok(Some(FallbackOutcome::Stream(result)));
    }

    // not found, look for something close; prefer newer over older
    let index_group = format!("{}/{}", group, artifact);
    let known = match synthesize(backend, policy, &index_group, None)? {
        Some(document) => document.versions().to_vec(),
        None => return Ok(None),
    };
    let selected = match select_fallback_version(&known, version) {
        Some(selected) => selected,
        None => return Ok(None),
    };

    info!(
        "Substituting version {} for version {} for artifact {}/{}",
        selected, version, group, artifact
    );
    let target = target.replace(version, &selected);

    if target.ends_with(".pom") {
        let rewritten = rewrite_descriptor(backend, policy, group, artifact, &selected, &target, version)?;
        Ok(Some(FallbackOutcome::Rewritten(rewritten)))
    } else if target.ends_with(".pom.sha1") {
        let descriptor_target = target.strip_suffix(".sha1").unwrap_or(&target);
        let rewritten =
            rewrite_descriptor(backend, policy, group, artifact, &selected, descriptor_target, version)?;
        Ok(Some(FallbackOutcome::Rewritten(
            sha1_hex(&rewritten).into_bytes(),
        )))
    } else {
        Ok(backend
            .get_artifact_file(policy, group, artifact, &selected, &target, true)?
            .map(FallbackOutcome::Stream))
    }
}

/// Fetch the substituted descriptor and rewrite its declared version
/// back to the one the caller asked for
fn rewrite_descriptor<B: StorageBackend + ?Sized>(
    backend: &B,
    policy: &str,
    group: &str,
    artifact: &str,
    version: &str,
    target: &str,
    declared_version: &str,
) -> CacheResult<Vec<u8>> {
    let mut result = backend
        .get_artifact_file(policy, group, artifact, version, target, true)?
        .ok_or_else(|| {
            CacheError::NotFound(format!("{}/{}/{}/{}", group, artifact, version, target))
        })?;
    let bytes = result.read_all()?;
    result.close();
    rewrite_pom_version(&bytes, declared_version)
}

/// Pick the nearest known version: the smallest strictly-newer one, or
/// failing that the largest older-or-equal one
pub(crate) fn select_fallback_version(known: &[String], requested: &str) -> Option<String> {
    let requested = ComparableVersion::new(requested);
    let mut newer: Option<ComparableVersion> = None;
    let mut older: Option<ComparableVersion> = None;

    for candidate in known {
        let candidate = ComparableVersion::new(candidate);
        if candidate > requested {
            if newer.as_ref().is_none_or(|n| *n > candidate) {
                newer = Some(candidate);
            }
        } else if older.as_ref().is_none_or(|o| *o < candidate) {
            older = Some(candidate);
        }
    }

    newer.or(older).map(|v| v.as_str().to_string())
}

/// Replace the text of the top-level `<project><version>` element,
/// leaving parent and dependency versions untouched
///
/// A descriptor with no version of its own (parent-inherited) gets one
/// inserted, so the served document always declares the version the
/// caller asked for.
pub(crate) fn rewrite_pom_version(input: &[u8], declared_version: &str) -> CacheResult<Vec<u8>> {
    let mut reader = Reader::from_reader(input);
    let mut writer = Writer::new(Vec::new());
    let mut path: Vec<String> = Vec::new();
    let mut version_declared = false;
    let mut version_text_pending = false;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| CacheError::MalformedDocument(format!("project descriptor: {}", e)))?;
        match event {
            Event::Eof => break,
            Event::Start(e) => {
                path.push(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
                if at_project_version(&path) {
                    version_declared = true;
                    version_text_pending = true;
                }
                write_event(&mut writer, Event::Start(e))?;
            }
            Event::Empty(e) => {
                if path.len() == 1 && path[0] == "project" && e.local_name().as_ref() == b"version"
                {
                    version_declared = true;
                    write_version_element(&mut writer, declared_version)?;
                } else {
                    write_event(&mut writer, Event::Empty(e))?;
                }
            }
            Event::End(e) => {
                if at_project_version(&path) && version_text_pending {
                    // <version></version> with no text node
                    write_event(&mut writer, Event::Text(BytesText::new(declared_version)))?;
                }
                if path.len() == 1 && path[0] == "project" && !version_declared {
                    write_version_element(&mut writer, declared_version)?;
                }
                path.pop();
                write_event(&mut writer, Event::End(e))?;
            }
            Event::Text(text) => {
                if at_project_version(&path) {
                    version_text_pending = false;
                    write_event(&mut writer, Event::Text(BytesText::new(declared_version)))?;
                } else {
                    write_event(&mut writer, Event::Text(text))?;
                }
            }
            other => write_event(&mut writer, other)?,
        }
    }

    Ok(writer.into_inner())
}

fn at_project_version(path: &[String]) -> bool {
    path.len() == 2 && path[0] == "project" && path[1] == "version"
}

fn write_version_element(writer: &mut Writer<Vec<u8>>, version: &str) -> CacheResult<()> {
    write_event(writer, Event::Start(BytesStart::new("version")))?;
    write_event(writer, Event::Text(BytesText::new(version)))?;
    write_event(writer, Event::End(BytesEnd::new("version")))
}

fn write_event(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> CacheResult<()> {
    writer
        .write_event(event)
        .map_err(|e| CacheError::Internal(format!("rewriting project descriptor: {}", e)))
}
