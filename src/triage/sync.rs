//! Bidirectional sync and visual conversion across notes roots.
//!
//! All phases are best-effort: item failures are recorded in the report and
//! never abort the remaining work. The primary root acts as the hub; every
//! other root converges toward it.

use anyhow::Result;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::triage::backend::{Area, NotesBackend, primary_backend};
use crate::triage::extract::TextExtractor;
use crate::triage::naming::{self, Granularity};
use std::collections::BTreeSet;

#[derive(Debug, Default, Serialize)]
pub struct SyncReport {
    pub copied: usize,
    pub converted: usize,
    pub errors: Vec<String>,
}

fn file_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Copy `name` between roots unless the destination already holds identical
/// bytes. Returns whether a write happened.
fn copy_if_differs(
    src: &dyn NotesBackend,
    dst: &dyn NotesBackend,
    area: Area,
    name: &str,
) -> Result<bool> {
    let bytes = src.read_bytes(area, name)?;
    if dst.exists(area, name)?
        && file_hash(&dst.read_bytes(area, name)?) == file_hash(&bytes)
    {
        return Ok(false);
    }
    dst.write_bytes(area, name, &bytes)?;
    Ok(true)
}

fn is_raw_note(name: &str) -> bool {
    !naming::is_analysis(name)
        && !naming::is_sidecar(name)
        && naming::parse_identity(name).is_some()
        && naming::kind_of(name).is_some()
}

/// Raw notes from secondary roots into the primary inbox. Skip-if-exists:
/// capture files are immutable once written, so no hashing here.
fn pull_raw_notes(
    backends: &[Box<dyn NotesBackend>],
    primary: &dyn NotesBackend,
    report: &mut SyncReport,
) {
    let mut seen: BTreeSet<String> = BTreeSet::new();
    for backend in backends {
        if backend.id() == primary.id() {
            continue;
        }
        let Ok(stamps) = backend.list(Area::Inbox) else {
            continue;
        };
        for stamp in stamps {
            if !is_raw_note(&stamp.name) || !seen.insert(stamp.name.clone()) {
                continue;
            }
            if primary.exists(Area::Inbox, &stamp.name).unwrap_or(false) {
                continue;
            }
            match backend
                .read_bytes(Area::Inbox, &stamp.name)
                .and_then(|bytes| primary.write_bytes(Area::Inbox, &stamp.name, &bytes))
            {
                Ok(()) => {
                    report.copied += 1;
                    println!("Copied raw: {}", stamp.name);
                }
                Err(err) => report
                    .errors
                    .push(format!("failed to copy {}: {err:#}", stamp.name)),
            }
        }
    }
}

/// Visual notes in the primary inbox without a sidecar yet: extract each page
/// in order and write the shared sidecar.
fn convert_visuals(
    primary: &dyn NotesBackend,
    extractor: &dyn TextExtractor,
    report: &mut SyncReport,
) {
    let Ok(stamps) = primary.list(Area::Inbox) else {
        return;
    };

    // group page files by timestamp key, pages ascending
    let mut groups: std::collections::BTreeMap<String, Vec<(Option<u32>, String)>> =
        std::collections::BTreeMap::new();
    for stamp in stamps {
        let Some(identity) = naming::parse_identity(&stamp.name) else {
            continue;
        };
        let Some(kind) = naming::kind_of(&stamp.name) else {
            continue;
        };
        if !kind.is_visual() {
            continue;
        }
        groups
            .entry(identity.key())
            .or_default()
            .push((identity.page, stamp.name));
    }

    for (key, mut pages) in groups {
        let sidecar = format!("{key}{}", naming::SIDECAR_SUFFIX);
        if primary.exists(Area::Inbox, &sidecar).unwrap_or(false) {
            continue;
        }
        pages.sort();

        let mut sections = Vec::new();
        let mut failed = false;
        for (_, name) in &pages {
            let ext = name.rsplit('.').next().unwrap_or("");
            let mime = naming::NoteKind::mime_for_extension(ext);
            match primary
                .read_bytes(Area::Inbox, name)
                .and_then(|bytes| extractor.extract(&bytes, mime))
            {
                Ok(text) => sections.push(text.trim_end().to_string()),
                Err(err) => {
                    report
                        .errors
                        .push(format!("failed to convert {name}: {err:#}"));
                    failed = true;
                    break;
                }
            }
        }
        if failed {
            continue;
        }

        match primary.write_text(Area::Inbox, &sidecar, &format!("{}\n", sections.join("\n\n"))) {
            Ok(()) => {
                report.converted += 1;
                println!("Converted: {sidecar}");
            }
            Err(err) => report
                .errors
                .push(format!("failed to write {sidecar}: {err:#}")),
        }
    }
}

/// Analyses and sidecars from the primary out to every other root; hashing
/// skips byte-identical copies since analyses are overwritten in place.
fn push_outputs(
    backends: &[Box<dyn NotesBackend>],
    primary: &dyn NotesBackend,
    report: &mut SyncReport,
) {
    let mut outbound: Vec<(Area, String)> = Vec::new();
    for granularity in Granularity::all() {
        let area = Area::Rollup(granularity);
        let Ok(stamps) = primary.list(area) else {
            continue;
        };
        for stamp in stamps {
            if naming::is_analysis(&stamp.name) || naming::is_sidecar(&stamp.name) {
                outbound.push((area, stamp.name));
            }
        }
    }
    if let Ok(stamps) = primary.list(Area::Inbox) {
        for stamp in stamps {
            if naming::is_sidecar(&stamp.name) {
                outbound.push((Area::Inbox, stamp.name));
            }
        }
    }

    for backend in backends {
        if backend.id() == primary.id() || !backend.is_available() {
            continue;
        }
        for (area, name) in &outbound {
            match copy_if_differs(primary, backend.as_ref(), *area, name) {
                Ok(true) => {
                    report.copied += 1;
                    println!("Synced out: {name}");
                }
                Ok(false) => {}
                Err(err) => report.errors.push(format!(
                    "failed to sync {name} to {}: {err:#}",
                    backend.id()
                )),
            }
        }
    }
}

/// Analyses and sidecars present only in secondary roots back into the
/// primary's sub-namespaces. Skip-if-exists; the primary's copy wins.
fn pull_outputs(
    backends: &[Box<dyn NotesBackend>],
    primary: &dyn NotesBackend,
    report: &mut SyncReport,
) {
    let mut seen: BTreeSet<(&'static str, String)> = BTreeSet::new();
    for backend in backends {
        if backend.id() == primary.id() {
            continue;
        }
        for granularity in Granularity::all() {
            let area = Area::Rollup(granularity);
            let Ok(stamps) = backend.list(area) else {
                continue;
            };
            for stamp in stamps {
                if !seen.insert((granularity.subdir(), stamp.name.clone())) {
                    continue;
                }
                if primary.exists(area, &stamp.name).unwrap_or(false) {
                    continue;
                }
                match backend
                    .read_bytes(area, &stamp.name)
                    .and_then(|bytes| primary.write_bytes(area, &stamp.name, &bytes))
                {
                    Ok(()) => {
                        report.copied += 1;
                        println!("Synced in: {}", stamp.name);
                    }
                    Err(err) => report
                        .errors
                        .push(format!("failed to pull {}: {err:#}", stamp.name)),
                }
            }
        }
    }
}

pub fn sync_all(
    backends: &[Box<dyn NotesBackend>],
    extractor: &dyn TextExtractor,
) -> Result<SyncReport> {
    let primary = primary_backend(backends)?;
    let mut report = SyncReport::default();

    pull_raw_notes(backends, primary, &mut report);
    convert_visuals(primary, extractor, &mut report);
    push_outputs(backends, primary, &mut report);
    pull_outputs(backends, primary, &mut report);

    Ok(report)
}
