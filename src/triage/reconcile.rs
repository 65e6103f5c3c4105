//! Multi-root reconciliation: decide which source notes still need analysis.
//!
//! The pass is read-only and side-effect free. Visual notes are never
//! converted inline here; a note whose sidecar is missing is silently skipped
//! until a sync pass produces one.

use anyhow::Result;
use std::collections::BTreeSet;

use crate::error::TriageError;
use crate::triage::backend::{Area, NotesBackend};
use crate::triage::naming::{
    self, Granularity, KindPreference, NoteIdentity, NoteKind,
};
use crate::triage::period;

/// A raw note selected for (re-)analysis, with its text already materialized:
/// a direct read for text notes, the converted sidecar for visual ones.
#[derive(Debug, Clone)]
pub struct SourceNote {
    pub identity: NoteIdentity,
    pub kind: NoteKind,
    pub root_id: String,
    pub filename: String,
    pub content: String,
}

/// Raw notes live at the top level of each root; hypothetical coarser source
/// notes would live in that granularity's sub-namespace.
fn source_area(granularity: Granularity) -> Area {
    match granularity {
        Granularity::Daily => Area::Inbox,
        other => Area::Rollup(other),
    }
}

/// All notes needing (re-)analysis across the configured roots, in priority
/// order, newest-first within each root. Returns an empty vector when every
/// candidate is filtered out; errors only when no root is reachable at all.
pub fn find_unprocessed(
    backends: &[Box<dyn NotesBackend>],
    granularity: Granularity,
    preference: KindPreference,
) -> Result<Vec<SourceNote>> {
    let (notes, reachable) = scan(backends, granularity, preference);
    if reachable == 0 {
        return Err(TriageError::NoSourceAvailable.into());
    }
    Ok(notes)
}

/// Single-item variant for the legacy one-shot entry point: first qualifying
/// note, or `NothingToProcess` when all candidates are filtered out.
pub fn find_first_unprocessed(
    backends: &[Box<dyn NotesBackend>],
    granularity: Granularity,
    preference: KindPreference,
) -> Result<SourceNote> {
    let (mut notes, reachable) = scan(backends, granularity, preference);
    if reachable == 0 {
        return Err(TriageError::NoSourceAvailable.into());
    }
    if notes.is_empty() {
        return Err(TriageError::NothingToProcess.into());
    }
    Ok(notes.remove(0))
}

fn scan(
    backends: &[Box<dyn NotesBackend>],
    granularity: Granularity,
    preference: KindPreference,
) -> (Vec<SourceNote>, usize) {
    let area = source_area(granularity);
    let mut notes = Vec::new();
    let mut emitted: BTreeSet<String> = BTreeSet::new();
    let mut reachable = 0usize;

    for backend in backends {
        let mut stamps = match backend.list(area) {
            Ok(stamps) => {
                reachable += 1;
                stamps
            }
            Err(err) => {
                eprintln!("warning: skipping root `{}`: {err:#}", backend.id());
                continue;
            }
        };

        // Newest timestamp first; the naming scheme makes that a name sort.
        stamps.sort_by(|a, b| b.name.cmp(&a.name));

        for stamp in stamps {
            if stamp.name.contains(naming::ANALYSIS_MARKER) {
                continue;
            }
            let Some(identity) = naming::parse_identity(&stamp.name) else {
                continue;
            };
            let Some(kind) = naming::kind_of(&stamp.name) else {
                continue;
            };
            if !preference.matches(kind) {
                continue;
            }
            if emitted.contains(&identity.key()) {
                continue;
            }

            let output_key = period::bounds_of(granularity, identity.date()).key();
            let output_name = naming::analysis_name(granularity, output_key);
            let sidecar_name = naming::sidecar_name(&identity);

            if backend
                .exists(Area::Rollup(granularity), &output_name)
                .unwrap_or(false)
                && !is_stale(backend.as_ref(), area, &stamp.name, &sidecar_name, kind, granularity, &output_name)
            {
                continue;
            }

            // Materialize text. Visual notes require an existing sidecar;
            // conversion belongs to the sync pass, never to reconciliation.
            let content = if kind.is_visual() {
                match backend.exists(area, &sidecar_name) {
                    Ok(true) => match backend.read_text(area, &sidecar_name) {
                        Ok(text) => text,
                        Err(err) => {
                            eprintln!("warning: unreadable sidecar {sidecar_name}: {err:#}");
                            continue;
                        }
                    },
                    _ => continue,
                }
            } else {
                match backend.read_text(area, &stamp.name) {
                    Ok(text) => text,
                    Err(err) => {
                        eprintln!("warning: unreadable note {}: {err:#}", stamp.name);
                        continue;
                    }
                }
            };

            emitted.insert(identity.key());
            notes.push(SourceNote {
                identity,
                kind,
                root_id: backend.id().to_string(),
                filename: stamp.name,
                content,
            });
        }
    }

    (notes, reachable)
}

/// Edited-after-analysis check. The note itself, or its converted sidecar for
/// visual kinds, being newer than the existing analysis forces re-analysis.
fn is_stale(
    backend: &dyn NotesBackend,
    area: Area,
    note_name: &str,
    sidecar_name: &str,
    kind: NoteKind,
    granularity: Granularity,
    output_name: &str,
) -> bool {
    let Ok(Some(analysis_mtime)) = backend.mtime(Area::Rollup(granularity), output_name) else {
        return false;
    };

    if let Ok(Some(note_mtime)) = backend.mtime(area, note_name)
        && note_mtime > analysis_mtime
    {
        return true;
    }

    if kind.is_visual()
        && let Ok(Some(sidecar_mtime)) = backend.mtime(area, sidecar_name)
        && sidecar_mtime > analysis_mtime
    {
        return true;
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::triage::backend::LocalDirBackend;
    use std::fs;
    use std::path::Path;
    use std::time::{Duration, SystemTime};
    use tempfile::tempdir;

    fn backend(path: &Path, id: &str) -> Box<dyn NotesBackend> {
        Box::new(LocalDirBackend::new(id, path))
    }

    fn touch_at(path: &Path, when: SystemTime) {
        let file = fs::File::options().write(true).open(path).unwrap();
        file.set_modified(when).unwrap();
    }

    #[test]
    fn finds_unanalyzed_text_note() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("20251231_143000.txt"), "Work\n Fix bug *\n").unwrap();
        let backends = vec![backend(tmp.path(), "usb")];

        let notes =
            find_unprocessed(&backends, Granularity::Daily, KindPreference::Txt).unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].root_id, "usb");
        assert_eq!(notes[0].content, "Work\n Fix bug *\n");
    }

    #[test]
    fn skips_note_with_existing_fresh_analysis() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("20251231_143000.txt"), "notes").unwrap();
        fs::create_dir(tmp.path().join("daily")).unwrap();
        fs::write(tmp.path().join("daily/31_12_2025.triaged.txt"), "plan").unwrap();
        // analysis postdates the note
        touch_at(
            &tmp.path().join("daily/31_12_2025.triaged.txt"),
            SystemTime::now() + Duration::from_secs(60),
        );
        let backends = vec![backend(tmp.path(), "usb")];

        let notes =
            find_unprocessed(&backends, Granularity::Daily, KindPreference::Txt).unwrap();
        assert!(notes.is_empty());
    }

    #[test]
    fn edited_note_triggers_reanalysis() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("20251231_143000.txt"), "edited notes").unwrap();
        fs::create_dir(tmp.path().join("daily")).unwrap();
        fs::write(tmp.path().join("daily/31_12_2025.triaged.txt"), "old plan").unwrap();
        // note postdates the analysis
        touch_at(
            &tmp.path().join("20251231_143000.txt"),
            SystemTime::now() + Duration::from_secs(60),
        );
        let backends = vec![backend(tmp.path(), "usb")];

        let notes =
            find_unprocessed(&backends, Granularity::Daily, KindPreference::Txt).unwrap();
        assert_eq!(notes.len(), 1);
    }

    #[test]
    fn dedups_identical_timestamp_across_roots() {
        let a = tempdir().unwrap();
        let b = tempdir().unwrap();
        fs::write(a.path().join("20251231_143000.txt"), "from a").unwrap();
        fs::write(b.path().join("20251231_143000.txt"), "from b").unwrap();
        let backends = vec![backend(a.path(), "usb"), backend(b.path(), "local")];

        let notes =
            find_unprocessed(&backends, Granularity::Daily, KindPreference::Txt).unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].root_id, "usb");
        assert_eq!(notes[0].content, "from a");
    }

    #[test]
    fn multipage_scan_yields_one_note_via_sidecar() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("20250101_090000_Page_1.png"), [0u8; 4]).unwrap();
        fs::write(tmp.path().join("20250101_090000_Page_2.png"), [0u8; 4]).unwrap();
        fs::write(
            tmp.path().join("20250101_090000.raw_notes.txt"),
            "transcribed",
        )
        .unwrap();
        let backends = vec![backend(tmp.path(), "usb")];

        let notes =
            find_unprocessed(&backends, Granularity::Daily, KindPreference::Visual).unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].content, "transcribed");
    }

    #[test]
    fn visual_without_sidecar_is_skipped_silently() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("20250101_090000.png"), [0u8; 4]).unwrap();
        let backends = vec![backend(tmp.path(), "usb")];

        let notes =
            find_unprocessed(&backends, Granularity::Daily, KindPreference::Visual).unwrap();
        assert!(notes.is_empty());
    }

    #[test]
    fn unparseable_and_marker_names_are_ignored() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("shopping-list.txt"), "milk").unwrap();
        fs::write(tmp.path().join("31_12_2025.triaged.txt"), "stray").unwrap();
        let backends = vec![backend(tmp.path(), "usb")];

        let notes =
            find_unprocessed(&backends, Granularity::Daily, KindPreference::Txt).unwrap();
        assert!(notes.is_empty());
    }

    #[test]
    fn all_roots_unreachable_is_a_hard_error() {
        let backends = vec![
            backend(Path::new("/nonexistent/a"), "usb"),
            backend(Path::new("/nonexistent/b"), "local"),
        ];
        let err = find_unprocessed(&backends, Granularity::Daily, KindPreference::Txt)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TriageError>(),
            Some(TriageError::NoSourceAvailable)
        ));
    }

    #[test]
    fn single_item_mode_reports_nothing_to_process() {
        let tmp = tempdir().unwrap();
        let backends = vec![backend(tmp.path(), "usb")];
        let err = find_first_unprocessed(&backends, Granularity::Daily, KindPreference::Txt)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TriageError>(),
            Some(TriageError::NothingToProcess)
        ));
    }

    #[test]
    fn single_item_mode_returns_newest_first() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("20251230_080000.txt"), "older").unwrap();
        fs::write(tmp.path().join("20251231_080000.txt"), "newer").unwrap();
        let backends = vec![backend(tmp.path(), "usb")];

        let note =
            find_first_unprocessed(&backends, Granularity::Daily, KindPreference::Txt).unwrap();
        assert_eq!(note.content, "newer");
    }
}
