//! Four-phase analysis pipeline: Daily, then Weekly, Monthly, Annual.
//!
//! Daily items run on a small worker pool; rollups are sequential since each
//! one depends on the phase before it. Per-item failures are recorded in the
//! report and never abort siblings. Exactly one generation call is made per
//! item per run; re-running after a failure is the retry mechanism.

use anyhow::Result;
use chrono::NaiveDate;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;

use crate::triage::backend::{Area, NotesBackend, backend_by_id, primary_backend};
use crate::triage::model::{GenerationRequest, PlanGenerator};
use crate::triage::naming::{self, Granularity, KindPreference};
use crate::triage::period::{self, Period};
use crate::triage::promote;
use crate::triage::reconcile::{self, SourceNote};

const DAILY_WORKERS: usize = 5;

#[derive(Debug, Default, Serialize)]
pub struct PhaseReport {
    pub successful: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct PipelineReport {
    pub daily: PhaseReport,
    pub weekly: PhaseReport,
    pub monthly: PhaseReport,
    pub annual: PhaseReport,
}

impl PipelineReport {
    pub fn phase(&self, granularity: Granularity) -> &PhaseReport {
        match granularity {
            Granularity::Daily => &self.daily,
            Granularity::Weekly => &self.weekly,
            Granularity::Monthly => &self.monthly,
            Granularity::Annual => &self.annual,
        }
    }

    fn phase_mut(&mut self, granularity: Granularity) -> &mut PhaseReport {
        match granularity {
            Granularity::Daily => &mut self.daily,
            Granularity::Weekly => &mut self.weekly,
            Granularity::Monthly => &mut self.monthly,
            Granularity::Annual => &mut self.annual,
        }
    }
}

/// Canonical persisted form of an analysis document.
pub fn render_output(analysis: &str) -> String {
    format!("Triaged Tasks\n{}\n\n{}\n", "=".repeat(40), analysis)
}

fn print_summary(granularity: Granularity, phase: &PhaseReport) {
    println!(
        "{} Summary: {} successful, {} failed",
        granularity.label(),
        phase.successful,
        phase.failed
    );
}

fn analyze_note(
    backends: &[Box<dyn NotesBackend>],
    generator: &dyn PlanGenerator,
    note: &SourceNote,
) -> Result<String> {
    let period = period::bounds_of(Granularity::Daily, note.identity.date());
    let analysis = generator.generate(&GenerationRequest {
        period,
        notes: note.content.clone(),
    })?;

    // Persist next to the root the note came from; sync propagates later.
    let backend = backend_by_id(backends, &note.root_id)
        .ok_or_else(|| anyhow::anyhow!("root `{}` disappeared mid-run", note.root_id))?;
    let name = naming::analysis_name(Granularity::Daily, period.key());
    backend.write_text(Area::Rollup(Granularity::Daily), &name, &render_output(&analysis))?;
    Ok(name)
}

fn run_daily_phase(
    backends: &[Box<dyn NotesBackend>],
    generator: &dyn PlanGenerator,
    preference: KindPreference,
    dry_run: bool,
    report: &mut PipelineReport,
) -> Result<()> {
    let notes = reconcile::find_unprocessed(backends, Granularity::Daily, preference)?;

    if dry_run {
        for note in &notes {
            println!("Would analyze: {} (from {})", note.filename, note.root_id);
        }
        print_summary(Granularity::Daily, &report.daily);
        return Ok(());
    }

    let next = AtomicUsize::new(0);
    let (tx, rx) = mpsc::channel::<(usize, Result<String, String>)>();

    thread::scope(|scope| {
        for _ in 0..DAILY_WORKERS.min(notes.len().max(1)) {
            let tx = tx.clone();
            let next = &next;
            let notes = &notes;
            scope.spawn(move || {
                loop {
                    let index = next.fetch_add(1, Ordering::SeqCst);
                    let Some(note) = notes.get(index) else {
                        break;
                    };
                    println!("Analyzing tasks from: {}", note.filename);
                    let outcome = analyze_note(backends, generator, note)
                        .map_err(|err| format!("{}: {err:#}", note.filename));
                    if tx.send((index, outcome)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(tx);

        for (_, outcome) in rx {
            match outcome {
                Ok(name) => {
                    report.daily.successful += 1;
                    println!("Saved: {name}");
                }
                Err(err) => {
                    report.daily.failed += 1;
                    eprintln!("Analysis failed: {err}");
                    report.daily.errors.push(err);
                }
            }
        }
    });

    print_summary(Granularity::Daily, &report.daily);
    Ok(())
}

fn run_rollup_phase(
    backends: &[Box<dyn NotesBackend>],
    generator: &dyn PlanGenerator,
    granularity: Granularity,
    now: NaiveDate,
    dry_run: bool,
    report: &mut PipelineReport,
) -> Result<()> {
    let periods = promote::find_periods_needing_rollup(backends, granularity, now)?;
    if periods.is_empty() {
        return Ok(());
    }

    if dry_run {
        for p in &periods {
            println!("Would roll up {}: {}", granularity.label(), p.label());
        }
        return Ok(());
    }

    for p in periods {
        println!("Analyzing {}: {}", granularity.label(), p.label());
        match roll_up_period(backends, generator, p) {
            Ok(name) => {
                report.phase_mut(granularity).successful += 1;
                println!("Saved: {name}");
            }
            Err(err) => {
                let message = format!("{}: {err:#}", p.label());
                eprintln!("Analysis failed: {message}");
                let phase = report.phase_mut(granularity);
                phase.failed += 1;
                phase.errors.push(message);
            }
        }
    }

    print_summary(granularity, report.phase(granularity));
    Ok(())
}

fn roll_up_period(
    backends: &[Box<dyn NotesBackend>],
    generator: &dyn PlanGenerator,
    p: Period,
) -> Result<String> {
    let children = promote::collect_children(backends, p)?;
    let analysis = generator.generate(&GenerationRequest {
        period: p,
        notes: children,
    })?;

    let primary = primary_backend(backends)?;
    let name = naming::analysis_name(p.granularity, p.key());
    primary.write_text(Area::Rollup(p.granularity), &name, &render_output(&analysis))?;
    Ok(name)
}

/// Run all four phases as of `now`. Errors only when the daily phase cannot
/// list a single source; rollup-phase scheduling problems are recorded per
/// item instead.
pub fn run_pipeline(
    backends: &[Box<dyn NotesBackend>],
    generator: &dyn PlanGenerator,
    preference: KindPreference,
    now: NaiveDate,
    dry_run: bool,
) -> Result<PipelineReport> {
    let mut report = PipelineReport::default();

    run_daily_phase(backends, generator, preference, dry_run, &mut report)?;
    for granularity in [Granularity::Weekly, Granularity::Monthly, Granularity::Annual] {
        run_rollup_phase(backends, generator, granularity, now, dry_run, &mut report)?;
    }

    println!("Triage complete!");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TriageError;
    use crate::triage::backend::LocalDirBackend;
    use crate::triage::model::OfflineGenerator;
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    fn backend(path: &Path, id: &str) -> Box<dyn NotesBackend> {
        Box::new(LocalDirBackend::new(id, path))
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn output_format_has_header_rule_and_trailing_newline() {
        let out = render_output("plan body");
        assert!(out.starts_with("Triaged Tasks\n"));
        assert!(out.contains(&"=".repeat(40)));
        assert!(out.ends_with("plan body\n"));
    }

    #[test]
    fn daily_phase_writes_next_to_the_source_root() {
        let a = tempdir().unwrap();
        let b = tempdir().unwrap();
        fs::write(b.path().join("20251231_143000.txt"), "Work\n Fix bug *\n").unwrap();
        let backends = vec![backend(a.path(), "usb"), backend(b.path(), "local")];

        let report = run_pipeline(
            &backends,
            &OfflineGenerator,
            KindPreference::Txt,
            date(2025, 12, 31),
            false,
        )
        .unwrap();

        assert_eq!(report.daily.successful, 1);
        assert_eq!(report.daily.failed, 0);
        assert!(b.path().join("daily/31_12_2025.triaged.txt").is_file());
        assert!(!a.path().join("daily/31_12_2025.triaged.txt").exists());
    }

    #[test]
    fn second_run_is_idempotent() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("20251231_143000.txt"), "Work\n Fix bug\n").unwrap();
        let backends = vec![backend(tmp.path(), "usb")];

        let first = run_pipeline(
            &backends,
            &OfflineGenerator,
            KindPreference::Txt,
            date(2025, 12, 31),
            false,
        )
        .unwrap();
        assert_eq!(first.daily.successful, 1);

        let second = run_pipeline(
            &backends,
            &OfflineGenerator,
            KindPreference::Txt,
            date(2025, 12, 31),
            false,
        )
        .unwrap();
        assert_eq!(second.daily.successful, 0);
        assert_eq!(second.daily.failed, 0);
    }

    #[test]
    fn closed_week_rolls_up_in_the_same_run() {
        let tmp = tempdir().unwrap();
        // a Wednesday note; by the following Monday the week has closed
        fs::write(tmp.path().join("20251203_090000.txt"), "Work\n Ship release\n").unwrap();
        let backends = vec![backend(tmp.path(), "usb")];

        let report = run_pipeline(
            &backends,
            &OfflineGenerator,
            KindPreference::Txt,
            date(2025, 12, 8),
            false,
        )
        .unwrap();

        assert_eq!(report.daily.successful, 1);
        assert_eq!(report.weekly.successful, 1);
        let weekly = tmp.path().join("weekly/week1_12_2025.triaged.txt");
        let body = fs::read_to_string(weekly).unwrap();
        assert!(body.starts_with("Triaged Tasks\n"));
    }

    #[test]
    fn existing_rollup_is_not_regenerated() {
        let tmp = tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("daily")).unwrap();
        fs::write(tmp.path().join("daily/03_12_2025.triaged.txt"), "plan").unwrap();
        fs::create_dir_all(tmp.path().join("weekly")).unwrap();
        fs::write(tmp.path().join("weekly/week1_12_2025.triaged.txt"), "already").unwrap();
        let backends = vec![backend(tmp.path(), "usb")];

        let report = run_pipeline(
            &backends,
            &OfflineGenerator,
            KindPreference::Txt,
            date(2025, 12, 8),
            false,
        )
        .unwrap();
        assert_eq!(report.weekly.successful, 0);
        assert_eq!(
            fs::read_to_string(tmp.path().join("weekly/week1_12_2025.triaged.txt")).unwrap(),
            "already"
        );
    }

    #[test]
    fn dry_run_writes_nothing() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("20251231_143000.txt"), "Work\n Fix bug\n").unwrap();
        let backends = vec![backend(tmp.path(), "usb")];

        let report = run_pipeline(
            &backends,
            &OfflineGenerator,
            KindPreference::Txt,
            date(2025, 12, 31),
            true,
        )
        .unwrap();
        assert_eq!(report.daily.successful, 0);
        assert!(!tmp.path().join("daily").exists());
    }

    #[test]
    fn all_roots_unreachable_is_a_pipeline_error() {
        let backends = vec![backend(Path::new("/nonexistent/a"), "usb")];
        let err = run_pipeline(
            &backends,
            &OfflineGenerator,
            KindPreference::Txt,
            date(2025, 12, 31),
            false,
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TriageError>(),
            Some(TriageError::NoSourceAvailable)
        ));
    }
}
