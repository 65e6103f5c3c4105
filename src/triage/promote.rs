//! Rollup scheduling: which parent periods are ready to be summarized from
//! their child analyses.
//!
//! A period becomes due on completeness (a full complement of children) or on
//! closure (the period has ended and at least one child exists). Periods with
//! zero children are never enumerated, so an empty inbox schedules nothing.

use anyhow::Result;
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};

use crate::triage::backend::{Area, NotesBackend};
use crate::triage::naming::{self, Granularity};
use crate::triage::period::{self, Period};

/// Children needed before a period is considered complete ahead of closure:
/// five weekdays per work week, four week blocks per month, twelve months
/// per year.
fn completeness_threshold(granularity: Granularity) -> usize {
    match granularity {
        Granularity::Daily => 0,
        Granularity::Weekly => 5,
        Granularity::Monthly => 4,
        Granularity::Annual => 12,
    }
}

/// Distinct child analysis filenames across all reachable roots, with the
/// period-representative date parsed from each name. Unreachable roots
/// contribute nothing; malformed names are skipped.
fn child_analyses(
    backends: &[Box<dyn NotesBackend>],
    child: Granularity,
) -> BTreeMap<String, NaiveDate> {
    let mut out = BTreeMap::new();
    for backend in backends {
        let Ok(stamps) = backend.list(Area::Rollup(child)) else {
            continue;
        };
        for stamp in stamps {
            if out.contains_key(&stamp.name) {
                continue;
            }
            if let Some(date) = naming::parse_analysis_date(child, &stamp.name) {
                out.insert(stamp.name, date);
            }
        }
    }
    out
}

fn rollup_exists(backends: &[Box<dyn NotesBackend>], period: Period) -> bool {
    let name = naming::analysis_name(period.granularity, period.key());
    backends
        .iter()
        .any(|b| b.exists(Area::Rollup(period.granularity), &name).unwrap_or(false))
}

/// Periods of `granularity` due for a rollup as of `now`, ascending by start
/// date. Daily has no children and always yields an empty schedule.
pub fn find_periods_needing_rollup(
    backends: &[Box<dyn NotesBackend>],
    granularity: Granularity,
    now: NaiveDate,
) -> Result<Vec<Period>> {
    let Some(child) = granularity.child() else {
        return Ok(Vec::new());
    };

    // Group child analyses by the parent period containing them. For weekly
    // parents a weekend-dated child maps to its week's Monday.
    let mut groups: BTreeMap<NaiveDate, (Period, usize, usize)> = BTreeMap::new();
    for date in child_analyses(backends, child).into_values() {
        let parent = period::bounds_of(granularity, date);
        let entry = groups.entry(parent.key()).or_insert((parent, 0, 0));
        entry.1 += 1;
        if period::is_weekday(date) {
            entry.2 += 1;
        }
    }

    let threshold = completeness_threshold(granularity);
    let mut due = Vec::new();
    for (parent, total, weekdays) in groups.into_values() {
        if rollup_exists(backends, parent) {
            continue;
        }
        // Weekly completeness counts weekday children only; a Saturday note
        // never substitutes for a missing workday.
        let counted = match granularity {
            Granularity::Weekly => weekdays,
            _ => total,
        };
        let complete = counted >= threshold;
        let closed = now > parent.end && total >= 1;
        if complete || closed {
            due.push(parent);
        }
    }
    Ok(due)
}

fn child_label(parent: Granularity, date: NaiveDate) -> String {
    match parent {
        Granularity::Daily | Granularity::Weekly => format!("## {}", period::long_date(date)),
        Granularity::Monthly => {
            let week = period::bounds_of(Granularity::Weekly, date);
            format!(
                "## Week of {} - {}",
                week.start.format("%B %d"),
                week.end.format("%B %d, %Y")
            )
        }
        Granularity::Annual => format!("## {}", date.format("%B %Y")),
    }
}

/// Collate the period's child analyses into one labelled document, ascending
/// by child date, deduped across roots, sections separated by a rule.
pub fn collect_children(
    backends: &[Box<dyn NotesBackend>],
    period: Period,
) -> Result<String> {
    let Some(child) = period.granularity.child() else {
        return Ok(String::new());
    };

    let mut by_date: BTreeMap<NaiveDate, String> = BTreeMap::new();
    let mut seen: BTreeSet<String> = BTreeSet::new();

    for backend in backends {
        let Ok(stamps) = backend.list(Area::Rollup(child)) else {
            continue;
        };
        for stamp in stamps {
            if !seen.insert(stamp.name.clone()) {
                continue;
            }
            let Some(date) = naming::parse_analysis_date(child, &stamp.name) else {
                continue;
            };
            if period::bounds_of(period.granularity, date).key() != period.key() {
                continue;
            }
            let content = backend.read_text(Area::Rollup(child), &stamp.name)?;
            by_date.insert(
                date,
                format!("{}\n\n{}", child_label(period.granularity, date), content.trim_end()),
            );
        }
    }

    Ok(by_date.into_values().collect::<Vec<_>>().join("\n\n---\n\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::triage::backend::LocalDirBackend;
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    fn backend(path: &Path, id: &str) -> Box<dyn NotesBackend> {
        Box::new(LocalDirBackend::new(id, path))
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn write_daily(root: &Path, name: &str, body: &str) {
        fs::create_dir_all(root.join("daily")).unwrap();
        fs::write(root.join("daily").join(name), body).unwrap();
    }

    #[test]
    fn complete_work_week_is_due_before_closure() {
        let tmp = tempdir().unwrap();
        // Monday Dec 1 through Friday Dec 5, 2025
        for day in 1..=5 {
            write_daily(tmp.path(), &format!("0{day}_12_2025.triaged.txt"), "plan");
        }
        let backends = vec![backend(tmp.path(), "usb")];

        // asked mid-week, before the Friday has passed
        let due =
            find_periods_needing_rollup(&backends, Granularity::Weekly, date(2025, 12, 4)).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].start, date(2025, 12, 1));
    }

    #[test]
    fn partial_week_waits_for_closure() {
        let tmp = tempdir().unwrap();
        write_daily(tmp.path(), "02_12_2025.triaged.txt", "plan");
        let backends = vec![backend(tmp.path(), "usb")];

        let before =
            find_periods_needing_rollup(&backends, Granularity::Weekly, date(2025, 12, 4)).unwrap();
        assert!(before.is_empty());

        // Saturday Dec 6: the work week has ended
        let after =
            find_periods_needing_rollup(&backends, Granularity::Weekly, date(2025, 12, 6)).unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].start, date(2025, 12, 1));
    }

    #[test]
    fn weekend_child_does_not_count_toward_completeness() {
        let tmp = tempdir().unwrap();
        // four weekdays plus the Saturday of the same week
        for day in 1..=4 {
            write_daily(tmp.path(), &format!("0{day}_12_2025.triaged.txt"), "plan");
        }
        write_daily(tmp.path(), "06_12_2025.triaged.txt", "weekend plan");
        let backends = vec![backend(tmp.path(), "usb")];

        let due =
            find_periods_needing_rollup(&backends, Granularity::Weekly, date(2025, 12, 4)).unwrap();
        assert!(due.is_empty());
    }

    #[test]
    fn existing_rollup_in_any_root_suppresses_the_period() {
        let a = tempdir().unwrap();
        let b = tempdir().unwrap();
        write_daily(a.path(), "02_12_2025.triaged.txt", "plan");
        fs::create_dir_all(b.path().join("weekly")).unwrap();
        fs::write(b.path().join("weekly/week1_12_2025.triaged.txt"), "done").unwrap();
        let backends = vec![backend(a.path(), "usb"), backend(b.path(), "local")];

        let due =
            find_periods_needing_rollup(&backends, Granularity::Weekly, date(2025, 12, 8)).unwrap();
        assert!(due.is_empty());
    }

    #[test]
    fn year_closure_promotes_a_single_monthly() {
        let tmp = tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("monthly")).unwrap();
        fs::write(tmp.path().join("monthly/06_2025.triaged.txt"), "june").unwrap();
        let backends = vec![backend(tmp.path(), "usb")];

        let before =
            find_periods_needing_rollup(&backends, Granularity::Annual, date(2025, 12, 31))
                .unwrap();
        assert!(before.is_empty());

        let after =
            find_periods_needing_rollup(&backends, Granularity::Annual, date(2026, 1, 1)).unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].start, date(2025, 1, 1));
    }

    #[test]
    fn daily_never_schedules_rollups() {
        let tmp = tempdir().unwrap();
        let backends = vec![backend(tmp.path(), "usb")];
        let due =
            find_periods_needing_rollup(&backends, Granularity::Daily, date(2025, 12, 4)).unwrap();
        assert!(due.is_empty());
    }

    #[test]
    fn collation_orders_labels_and_dedups_across_roots() {
        let a = tempdir().unwrap();
        let b = tempdir().unwrap();
        write_daily(a.path(), "02_12_2025.triaged.txt", "tuesday plan\n");
        write_daily(a.path(), "01_12_2025.triaged.txt", "monday plan\n");
        // duplicate filename in the lower-priority root must not repeat
        write_daily(b.path(), "01_12_2025.triaged.txt", "stale copy\n");
        let backends = vec![backend(a.path(), "usb"), backend(b.path(), "local")];

        let week = period::bounds_of(Granularity::Weekly, date(2025, 12, 1));
        let collated = collect_children(&backends, week).unwrap();

        let monday = collated.find("## Monday, December 01, 2025").unwrap();
        let tuesday = collated.find("## Tuesday, December 02, 2025").unwrap();
        assert!(monday < tuesday);
        assert!(collated.contains("monday plan"));
        assert!(!collated.contains("stale copy"));
        assert_eq!(collated.matches("\n\n---\n\n").count(), 1);
    }

    #[test]
    fn monthly_collation_uses_week_range_labels() {
        let tmp = tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("weekly")).unwrap();
        fs::write(tmp.path().join("weekly/week1_12_2025.triaged.txt"), "w1").unwrap();
        let backends = vec![backend(tmp.path(), "usb")];

        let month = period::bounds_of(Granularity::Monthly, date(2025, 12, 1));
        let collated = collect_children(&backends, month).unwrap();
        assert!(collated.contains("## Week of December 01 - December 05, 2025"));
    }
}
