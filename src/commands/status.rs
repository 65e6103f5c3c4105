use anyhow::Result;
use chrono::Local;

use crate::commands::CommandReport;
use crate::error::TriageError;
use crate::triage::config;
use crate::triage::naming::{Granularity, KindPreference};
use crate::triage::promote;
use crate::triage::reconcile;

/// Read-only dry run of reconciliation and promotion: configured roots and
/// their reachability, pending daily notes, and rollup periods that are due.
pub fn run(prefer: KindPreference) -> Result<CommandReport> {
    let cfg = config::load_config()?;
    let backends = config::build_backends(&cfg);

    let mut report = CommandReport::new("status");
    report.detail(format!("provider={}", cfg.model.provider));
    for backend in &backends {
        let state = if backend.is_available() {
            "available"
        } else {
            "unreachable"
        };
        report.detail(format!("root {}: {state}", backend.id()));
    }

    match reconcile::find_unprocessed(&backends, Granularity::Daily, prefer) {
        Ok(notes) => {
            report.detail(format!("pending daily notes: {}", notes.len()));
            for note in notes {
                report.detail(format!("  {} (from {})", note.filename, note.root_id));
            }
        }
        Err(err) => match err.downcast_ref::<TriageError>() {
            Some(TriageError::NoSourceAvailable) => {
                report.issue("every configured root is unreachable");
            }
            _ => return Err(err),
        },
    }

    let now = Local::now().date_naive();
    for granularity in [Granularity::Weekly, Granularity::Monthly, Granularity::Annual] {
        let periods = promote::find_periods_needing_rollup(&backends, granularity, now)?;
        report.detail(format!(
            "pending {} rollups: {}",
            granularity.label().to_lowercase(),
            periods.len()
        ));
        for p in periods {
            report.detail(format!("  {}", p.label()));
        }
    }
    Ok(report)
}
