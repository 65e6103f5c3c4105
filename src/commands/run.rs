use anyhow::{Context, Result};
use chrono::Local;
use fs2::FileExt;
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::commands::CommandReport;
use crate::triage::config::{self, TriageConfig};
use crate::triage::model;
use crate::triage::naming::{Granularity, KindPreference};
use crate::triage::pipeline;

const LOCK_FILE: &str = ".triage.lock";

/// Advisory lock held for the whole run; released on drop. Two overlapping
/// runs would double-call the model and race on output files.
struct RunLock {
    _file: File,
}

fn lock_path(cfg: &TriageConfig) -> Option<PathBuf> {
    let home = dirs::home_dir();
    cfg.sources
        .roots
        .first()
        .map(|root| config::expand_tilde(root, home.as_ref()).join(LOCK_FILE))
        .or_else(|| {
            cfg.drive
                .as_ref()
                .and_then(|d| d.mirror.as_deref())
                .map(|m| config::expand_tilde(m, home.as_ref()).join(LOCK_FILE))
        })
}

fn acquire_run_lock(cfg: &TriageConfig) -> Result<Option<RunLock>> {
    let Some(path) = lock_path(cfg) else {
        return Ok(None);
    };
    // An unmounted root must stay missing so the pipeline reports it; only
    // lock when the directory is actually there.
    if !path.parent().is_some_and(Path::is_dir) {
        return Ok(None);
    }
    let file =
        File::create(&path).with_context(|| format!("failed to create {}", path.display()))?;
    file.try_lock_exclusive()
        .map_err(|_| anyhow::anyhow!("another tasktriage run is already in progress"))?;
    Ok(Some(RunLock { _file: file }))
}

pub fn run(prefer: KindPreference, dry_run: bool) -> Result<CommandReport> {
    let cfg = config::load_config()?;
    let backends = config::build_backends(&cfg);
    let generator = model::build_generator(&cfg)?;
    let _lock = acquire_run_lock(&cfg)?;

    let now = Local::now().date_naive();
    let pipeline_report =
        pipeline::run_pipeline(&backends, generator.as_ref(), prefer, now, dry_run)?;

    let mut report = CommandReport::new("run");
    report.detail(format!("provider={}", generator.label()));
    for granularity in Granularity::all() {
        let phase = pipeline_report.phase(granularity);
        report.detail(format!(
            "{}: {} successful, {} failed",
            granularity.label().to_lowercase(),
            phase.successful,
            phase.failed
        ));
    }

    // only daily failures make the run itself a failure
    for error in &pipeline_report.daily.errors {
        report.issue(error.clone());
    }
    for granularity in [Granularity::Weekly, Granularity::Monthly, Granularity::Annual] {
        for error in &pipeline_report.phase(granularity).errors {
            report.detail(format!(
                "{} rollup failed: {error}",
                granularity.label().to_lowercase()
            ));
        }
    }
    Ok(report)
}
