use anyhow::Result;

use crate::commands::CommandReport;
use crate::triage::config;
use crate::triage::extract;
use crate::triage::sync;

pub fn run() -> Result<CommandReport> {
    let cfg = config::load_config()?;
    let backends = config::build_backends(&cfg);
    let extractor = extract::build_extractor(&cfg)?;

    let stats = sync::sync_all(&backends, extractor.as_ref())?;

    let mut report = CommandReport::new("sync");
    report.detail(format!("extractor={}", extractor.label()));
    report.detail(format!("copied={}", stats.copied));
    report.detail(format!("converted={}", stats.converted));
    for error in stats.errors {
        report.issue(error);
    }
    Ok(report)
}
