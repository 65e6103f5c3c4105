use anyhow::Result;
use chrono::Local;

use crate::commands::CommandReport;
use crate::triage::backend::{Area, backend_by_id, primary_backend};
use crate::triage::config;
use crate::triage::model::{self, GenerationRequest};
use crate::triage::naming::{self, Granularity, KindPreference};
use crate::triage::period;
use crate::triage::pipeline::render_output;
use crate::triage::promote;
use crate::triage::reconcile;

/// One-shot entry point: analyze a single pending item of the requested
/// granularity and stop. `run` is the batch equivalent.
pub fn run(granularity: Granularity, prefer: KindPreference) -> Result<CommandReport> {
    let cfg = config::load_config()?;
    let backends = config::build_backends(&cfg);
    let generator = model::build_generator(&cfg)?;

    let mut report = CommandReport::new("analyze");
    report.detail(format!("provider={}", generator.label()));

    if granularity == Granularity::Daily {
        let note = reconcile::find_first_unprocessed(&backends, granularity, prefer)?;
        println!("Analyzing tasks from: {}", note.filename);

        let p = period::bounds_of(Granularity::Daily, note.identity.date());
        let analysis = generator.generate(&GenerationRequest {
            period: p,
            notes: note.content.clone(),
        })?;

        let backend = backend_by_id(&backends, &note.root_id)
            .ok_or_else(|| anyhow::anyhow!("root `{}` disappeared mid-run", note.root_id))?;
        let name = naming::analysis_name(Granularity::Daily, p.key());
        backend.write_text(Area::Rollup(Granularity::Daily), &name, &render_output(&analysis))?;
        report.detail(format!("saved {name} to {}", note.root_id));
        return Ok(report);
    }

    let now = Local::now().date_naive();
    let periods = promote::find_periods_needing_rollup(&backends, granularity, now)?;
    let Some(p) = periods.into_iter().next() else {
        report.detail(format!(
            "no {} periods due for rollup",
            granularity.label().to_lowercase()
        ));
        return Ok(report);
    };
    println!("Analyzing {}: {}", granularity.label(), p.label());

    let children = promote::collect_children(&backends, p)?;
    let analysis = generator.generate(&GenerationRequest {
        period: p,
        notes: children,
    })?;
    let primary = primary_backend(&backends)?;
    let name = naming::analysis_name(granularity, p.key());
    primary.write_text(Area::Rollup(granularity), &name, &render_output(&analysis))?;
    report.detail(format!("saved {name} to {}", primary.id()));
    Ok(report)
}
