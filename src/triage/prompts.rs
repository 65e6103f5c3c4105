//! Prompt templates for plan generation and handwriting extraction.
//!
//! Templates use plain `{var}` substitution; the period supplies the date
//! variables and the caller supplies the notes text separately.

use crate::triage::naming::Granularity;
use crate::triage::period::{self, Period};

const DAILY_SYSTEM: &str = "\
You are an expert Executive Assistant and Project Manager with deep expertise \
in GTD, daily execution planning, and realistic workload management.

Current Date: {current_date}

Transform the provided categorized to-do list into a single-day execution plan \
that is concrete, realistic, and immediately actionable, keeping the day within \
6-7 hours of focused work.

Input markers: a checkmark means completed, X means removed, * means urgent. \
Assume unmarked tasks are intended for today.

Produce a numbered list under the header \
\"# Daily Execution Order \u{2014} {current_date}\", each task carrying an \
energy level, a time estimate, and 2-3 concrete sub-steps. Split oversized \
tasks into [Today Portion] and [Later Portion]; only today portions count \
toward the workload. Order strictly: urgent work, urgent home, other work, \
other home. After the execution order include Deferred Tasks, a Completed \
Tasks Review, and a 3-4 sentence Critical Assessment of the original list.";

const WEEKLY_SYSTEM: &str = "\
You are an expert Productivity Analyst and GTD practitioner specializing in \
post-execution analysis and behavior-driven prioritization.

Analysis Period: {week_start} to {week_end}

Analyze the daily execution plans from the past week. Priority is defined by \
repeated behavior, not by labels: a task marked urgent but repeatedly deferred \
was not actually a priority.

Structure the output with these exact headers:
# Weekly Execution Analysis: [Week Date Range]
## A. Key Behavioral Findings
## B. Mis-Prioritization Insights
## C. Corrected Priority Model
## D. Next-Week Planning Strategy
## E. System Improvement Recommendations

Be pattern-driven and direct, cite specific task names and dates, and ground \
every recommendation in this week's actual behavior.";

const MONTHLY_SYSTEM: &str = "\
You are an expert Productivity Analyst reviewing a full month of weekly \
execution analyses.

Analysis Period: {month_start} to {month_end}

Synthesize the weekly analyses into a monthly review: durable behavioral \
trends across weeks, recurring mis-prioritizations the weekly corrections did \
not fix, progress on keystone work, and capacity drift. Close with a corrected \
monthly priority model and 3-5 structural changes for the coming month. Cite \
evidence from specific weeks.";

const ANNUAL_SYSTEM: &str = "\
You are an expert Productivity Analyst writing the year-end review for {year}.

Synthesize the monthly reviews into an annual retrospective: the year's major \
accomplishments, the behavioral patterns that persisted across months, which \
system changes stuck and which decayed, and where stated priorities diverged \
from actual execution. Close with a short list of themes for next year, each \
grounded in evidence from specific months.";

const HUMAN_DAILY: &str =
    "Analyze the following daily task notes and create an execution plan:\n\n{task_notes}";
const HUMAN_WEEKLY: &str =
    "Analyze the following daily execution plans from the past week:\n\n{task_notes}";
const HUMAN_MONTHLY: &str =
    "Analyze the following weekly analyses from the past month:\n\n{task_notes}";
const HUMAN_ANNUAL: &str =
    "Analyze the following monthly reviews from the past year:\n\n{task_notes}";

/// Transcription prompt for handwritten note images and PDFs. Structure and
/// task markers must survive verbatim; the extractor never interprets.
pub const IMAGE_EXTRACTION_PROMPT: &str = "\
You are an expert at reading handwritten notes from note-taking devices.

Extract all text from the provided handwritten task notes, preserving the \
exact structure: category headers on their own line, one task per line \
indented below its category, and all task markers (checkmark, X, *) in their \
original positions. Do not add, remove, or interpret content. If text is \
unclear, make your best attempt without indicating uncertainty.";

fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (name, value) in vars {
        out = out.replace(&format!("{{{name}}}"), value);
    }
    out
}

/// System prompt for the period, with its date variables substituted.
pub fn system_prompt(period: &Period) -> String {
    match period.granularity {
        Granularity::Daily => render(
            DAILY_SYSTEM,
            &[("current_date", &period::long_date(period.start))],
        ),
        Granularity::Weekly => render(
            WEEKLY_SYSTEM,
            &[
                ("week_start", &period::long_date(period.start)),
                ("week_end", &period::long_date(period.end)),
            ],
        ),
        Granularity::Monthly => render(
            MONTHLY_SYSTEM,
            &[
                ("month_start", &period.start.format("%B %d, %Y").to_string()),
                ("month_end", &period.end.format("%B %d, %Y").to_string()),
            ],
        ),
        Granularity::Annual => render(
            ANNUAL_SYSTEM,
            &[("year", &period.start.format("%Y").to_string())],
        ),
    }
}

/// User-turn prompt wrapping the notes text.
pub fn user_prompt(granularity: Granularity, notes: &str) -> String {
    let template = match granularity {
        Granularity::Daily => HUMAN_DAILY,
        Granularity::Weekly => HUMAN_WEEKLY,
        Granularity::Monthly => HUMAN_MONTHLY,
        Granularity::Annual => HUMAN_ANNUAL,
    };
    render(template, &[("task_notes", notes)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::triage::period::bounds_of;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn daily_prompt_carries_the_long_date() {
        let p = bounds_of(Granularity::Daily, date(2025, 12, 31));
        let prompt = system_prompt(&p);
        assert!(prompt.contains("Current Date: Wednesday, December 31, 2025"));
        assert!(!prompt.contains("{current_date}"));
    }

    #[test]
    fn weekly_prompt_spans_monday_to_friday() {
        let p = bounds_of(Granularity::Weekly, date(2025, 12, 3));
        let prompt = system_prompt(&p);
        assert!(prompt.contains("Monday, December 01, 2025 to Friday, December 05, 2025"));
    }

    #[test]
    fn monthly_and_annual_variables_substitute() {
        let monthly = system_prompt(&bounds_of(Granularity::Monthly, date(2024, 2, 10)));
        assert!(monthly.contains("February 01, 2024 to February 29, 2024"));

        let annual = system_prompt(&bounds_of(Granularity::Annual, date(2025, 6, 1)));
        assert!(annual.contains("year-end review for 2025"));
        assert!(!annual.contains("{year}"));
    }

    #[test]
    fn user_prompt_embeds_the_notes() {
        let prompt = user_prompt(Granularity::Daily, "Work\n Fix bug *\n");
        assert!(prompt.ends_with("Work\n Fix bug *\n"));
    }
}
