use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process::ExitCode;

use crate::commands;
use crate::triage::naming::{Granularity, KindPreference};

#[derive(Parser)]
#[command(
    name = "tasktriage",
    version,
    about = "Turn captured task notes into daily execution plans and periodic rollups"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full pipeline: daily analyses, then weekly/monthly/annual rollups
    Run {
        /// Which source kind to analyze when both exist for a timestamp
        #[arg(long, value_enum, default_value_t = KindPreference::Visual)]
        prefer: KindPreference,
        /// Report pending work without calling the model or writing files
        #[arg(long)]
        dry_run: bool,
    },
    /// Analyze a single pending item and stop
    Analyze {
        #[arg(long, value_enum, default_value_t = Granularity::Daily)]
        granularity: Granularity,
        #[arg(long, value_enum, default_value_t = KindPreference::Visual)]
        prefer: KindPreference,
    },
    /// Sync notes and analyses across roots; convert visual notes to text
    Sync,
    /// Show configured roots and pending work
    Status {
        #[arg(long)]
        json: bool,
        #[arg(long, value_enum, default_value_t = KindPreference::Visual)]
        prefer: KindPreference,
    },
}

pub fn run() -> Result<ExitCode> {
    let cli = Cli::parse();

    let (report, json) = match cli.command {
        Command::Run { prefer, dry_run } => (commands::run::run(prefer, dry_run)?, false),
        Command::Analyze {
            granularity,
            prefer,
        } => (commands::analyze::run(granularity, prefer)?, false),
        Command::Sync => (commands::sync::run()?, false),
        Command::Status { json, prefer } => (commands::status::run(prefer)?, json),
    };

    report.print(json)?;
    Ok(if report.ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
