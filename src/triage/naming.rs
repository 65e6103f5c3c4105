//! Filename codec for notes, sidecars, and analysis outputs.
//!
//! Every filename convention in the system lives here; no other module parses
//! or constructs a filename string directly. The conventions are interop
//! contracts with the capture device and must stay bit-exact:
//!
//! - raw note:     `YYYYMMDD_HHMMSS[_Page_N].{txt|png|pdf|...}`
//! - sidecar:      `YYYYMMDD_HHMMSS.raw_notes.txt` (pages share one sidecar)
//! - daily output: `DD_MM_YYYY.triaged.txt` under `daily/`
//! - weekly:       `week{N}_{MM}_{YYYY}.triaged.txt` under `weekly/`,
//!   keyed entirely off the week-start Monday so partial weeks collate
//! - monthly:      `MM_YYYY.triaged.txt`; annual: `YYYY.triaged.txt`

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use clap::ValueEnum;

use crate::triage::period::week_of_month;

pub const ANALYSIS_MARKER: &str = ".triaged.";
pub const ANALYSIS_SUFFIX: &str = ".triaged.txt";
pub const SIDECAR_SUFFIX: &str = ".raw_notes.txt";

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const PAGE_TOKEN: &str = "_Page_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, ValueEnum)]
pub enum Granularity {
    Daily,
    Weekly,
    Monthly,
    Annual,
}

impl Granularity {
    pub fn all() -> [Granularity; 4] {
        [Self::Daily, Self::Weekly, Self::Monthly, Self::Annual]
    }

    /// Sub-namespace that holds this granularity's analysis outputs.
    pub fn subdir(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Annual => "annual",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Daily => "Daily",
            Self::Weekly => "Weekly",
            Self::Monthly => "Monthly",
            Self::Annual => "Annual",
        }
    }

    /// The granularity whose analyses feed this one's rollups.
    pub fn child(self) -> Option<Granularity> {
        match self {
            Self::Daily => None,
            Self::Weekly => Some(Self::Daily),
            Self::Monthly => Some(Self::Weekly),
            Self::Annual => Some(Self::Monthly),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteKind {
    Text,
    Image,
    Pdf,
}

impl NoteKind {
    pub fn from_extension(ext: &str) -> Option<NoteKind> {
        match ext.to_ascii_lowercase().as_str() {
            "txt" => Some(Self::Text),
            "png" | "jpg" | "jpeg" | "gif" | "webp" => Some(Self::Image),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }

    pub fn is_visual(self) -> bool {
        !matches!(self, Self::Text)
    }

    pub fn mime_for_extension(ext: &str) -> &'static str {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => "image/jpeg",
            "gif" => "image/gif",
            "webp" => "image/webp",
            "pdf" => "application/pdf",
            _ => "image/png",
        }
    }
}

/// Which source kinds a reconciliation pass considers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KindPreference {
    Txt,
    Visual,
}

impl KindPreference {
    pub fn matches(self, kind: NoteKind) -> bool {
        match self {
            Self::Txt => kind == NoteKind::Text,
            Self::Visual => kind.is_visual(),
        }
    }
}

/// Point-in-time identity parsed from a source filename.
///
/// Two files with equal timestamps are the same logical note regardless of
/// page index or which root they were found under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteIdentity {
    pub timestamp: NaiveDateTime,
    pub page: Option<u32>,
}

impl NoteIdentity {
    /// Canonical `YYYYMMDD_HHMMSS` key, used for cross-root deduplication.
    pub fn key(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }

    pub fn date(&self) -> NaiveDate {
        self.timestamp.date()
    }
}

fn split_extension(filename: &str) -> (&str, &str) {
    match filename.rsplit_once('.') {
        Some((stem, ext)) => (stem, ext),
        None => (filename, ""),
    }
}

pub fn kind_of(filename: &str) -> Option<NoteKind> {
    let (_, ext) = split_extension(filename);
    NoteKind::from_extension(ext)
}

/// Parse `{timestamp, page}` out of a source filename, or `None` when the
/// name does not carry a fixed-width timestamp body. Unparseable names are
/// not source items and are silently ignored by callers.
pub fn parse_identity(filename: &str) -> Option<NoteIdentity> {
    // Analyses and sidecars live in different namespaces but are filtered
    // defensively here: their dotted stems never match the timestamp width.
    if filename.contains(ANALYSIS_MARKER) {
        return None;
    }

    let (stem, _ext) = split_extension(filename);

    let (body, page) = match stem.split_once(PAGE_TOKEN) {
        Some((body, page_raw)) => (body, page_raw.parse::<u32>().ok()),
        None => (stem, None),
    };

    if body.len() != 15 || body.as_bytes()[8] != b'_' {
        return None;
    }

    let timestamp = NaiveDateTime::parse_from_str(body, TIMESTAMP_FORMAT).ok()?;
    Some(NoteIdentity { timestamp, page })
}

/// Sidecar filename for a note timestamp. No page suffix: all pages of one
/// logical note share a single converted-text file.
pub fn sidecar_name(identity: &NoteIdentity) -> String {
    format!("{}{}", identity.key(), SIDECAR_SUFFIX)
}

pub fn is_sidecar(filename: &str) -> bool {
    filename.ends_with(SIDECAR_SUFFIX)
}

pub fn is_analysis(filename: &str) -> bool {
    filename.ends_with(ANALYSIS_SUFFIX)
}

/// Canonical analysis output name for a period key.
///
/// Pure in `(granularity, key)`: the same period always maps to the same
/// filename regardless of which run produced it, which is what makes
/// overwrite-in-place and existence checks possible. The weekly key must be
/// the week-start Monday, never an individual member's date.
pub fn analysis_name(granularity: Granularity, key: NaiveDate) -> String {
    match granularity {
        Granularity::Daily => format!("{}{}", key.format("%d_%m_%Y"), ANALYSIS_SUFFIX),
        Granularity::Weekly => format!(
            "week{}_{}{}",
            week_of_month(key),
            key.format("%m_%Y"),
            ANALYSIS_SUFFIX
        ),
        Granularity::Monthly => format!("{}{}", key.format("%m_%Y"), ANALYSIS_SUFFIX),
        Granularity::Annual => format!("{}{}", key.format("%Y"), ANALYSIS_SUFFIX),
    }
}

fn parse_day_month_year(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%d_%m_%Y").ok()
}

fn parse_month_year(s: &str) -> Option<NaiveDate> {
    let (month_raw, year_raw) = s.split_once('_')?;
    let month: u32 = month_raw.parse().ok()?;
    let year: i32 = year_raw.parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, 1)
}

/// Recover a date inside the analysis's period from its filename. Used by the
/// promotion scheduler to group child analyses; names that don't match the
/// granularity's convention return `None` and are skipped.
pub fn parse_analysis_date(granularity: Granularity, filename: &str) -> Option<NaiveDate> {
    let body = filename.strip_suffix(ANALYSIS_SUFFIX)?;
    match granularity {
        Granularity::Daily => parse_day_month_year(body),
        Granularity::Weekly => {
            let rest = body.strip_prefix("week")?;
            let (week_raw, month_year) = rest.split_once('_')?;
            let week: u32 = week_raw.parse().ok()?;
            if !(1..=4).contains(&week) {
                return None;
            }
            let first = parse_month_year(month_year)?;
            first.with_day((week - 1) * 7 + 1)
        }
        Granularity::Monthly => parse_month_year(body),
        Granularity::Annual => {
            let year: i32 = body.parse().ok()?;
            NaiveDate::from_ymd_opt(year, 1, 1)
        }
    }
}
