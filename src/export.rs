//! Report writers: CSV and JSON result reports, and the unresolved-entry
//! list in both plain text and CSV.
//!
//! Writers only read results. A failed write leaves the in-memory results
//! untouched and reports an [`ExportError`].

use crate::batch::playlist_lines;
use crate::error::ExportError;
use crate::models::{FieldScores, MatchCandidate, MatchResult, MatchStatus};
use crate::ranking::Selection;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

pub const CSV_HEADERS: [&str; 15] = [
    "status",
    "selected",
    "line",
    "original",
    "artist",
    "title",
    "match_count",
    "filename",
    "format",
    "duration",
    "bitrate",
    "score",
    "bonus",
    "strategy",
    "path",
];

pub const UNRESOLVED_CSV_HEADERS: [&str; 5] = ["line", "original", "artist", "title", "status"];

fn create_parent(path: &Path) -> Result<(), ExportError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|e| ExportError::io(parent, e))
        }
        _ => Ok(()),
    }
}

fn csv_writer(path: &Path) -> Result<csv::Writer<File>, ExportError> {
    create_parent(path)?;
    let file = File::create(path).map_err(|e| ExportError::io(path, e))?;
    Ok(csv::WriterBuilder::new()
        .has_headers(true)
        .quote_style(csv::QuoteStyle::Necessary)
        .from_writer(file))
}

fn fmt_opt<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn selected_index(selection: Option<&Option<Selection>>) -> Option<usize> {
    selection.and_then(|s| s.as_ref()).map(|s| s.index)
}

// ============================================================================
// Structured report
// ============================================================================

#[derive(Clone, Debug, Serialize)]
pub struct ReportCandidate {
    pub path: String,
    pub filename: String,
    pub artist: Option<String>,
    pub title: Option<String>,
    pub format: Option<String>,
    pub duration: Option<f64>,
    pub bitrate: Option<u32>,
    pub score: f64,
    pub bonus: Option<f64>,
    pub ranked_score: f64,
    pub strategy: String,
    pub field_scores: FieldScores,
}

impl From<&MatchCandidate> for ReportCandidate {
    fn from(c: &MatchCandidate) -> Self {
        Self {
            path: c.record.path.clone(),
            filename: c.record.filename.clone(),
            artist: c.record.artist.clone(),
            title: c.record.title.clone(),
            format: c.record.format_lower(),
            duration: c.record.duration,
            bitrate: c.record.bitrate,
            score: c.score,
            bonus: c.bonus.as_ref().map(|b| b.total),
            ranked_score: c.ranked_score(),
            strategy: c.strategy.label(),
            field_scores: c.scores,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ReportEntry {
    pub line_number: usize,
    pub original: String,
    pub artist: Option<String>,
    pub co_artists: Vec<String>,
    pub title: String,
    pub remix: Option<String>,
    pub status: MatchStatus,
    pub match_count: usize,
    pub variant: Option<String>,
    pub selected_path: Option<String>,
    pub candidates: Vec<ReportCandidate>,
}

/// Flatten results (and optional selections, index-aligned) into report entries.
pub fn report_entries(results: &[MatchResult], selections: &[Option<Selection>]) -> Vec<ReportEntry> {
    results
        .iter()
        .enumerate()
        .map(|(i, r)| ReportEntry {
            line_number: r.entry.line_number,
            original: r.entry.original.clone(),
            artist: r.entry.artist.clone(),
            co_artists: r.entry.co_artists.clone(),
            title: r.entry.title.clone(),
            remix: r.entry.remix.clone(),
            status: r.status(),
            match_count: r.candidates.len(),
            variant: r.variant.map(|v| v.as_str().to_string()),
            selected_path: selections
                .get(i)
                .and_then(|s| s.as_ref())
                .map(|s| s.record.path.clone()),
            candidates: r.candidates.iter().map(ReportCandidate::from).collect(),
        })
        .collect()
}

pub fn write_json_report(
    path: &Path,
    results: &[MatchResult],
    selections: &[Option<Selection>],
) -> Result<(), ExportError> {
    create_parent(path)?;
    let file = File::create(path).map_err(|e| ExportError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &report_entries(results, selections))?;
    writer.flush().map_err(|e| ExportError::io(path, e))?;
    info!("Wrote JSON report for {} entries to {}", results.len(), path.display());
    Ok(())
}

// ============================================================================
// CSV report
// ============================================================================

/// One row per candidate; entries without candidates get one `Missing` row.
/// Returns the number of data rows written.
pub fn write_csv_report(
    path: &Path,
    results: &[MatchResult],
    selections: &[Option<Selection>],
) -> Result<usize, ExportError> {
    let mut writer = csv_writer(path)?;
    writer.write_record(CSV_HEADERS)?;

    let mut rows = 0;
    for (i, result) in results.iter().enumerate() {
        let entry = &result.entry;
        let line = entry.line_number.to_string();
        let artist = entry.artist.clone().unwrap_or_default();
        let status = result.status().as_str();

        if result.candidates.is_empty() {
            writer.write_record([
                status,
                "",
                line.as_str(),
                entry.original.as_str(),
                artist.as_str(),
                entry.title.as_str(),
                "0",
                "",
                "",
                "",
                "",
                "",
                "",
                "",
                "",
            ])?;
            rows += 1;
            continue;
        }

        let selected = selected_index(selections.get(i));
        let count = result.candidates.len().to_string();
        for (idx, c) in result.candidates.iter().enumerate() {
            let record = &c.record;
            let fields: [String; 15] = [
                status.to_string(),
                if selected == Some(idx) { "yes" } else { "" }.to_string(),
                line.clone(),
                entry.original.clone(),
                artist.clone(),
                entry.title.clone(),
                count.clone(),
                record.filename.clone(),
                fmt_opt(record.format_lower()),
                fmt_opt(record.duration.map(|d| format!("{:.1}", d))),
                fmt_opt(record.bitrate),
                format!("{:.1}", c.score),
                fmt_opt(c.bonus.as_ref().map(|b| format!("{:.0}", b.total))),
                c.strategy.label(),
                record.path.clone(),
            ];
            writer.write_record(&fields)?;
            rows += 1;
        }
    }

    writer.flush().map_err(|e| ExportError::io(path, e))?;
    info!("Wrote {} CSV rows to {}", rows, path.display());
    Ok(rows)
}

// ============================================================================
// Unresolved entries
// ============================================================================

/// Write unresolved entries as a playlist: `#` header lines, then each
/// original line. Reading the file back as a playlist yields the same lines.
pub fn write_unresolved_text(path: &Path, results: &[MatchResult]) -> Result<usize, ExportError> {
    let unresolved: Vec<&MatchResult> = results.iter().filter(|r| !r.is_resolved()).collect();

    create_parent(path)?;
    let file = File::create(path).map_err(|e| ExportError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    let write = |w: &mut BufWriter<File>| -> std::io::Result<()> {
        writeln!(w, "# Unresolved playlist entries")?;
        writeln!(w, "# {} of {} entries had no match", unresolved.len(), results.len())?;
        writeln!(w, "#")?;
        for r in &unresolved {
            writeln!(w, "{}", r.entry.original)?;
        }
        w.flush()
    };
    write(&mut writer).map_err(|e| ExportError::io(path, e))?;

    info!("Wrote {} unresolved entries to {}", unresolved.len(), path.display());
    Ok(unresolved.len())
}

pub fn write_unresolved_csv(path: &Path, results: &[MatchResult]) -> Result<usize, ExportError> {
    let mut writer = csv_writer(path)?;
    writer.write_record(UNRESOLVED_CSV_HEADERS)?;
    let mut rows = 0;
    for r in results.iter().filter(|r| !r.is_resolved()) {
        let line = r.entry.line_number.to_string();
        writer.write_record([
            line.as_str(),
            r.entry.original.as_str(),
            r.entry.artist.as_deref().unwrap_or(""),
            r.entry.title.as_str(),
            MatchStatus::Missing.as_str(),
        ])?;
        rows += 1;
    }
    writer.flush().map_err(|e| ExportError::io(path, e))?;
    Ok(rows)
}

/// Lines of a previously written unresolved report.
pub fn read_unresolved(path: &Path) -> Result<Vec<String>, ExportError> {
    let text = fs::read_to_string(path).map_err(|e| ExportError::io(path, e))?;
    Ok(playlist_lines(&text).into_iter().map(|(_, line)| line).collect())
}
