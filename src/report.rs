//! Report rendering and serialization for scan results

use crate::error::{Error, Result};
use crate::scanner::{ScanResult, ScanStatus};
use crate::vulndb::Severity;
use comfy_table::{
    Attribute, Cell, CellAlignment, Color, ContentArrangement, Table, presets::UTF8_FULL,
};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Report file format, chosen by output file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    /// Vulnerable target URLs only, one per line
    Text,
    /// One row per vulnerability match
    Csv,
    /// Full structured results for every target
    Json,
}

impl ReportFormat {
    /// Determine the format from a file path's extension
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_lowercase();
        match extension.as_str() {
            "txt" => Ok(Self::Text),
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            other => Err(Error::InvalidReportFormat(format!(".{other}"))),
        }
    }
}

/// Write a report to `path` in the format implied by its extension
pub fn write_report(path: &Path, results: &HashMap<String, ScanResult>) -> Result<()> {
    let format = ReportFormat::from_path(path)?;
    let file = File::create(path).map_err(Error::OutputFailed)?;
    let mut writer = BufWriter::new(file);
    match format {
        ReportFormat::Text => write_text(results, &mut writer),
        ReportFormat::Csv => write_csv(results, &mut writer),
        ReportFormat::Json => write_json(results, &mut writer),
    }
}

/// Write vulnerable target URLs, one per line
fn write_text<W: Write>(results: &HashMap<String, ScanResult>, writer: &mut W) -> Result<()> {
    for (target, result) in sorted(results) {
        if result.is_vulnerable() {
            writeln!(writer, "{}", target).map_err(Error::OutputFailed)?;
        }
    }
    Ok(())
}

/// Write one CSV row per vulnerability match
fn write_csv<W: Write>(results: &HashMap<String, ScanResult>, writer: &mut W) -> Result<()> {
    writeln!(
        writer,
        "target_url,plugin_slug,plugin_version,vulnerability_id,type,severity,description"
    )
    .map_err(Error::OutputFailed)?;

    for (target, result) in sorted(results) {
        for m in &result.vulnerable_plugins {
            writeln!(
                writer,
                "{},{},{},{},{},{},{}",
                csv_escape(target),
                csv_escape(&m.slug),
                csv_escape(&m.version),
                csv_escape(&m.vulnerability.id),
                csv_escape(&m.vulnerability.kind),
                m.vulnerability.severity,
                csv_escape(&m.vulnerability.description),
            )
            .map_err(Error::OutputFailed)?;
        }
    }
    Ok(())
}

/// Write the full result map as pretty JSON with stable key order
fn write_json<W: Write>(results: &HashMap<String, ScanResult>, writer: &mut W) -> Result<()> {
    let ordered: BTreeMap<&str, &ScanResult> = sorted(results).collect();
    serde_json::to_writer_pretty(&mut *writer, &ordered)?;
    writeln!(writer).map_err(Error::OutputFailed)?;
    Ok(())
}

/// Quote a CSV field when it contains a delimiter, quote, or newline
fn csv_escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn sorted(results: &HashMap<String, ScanResult>) -> impl Iterator<Item = (&str, &ScanResult)> {
    let mut entries: Vec<_> = results.iter().map(|(k, v)| (k.as_str(), v)).collect();
    entries.sort_by_key(|(target, _)| *target);
    entries.into_iter()
}

/// Render the end-of-run summary: status counts plus a table with one
/// row per vulnerability match
pub fn render_summary<W: Write>(results: &HashMap<String, ScanResult>, writer: &mut W) -> Result<()> {
    let scanned = count_status(results, ScanStatus::Scanned);
    let not_wordpress = count_status(results, ScanStatus::NotWordpress);
    let failed = count_status(results, ScanStatus::Failed);
    let vulnerable = results.values().filter(|r| r.is_vulnerable()).count();

    writeln!(
        writer,
        "{} targets: {} scanned, {} not WordPress, {} failed, {} vulnerable",
        results.len(),
        scanned,
        not_wordpress,
        failed,
        vulnerable
    )
    .map_err(Error::OutputFailed)?;

    if vulnerable == 0 {
        writeln!(writer, "No vulnerable plugins found.").map_err(Error::OutputFailed)?;
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Target").add_attribute(Attribute::Bold),
            Cell::new("Plugin").add_attribute(Attribute::Bold),
            Cell::new("Version").add_attribute(Attribute::Bold),
            Cell::new("Vulnerability").add_attribute(Attribute::Bold),
            Cell::new("Severity").add_attribute(Attribute::Bold),
            Cell::new("Type").add_attribute(Attribute::Bold),
        ]);

    for (target, result) in sorted(results) {
        for m in &result.vulnerable_plugins {
            table.add_row(vec![
                Cell::new(target),
                Cell::new(&m.slug),
                Cell::new(&m.version),
                Cell::new(&m.vulnerability.id),
                severity_cell(m.vulnerability.severity),
                Cell::new(&m.vulnerability.kind),
            ]);
        }
    }

    writeln!(writer, "{}", table).map_err(Error::OutputFailed)
}

fn severity_cell(severity: Severity) -> Cell {
    let color = match severity {
        Severity::Critical | Severity::High => Color::Red,
        Severity::Medium => Color::Yellow,
        Severity::Low | Severity::Informational | Severity::NotAvailable => Color::DarkGrey,
    };
    Cell::new(severity.to_string())
        .fg(color)
        .set_alignment(CellAlignment::Center)
}

fn count_status(results: &HashMap<String, ScanResult>, status: ScanStatus) -> usize {
    results.values().filter(|r| r.status == status).count()
}
