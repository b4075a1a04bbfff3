//! Output formatting for CLI

use reel_core::{Manifest, TerminationReport};
use tabled::settings::Style;
use tabled::{Table, Tabled};

/// Output format options
pub enum OutputFormat {
    Text,
    Json,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            _ => OutputFormat::Text,
        }
    }
}

#[derive(Tabled)]
struct QualityRow {
    id: u64,
    resolution: String,
    #[tabled(rename = "bitrate (kbps)")]
    bitrate: u32,
    #[tabled(rename = "size (MB)")]
    size_mb: u64,
    url: String,
}

#[derive(Tabled)]
struct TrackRow {
    kind: &'static str,
    id: u64,
    language: String,
    name: String,
    default: &'static str,
}

#[derive(Tabled)]
struct FieldRow {
    field: &'static str,
    value: String,
}

impl FieldRow {
    fn new(field: &'static str, value: impl ToString) -> Self {
        Self {
            field,
            value: value.to_string(),
        }
    }
}

fn flag(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        ""
    }
}

pub fn format_manifest(manifest: &Manifest, format: &str) -> anyhow::Result<String> {
    if let OutputFormat::Json = OutputFormat::from(format) {
        return Ok(serde_json::to_string_pretty(manifest)?);
    }

    let qualities = manifest.qualities.iter().map(|q| QualityRow {
        id: q.id,
        resolution: q.resolution.clone(),
        bitrate: q.bitrate_kbps,
        size_mb: q.file_size_bytes / 1_000_000,
        url: q.url.to_string(),
    });

    let tracks = manifest
        .subtitles
        .iter()
        .map(|s| TrackRow {
            kind: "subtitle",
            id: s.id,
            language: s.language.clone(),
            name: s.language_display.clone(),
            default: flag(s.is_default),
        })
        .chain(manifest.audio_tracks.iter().map(|a| TrackRow {
            kind: "audio",
            id: a.id,
            language: a.language.clone(),
            name: a.language_display.clone(),
            default: flag(a.is_default),
        }));

    Ok(format!(
        "{} (session {}, {}s)\n\n{}\n\n{}",
        manifest.title,
        manifest.session_id,
        manifest.duration_seconds,
        Table::new(qualities).with(Style::rounded()).to_string(),
        Table::new(tracks).with(Style::rounded()).to_string(),
    ))
}

pub fn format_report(report: &TerminationReport, format: &str) -> anyhow::Result<String> {
    if let OutputFormat::Json = OutputFormat::from(format) {
        return Ok(serde_json::to_string_pretty(report)?);
    }

    let mut rows = vec![
        FieldRow::new(
            "outcome",
            report.outcome.map(|o| o.to_string()).unwrap_or_default(),
        ),
        FieldRow::new("progress flushed", report.progress_flushed),
        FieldRow::new("end report sent", report.end_report_sent),
        FieldRow::new(
            "errors reported",
            format!("{} ({} failed)", report.errors_reported, report.errors_failed),
        ),
    ];
    if let Some(summary) = &report.summary {
        rows.push(FieldRow::new("session", summary.id));
        rows.push(FieldRow::new("quality", &summary.quality));
        rows.push(FieldRow::new("buffering count", summary.buffering_count));
        rows.push(FieldRow::new("buffering (ms)", summary.buffering_duration));
    }

    Ok(Table::new(rows).with(Style::rounded()).to_string())
}
