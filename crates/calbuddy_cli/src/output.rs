//! Output formatting for CLI commands.
//!
//! Every listing renders as an aligned text table, a JSON array of objects or
//! CSV, from the same header/cell view.

use calbuddy_core::model::event::{format_event_time, format_record_time};
use calbuddy_core::{ChangeRecord, Event, EventRow, SyncReport};
use clap::ValueEnum;
use serde_json::{Map, Value};
use std::io::{self, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

/// A row that can be rendered in every output format.
pub trait Tabular {
    const HEADERS: &'static [&'static str];
    fn cells(&self) -> Vec<Option<String>>;
}

impl Tabular for EventRow {
    const HEADERS: &'static [&'static str] = &["title", "start_time", "end_time", "meeting_link"];

    fn cells(&self) -> Vec<Option<String>> {
        vec![
            Some(self.title.clone()),
            self.start_time.clone(),
            self.end_time.clone(),
            self.meeting_link.clone(),
        ]
    }
}

impl Tabular for ChangeRecord {
    const HEADERS: &'static [&'static str] = &[
        "ts",
        "action",
        "identity",
        "title",
        "start_time",
        "end_time",
        "meeting_link",
    ];

    fn cells(&self) -> Vec<Option<String>> {
        vec![
            Some(format_record_time(self.recorded_at)),
            Some(self.action.as_db_str().to_string()),
            Some(self.identity.to_string()),
            Some(self.title.clone()),
            self.start.map(format_event_time),
            self.end.map(format_event_time),
            self.meeting_link.clone(),
        ]
    }
}

/// Raw stored event, retired rows included.
pub struct StoredEventRow<'a>(pub &'a Event);

impl Tabular for StoredEventRow<'_> {
    const HEADERS: &'static [&'static str] = &[
        "identity",
        "title",
        "start_time",
        "end_time",
        "first_seen",
        "last_seen",
        "meeting_link",
        "retired",
    ];

    fn cells(&self) -> Vec<Option<String>> {
        let event = self.0;
        vec![
            Some(event.identity.to_string()),
            Some(event.title.clone()),
            event.start.map(format_event_time),
            event.end.map(format_event_time),
            Some(format_record_time(event.first_seen)),
            Some(format_record_time(event.last_seen)),
            event.meeting_link.clone(),
            Some(u8::from(event.retired).to_string()),
        ]
    }
}

/// Writes `rows` to stdout in `format`.
pub fn print_rows<T: Tabular>(rows: &[T], format: OutputFormat) -> io::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    write_rows(&mut out, rows, format)?;
    out.flush()
}

pub fn write_rows<T: Tabular, W: Write>(
    out: &mut W,
    rows: &[T],
    format: OutputFormat,
) -> io::Result<()> {
    let cells: Vec<Vec<Option<String>>> = rows.iter().map(Tabular::cells).collect();
    match format {
        OutputFormat::Table => writeln!(out, "{}", render_table(T::HEADERS, &cells)),
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&to_json(T::HEADERS, &cells))?;
            writeln!(out, "{json}")
        }
        OutputFormat::Csv => write!(out, "{}", render_csv(T::HEADERS, &cells)),
    }
}

/// Prints the outcome of a sync pass.
pub fn print_sync_summary(report: &SyncReport, lookback_days: u32, store: &str) {
    let lookback = if lookback_days > 0 {
        format!(" (lookback: {lookback_days} days)")
    } else {
        String::new()
    };

    if report.dry_run {
        println!(
            "DRY RUN: Would have processed {} events{lookback}. DB at: {store}",
            report.processed
        );
    } else {
        println!(
            "Processed {} events{lookback}. DB stored at: {store}",
            report.processed
        );
    }
    println!(
        "  added: {}  updated: {}  superseded: {}  removed: {}  unchanged: {}",
        report.added,
        report.added_as_update,
        report.superseded,
        report.removed,
        report.refreshed
    );
    if report.ignored_retired > 0 {
        println!(
            "  {} listed events match retired entries and stay retired",
            report.ignored_retired
        );
    }
}

fn render_table(headers: &[&str], rows: &[Vec<Option<String>>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            let len = cell.as_deref().unwrap_or("").chars().count();
            *width = (*width).max(len);
        }
    }

    let line = |cells: Vec<&str>| -> String {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, &width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut lines = Vec::with_capacity(rows.len() + 2);
    lines.push(line(headers.to_vec()));
    lines.push(
        widths
            .iter()
            .map(|width| "-".repeat(*width))
            .collect::<Vec<_>>()
            .join("  "),
    );
    for row in rows {
        lines.push(line(row.iter().map(|c| c.as_deref().unwrap_or("")).collect()));
    }
    lines.join("\n")
}

fn to_json(headers: &[&str], rows: &[Vec<Option<String>>]) -> Value {
    Value::Array(
        rows.iter()
            .map(|row| {
                let object: Map<String, Value> = headers
                    .iter()
                    .zip(row)
                    .map(|(header, cell)| {
                        let value = cell.clone().map(Value::String).unwrap_or(Value::Null);
                        (header.to_string(), value)
                    })
                    .collect();
                Value::Object(object)
            })
            .collect(),
    )
}

fn render_csv(headers: &[&str], rows: &[Vec<Option<String>>]) -> String {
    let mut out = String::new();
    out.push_str(&csv_line(headers.iter().copied()));
    for row in rows {
        out.push_str(&csv_line(row.iter().map(|c| c.as_deref().unwrap_or(""))));
    }
    out
}

fn csv_line<'a>(fields: impl Iterator<Item = &'a str>) -> String {
    let mut line = fields.map(csv_field).collect::<Vec<_>>().join(",");
    line.push_str("\r\n");
    line
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::{csv_field, render_csv, render_table, to_json};

    fn rows() -> Vec<Vec<Option<String>>> {
        vec![
            vec![Some("Standup".to_string()), None],
            vec![Some("Planning, Q4".to_string()), Some("https://zoom.us/j/1".to_string())],
        ]
    }

    #[test]
    fn table_pads_columns_to_widest_cell() {
        let table = render_table(&["title", "link"], &rows());
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "title         link");
        assert_eq!(lines[1], "------------  -------------------");
        assert_eq!(lines[2], "Standup");
        assert_eq!(lines[3], "Planning, Q4  https://zoom.us/j/1");
    }

    #[test]
    fn csv_quotes_only_when_needed() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");

        let csv = render_csv(&["title", "link"], &rows());
        assert_eq!(
            csv,
            "title,link\r\nStandup,\r\n\"Planning, Q4\",https://zoom.us/j/1\r\n"
        );
    }

    #[test]
    fn json_uses_headers_as_keys_and_null_for_missing() {
        let json = to_json(&["title", "link"], &rows());
        assert_eq!(json[0]["title"], "Standup");
        assert!(json[0]["link"].is_null());
        assert_eq!(json[1]["link"], "https://zoom.us/j/1");
    }
}
