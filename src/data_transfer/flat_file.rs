// =====================================================
// DELIMITED FILE CODEC
// Header/sample reads, full parses into frames, frame writes
// =====================================================

use crate::data_transfer::frame::TabularFrame;
use crate::error::TransferError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;

/// Rows read after the header when inferring column domains for discovery.
pub const SAMPLE_ROWS: usize = 100;

const UTF8_BOM: char = '\u{feff}';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QuoteMode {
    /// Quote only cells containing the delimiter, quotes or line breaks
    #[default]
    Minimal,
    All,
}

impl QuoteMode {
    fn style(self) -> csv::QuoteStyle {
        match self {
            QuoteMode::Minimal => csv::QuoteStyle::Necessary,
            QuoteMode::All => csv::QuoteStyle::Always,
        }
    }
}

/// Accepts a single ASCII character, or `\t` / `tab` for a tab.
pub fn parse_delimiter(raw: &str) -> Result<u8, TransferError> {
    match raw {
        "\\t" | "tab" | "TAB" | "\t" => return Ok(b'\t'),
        _ => {}
    }

    let mut chars = raw.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii() && c != '\n' && c != '\r' && c != '"' => Ok(c as u8),
        _ => Err(TransferError::Config(format!(
            "Invalid delimiter '{}': expected a single ASCII character.",
            raw
        ))),
    }
}

/// Positional name given to the n-th (zero-based) column of a headerless file.
pub fn positional_name(index: usize) -> String {
    format!("column_{}", index + 1)
}

/// Makes header names unique by suffixing repeats with `.1`, `.2`, …
/// Blank names fall back to their positional name.
pub fn dedupe_header(names: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut result = Vec::with_capacity(names.len());

    for (index, name) in names.into_iter().enumerate() {
        let base = if name.trim().is_empty() {
            positional_name(index)
        } else {
            name
        };

        let mut candidate = base.clone();
        let mut suffix = 1;
        while seen.contains(&candidate) {
            candidate = format!("{}.{}", base, suffix);
            suffix += 1;
        }
        seen.insert(candidate.clone());
        result.push(candidate);
    }

    result
}

fn open_reader(path: &Path, delimiter: u8) -> Result<csv::Reader<fs::File>, TransferError> {
    let file = fs::File::open(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => {
            TransferError::NotFound(format!("Source file not found: {}", path.display()))
        }
        _ => TransferError::Config(format!(
            "Failed to open file '{}': {}",
            path.display(),
            e
        )),
    })?;

    Ok(csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(file))
}

/// Raw records of a delimited file: the header row (if declared) and up to
/// `limit` data rows.
struct RawTable {
    header: Option<Vec<String>>,
    rows: Vec<Vec<String>>,
}

fn read_raw(
    path: &Path,
    delimiter: u8,
    has_header: bool,
    limit: Option<usize>,
) -> Result<RawTable, TransferError> {
    let mut reader = open_reader(path, delimiter)?;
    let mut header = None;
    let mut rows = Vec::new();

    for record in reader.records() {
        let record = record.map_err(|e| {
            TransferError::Config(format!(
                "Failed to parse file '{}': {}",
                path.display(),
                e
            ))
        })?;

        let mut cells = record.iter().map(str::to_string).collect::<Vec<String>>();

        if has_header && header.is_none() {
            if let Some(first) = cells.first_mut() {
                if first.starts_with(UTF8_BOM) {
                    *first = first.trim_start_matches(UTF8_BOM).to_string();
                }
            }
            header = Some(dedupe_header(
                cells.into_iter().map(|c| c.trim().to_string()).collect(),
            ));
            continue;
        }

        if limit.is_some_and(|limit| rows.len() >= limit) {
            break;
        }

        if let Some(expected) = header.as_ref().map(Vec::len) {
            if cells.len() > expected {
                let line = record.position().map(|p| p.line()).unwrap_or_default();
                return Err(TransferError::Config(format!(
                    "Line {} of '{}' has {} fields, expected {}.",
                    line,
                    path.display(),
                    cells.len(),
                    expected
                )));
            }
        }

        rows.push(cells);
    }

    Ok(RawTable { header, rows })
}

/// Header names only. An empty file yields no names.
pub fn read_header(path: &Path, delimiter: u8) -> Result<Vec<String>, TransferError> {
    let raw = read_raw(path, delimiter, true, Some(0))?;
    Ok(raw.header.unwrap_or_default())
}

/// Header plus at most `limit` data rows, as a typed frame.
pub fn sample_frame(path: &Path, delimiter: u8, limit: usize) -> Result<TabularFrame, TransferError> {
    let raw = read_raw(path, delimiter, true, Some(limit))?;
    Ok(match raw.header {
        Some(header) => TabularFrame::from_text_rows(header, &raw.rows, true),
        None => TabularFrame::empty(),
    })
}

/// Parses the whole file. Headerless files get positional column names sized
/// to the widest row.
pub fn read_frame(path: &Path, delimiter: u8, has_header: bool) -> Result<TabularFrame, TransferError> {
    let raw = read_raw(path, delimiter, has_header, None)?;

    if has_header {
        return Ok(match raw.header {
            Some(header) => TabularFrame::from_text_rows(header, &raw.rows, true),
            None => TabularFrame::empty(),
        });
    }

    let width = raw.rows.iter().map(Vec::len).max().unwrap_or(0);
    let names = (0..width).map(positional_name).collect::<Vec<String>>();
    Ok(TabularFrame::from_text_rows(names, &raw.rows, false))
}

fn write_error(path: &Path, e: impl std::fmt::Display) -> TransferError {
    TransferError::Write(format!("Error writing to file '{}': {}", path.display(), e))
}

/// Serializes a frame to `path`, creating parent directories as needed.
/// Returns the number of data rows written.
pub fn write_frame(
    frame: &TabularFrame,
    path: &Path,
    delimiter: u8,
    include_header: bool,
    quoting: QuoteMode,
) -> Result<usize, TransferError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| write_error(path, e))?;
        }
    }

    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .quote_style(quoting.style())
        .has_headers(false)
        .from_path(path)
        .map_err(|e| write_error(path, e))?;

    if include_header && frame.column_count() > 0 {
        writer
            .write_record(frame.column_names())
            .map_err(|e| write_error(path, e))?;
    }

    for row in 0..frame.row_count() {
        let cells = frame
            .row_values(row)
            .into_iter()
            .map(|cell| cell.to_text())
            .collect::<Vec<String>>();
        writer.write_record(&cells).map_err(|e| write_error(path, e))?;
    }

    writer.flush().map_err(|e| write_error(path, e))?;
    Ok(frame.row_count())
}

#[cfg(test)]
mod tests;
