use crate::data_transfer::mapper::ColumnDomain;
use crate::db_types::QueryResult;
use crate::error::TransferError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Timelike};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Cell texts read as missing values.
const NULL_MARKERS: [&str; 7] = ["", "NA", "N/A", "NaN", "nan", "NULL", "null"];

const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Timestamp(NaiveDateTime),
    Text(String),
}

impl CellValue {
    /// Text written into delimited output.
    pub fn to_text(&self) -> String {
        match self {
            CellValue::Null => String::new(),
            CellValue::Integer(n) => n.to_string(),
            // Debug keeps the trailing `.0` on whole floats
            CellValue::Float(n) => format!("{:?}", n),
            CellValue::Boolean(b) => b.to_string(),
            CellValue::Timestamp(ts) => format_timestamp(ts),
            CellValue::Text(s) => s.clone(),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            CellValue::Null => Value::Null,
            CellValue::Integer(n) => Value::from(*n),
            CellValue::Float(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            CellValue::Boolean(b) => Value::Bool(*b),
            CellValue::Timestamp(ts) => Value::String(format_timestamp(ts)),
            CellValue::Text(s) => Value::String(s.clone()),
        }
    }

    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => CellValue::Null,
            Value::Bool(b) => CellValue::Boolean(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    CellValue::Integer(i)
                } else if n.is_u64() {
                    CellValue::Text(n.to_string())
                } else {
                    n.as_f64()
                        .map(CellValue::Float)
                        .unwrap_or_else(|| CellValue::Text(n.to_string()))
                }
            }
            Value::String(s) => CellValue::Text(s.clone()),
            other => CellValue::Text(other.to_string()),
        }
    }
}

fn format_timestamp(ts: &NaiveDateTime) -> String {
    if ts.nanosecond() == 0 {
        ts.format("%Y-%m-%d %H:%M:%S").to_string()
    } else {
        ts.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
    }
}

pub fn is_null_marker(raw: &str) -> bool {
    NULL_MARKERS.contains(&raw.trim())
}

pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    for format in TIMESTAMP_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(ts);
        }
    }
    // Offsets are folded into UTC; the naive result is read in the server's timezone
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.naive_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

fn parse_bool(raw: &str) -> Option<bool> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("true") {
        Some(true)
    } else if raw.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// Domain of a single non-null cell.
pub fn classify_cell(raw: &str) -> ColumnDomain {
    let trimmed = raw.trim();
    if trimmed.parse::<i64>().is_ok() {
        ColumnDomain::Integer
    } else if trimmed.parse::<f64>().is_ok() {
        ColumnDomain::Float
    } else if parse_bool(trimmed).is_some() {
        ColumnDomain::Boolean
    } else if parse_timestamp(trimmed).is_some() {
        ColumnDomain::Timestamp
    } else {
        ColumnDomain::Text
    }
}

/// Narrowest domain that holds every non-null cell; all-null columns are text.
pub fn infer_domain<'a>(cells: impl IntoIterator<Item = &'a str>) -> ColumnDomain {
    let mut inferred: Option<ColumnDomain> = None;

    for raw in cells {
        if is_null_marker(raw) {
            continue;
        }
        let kind = classify_cell(raw);
        let next = match (inferred, kind) {
            (None, kind) => kind,
            (Some(ColumnDomain::Integer), ColumnDomain::Float)
            | (Some(ColumnDomain::Float), ColumnDomain::Integer) => ColumnDomain::Float,
            (Some(current), kind) if current == kind => current,
            _ => ColumnDomain::Text,
        };
        if next == ColumnDomain::Text {
            return ColumnDomain::Text;
        }
        inferred = Some(next);
    }

    inferred.unwrap_or(ColumnDomain::Text)
}

pub fn parse_cell(raw: &str, domain: ColumnDomain) -> CellValue {
    if is_null_marker(raw) {
        return CellValue::Null;
    }
    let trimmed = raw.trim();
    let parsed = match domain {
        ColumnDomain::Integer => trimmed.parse::<i64>().ok().map(CellValue::Integer),
        ColumnDomain::Float => trimmed.parse::<f64>().ok().map(CellValue::Float),
        ColumnDomain::Boolean => parse_bool(trimmed).map(CellValue::Boolean),
        ColumnDomain::Timestamp => parse_timestamp(trimmed).map(CellValue::Timestamp),
        ColumnDomain::Text | ColumnDomain::Other => None,
    };
    parsed.unwrap_or_else(|| CellValue::Text(raw.to_string()))
}

fn cell_at(row: &[String], index: usize) -> &str {
    row.get(index).map(String::as_str).unwrap_or("")
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameColumn {
    pub name: String,
    pub domain: ColumnDomain,
    pub values: Vec<CellValue>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSchema {
    pub columns: Vec<(String, ColumnDomain)>,
    /// False when names were assigned positionally for a headerless file.
    pub header_derived: bool,
}

/// Column-oriented, fully materialized table. All columns share one row
/// count.
#[derive(Debug, Clone, PartialEq)]
pub struct TabularFrame {
    columns: Vec<FrameColumn>,
    header_derived: bool,
}

impl TabularFrame {
    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
            header_derived: false,
        }
    }

    /// Builds a frame from raw delimited cells, inferring each column's
    /// domain over every row. Short rows are padded with nulls.
    pub fn from_text_rows(names: Vec<String>, rows: &[Vec<String>], header_derived: bool) -> Self {
        let columns = names
            .into_iter()
            .enumerate()
            .map(|(index, name)| {
                let domain = infer_domain(rows.iter().map(|row| cell_at(row, index)));
                let values = rows
                    .iter()
                    .map(|row| parse_cell(cell_at(row, index), domain))
                    .collect::<Vec<CellValue>>();
                FrameColumn {
                    name,
                    domain,
                    values,
                }
            })
            .collect::<Vec<FrameColumn>>();

        Self {
            columns,
            header_derived,
        }
    }

    pub fn from_query_result(result: QueryResult) -> Self {
        let QueryResult {
            columns,
            column_types,
            rows,
        } = result;

        let mut frame_columns = columns
            .into_iter()
            .enumerate()
            .map(|(index, name)| FrameColumn {
                name,
                domain: column_types
                    .get(index)
                    .map(|t| ColumnDomain::from_native_type(t))
                    .unwrap_or_default(),
                values: Vec::with_capacity(rows.len()),
            })
            .collect::<Vec<FrameColumn>>();

        for row in &rows {
            for (index, column) in frame_columns.iter_mut().enumerate() {
                column
                    .values
                    .push(row.get(index).map(CellValue::from_json).unwrap_or(CellValue::Null));
            }
        }

        Self {
            columns: frame_columns,
            header_derived: true,
        }
    }

    pub fn columns(&self) -> &[FrameColumn] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map(|c| c.values.len()).unwrap_or(0)
    }

    pub fn header_derived(&self) -> bool {
        self.header_derived
    }

    pub fn schema(&self) -> FrameSchema {
        FrameSchema {
            columns: self
                .columns
                .iter()
                .map(|c| (c.name.clone(), c.domain))
                .collect(),
            header_derived: self.header_derived,
        }
    }

    /// Projects onto `selected` in the caller's order. Every name must exist.
    pub fn select(self, selected: &[String]) -> Result<Self, TransferError> {
        let missing = selected
            .iter()
            .filter(|name| !self.columns.iter().any(|c| &c.name == *name))
            .cloned()
            .collect::<Vec<String>>();
        if !missing.is_empty() {
            return Err(TransferError::MissingColumns(missing));
        }

        let header_derived = self.header_derived;
        let mut by_name = self
            .columns
            .into_iter()
            .map(|c| (c.name.clone(), c))
            .collect::<HashMap<String, FrameColumn>>();

        let mut seen = HashSet::new();
        let columns = selected
            .iter()
            .filter(|name| seen.insert(name.as_str()))
            .filter_map(|name| by_name.remove(name))
            .collect::<Vec<FrameColumn>>();

        Ok(Self {
            columns,
            header_derived,
        })
    }

    pub fn row_values(&self, row: usize) -> Vec<&CellValue> {
        self.columns.iter().map(|c| &c.values[row]).collect()
    }

    pub fn json_rows(&self) -> impl Iterator<Item = Vec<Value>> + '_ {
        (0..self.row_count()).map(move |row| {
            self.columns
                .iter()
                .map(|c| c.values[row].to_json())
                .collect::<Vec<Value>>()
        })
    }
}
