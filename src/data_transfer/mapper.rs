use serde::{Deserialize, Serialize};

/// Native type reported for file columns whose sample had no data rows.
pub const UNKNOWN_NATIVE_TYPE: &str = "UNKNOWN";

/// Primitive domain of a column, as inferred from flat-file cells or derived
/// from a store column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ColumnDomain {
    Integer,
    Float,
    Boolean,
    Timestamp,
    #[default]
    Text,
    Other,
}

impl ColumnDomain {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnDomain::Integer => "integer",
            ColumnDomain::Float => "float",
            ColumnDomain::Boolean => "boolean",
            ColumnDomain::Timestamp => "timestamp",
            ColumnDomain::Text => "text",
            ColumnDomain::Other => "other",
        }
    }

    /// Classifies a ClickHouse column type such as `Nullable(Int64)` or
    /// `LowCardinality(String)`.
    pub fn from_native_type(native_type: &str) -> Self {
        let inner = unwrap_type_modifiers(native_type.trim());
        let lower = inner.to_ascii_lowercase();

        if lower == "bool" || lower == "boolean" {
            return ColumnDomain::Boolean;
        }
        if lower.starts_with("int") || lower.starts_with("uint") {
            return ColumnDomain::Integer;
        }
        if lower.starts_with("float") || lower.starts_with("decimal") {
            return ColumnDomain::Float;
        }
        if lower.starts_with("datetime") || lower.starts_with("date") {
            return ColumnDomain::Timestamp;
        }
        if lower == "string"
            || lower.starts_with("fixedstring")
            || lower == "uuid"
            || lower.starts_with("enum")
        {
            return ColumnDomain::Text;
        }

        ColumnDomain::Other
    }
}

fn unwrap_type_modifiers(native_type: &str) -> &str {
    let mut current = native_type;
    loop {
        let stripped = ["Nullable(", "LowCardinality("]
            .iter()
            .find_map(|prefix| current.strip_prefix(prefix))
            .and_then(|rest| rest.strip_suffix(')'));
        match stripped {
            Some(inner) => current = inner.trim(),
            None => return current,
        }
    }
}

/// Maps an inferred domain onto the store's native type vocabulary.
pub fn map_type(domain: ColumnDomain) -> &'static str {
    match domain {
        ColumnDomain::Integer => "Int64",
        ColumnDomain::Float => "Float64",
        // ClickHouse conventionally stores flags as 0/1
        ColumnDomain::Boolean => "UInt8",
        ColumnDomain::Timestamp => "DateTime",
        ColumnDomain::Text | ColumnDomain::Other => "String",
    }
}
