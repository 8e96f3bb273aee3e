// =====================================================
// SQL UTILITIES MODULE
// Identifier quoting and string helpers for ClickHouse SQL
// =====================================================

pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('\\', "\\\\").replace('`', "\\`"))
}

pub fn qualified_table_name(database: &str, table: &str) -> String {
    format!("{}.{}", quote_identifier(database), quote_identifier(table))
}

pub fn quoted_column_list(columns: &[String]) -> String {
    columns
        .iter()
        .map(|column| quote_identifier(column))
        .collect::<Vec<String>>()
        .join(", ")
}

/// Table names accepted as transfer targets: ASCII letters, digits and `_`.
pub fn is_valid_table_identifier(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}
