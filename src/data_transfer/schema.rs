// =====================================================
// SCHEMA DISCOVERY
// Column lists from store metadata or from a flat-file sample
// =====================================================

use crate::clickhouse::StoreSession;
use crate::data_transfer::flat_file::{sample_frame, SAMPLE_ROWS};
use crate::data_transfer::mapper::{map_type, UNKNOWN_NATIVE_TYPE};
use crate::db_types::ColumnDescriptor;
use crate::error::TransferError;
use serde_json::Value;
use std::path::Path;

const LIST_TABLES_QUERY: &str =
    "SELECT name FROM system.tables WHERE database = {database:String} ORDER BY name LIMIT 1000";

const TABLE_COLUMNS_QUERY: &str = "SELECT name, type FROM system.columns \
     WHERE database = {database:String} AND table = {table:String} ORDER BY position";

fn cell_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Table names of `database`, alphabetically, capped at 1000.
pub async fn list_tables(
    session: &dyn StoreSession,
    database: &str,
) -> Result<Vec<String>, TransferError> {
    log::info!("Fetching tables for database: {}", database);
    let result = session
        .query(LIST_TABLES_QUERY, &[("database", database)])
        .await?;

    let tables = result
        .rows
        .iter()
        .map(|row| cell_text(row.first()))
        .collect::<Vec<String>>();
    log::info!("Found {} tables.", tables.len());
    Ok(tables)
}

/// Columns of `database.table` in declaration order, with the store's own
/// type names.
pub async fn inspect_store_table(
    session: &dyn StoreSession,
    database: &str,
    table: &str,
) -> Result<Vec<ColumnDescriptor>, TransferError> {
    log::info!("Fetching columns and types for table: {}.{}", database, table);
    let result = session
        .query(
            TABLE_COLUMNS_QUERY,
            &[("database", database), ("table", table)],
        )
        .await?;

    if result.rows.is_empty() {
        log::warn!(
            "No columns found for table '{}' in db '{}'. Table might not exist.",
            table,
            database
        );
        return Err(TransferError::NotFound(format!(
            "Table '{}' not found or has no columns in database '{}'.",
            table, database
        )));
    }

    let columns = result
        .rows
        .iter()
        .map(|row| ColumnDescriptor::new(cell_text(row.first()), cell_text(row.get(1))))
        .collect::<Vec<ColumnDescriptor>>();
    log::info!("Found {} columns for table {}.", columns.len(), table);
    Ok(columns)
}

/// Columns of a delimited file inferred from its header and leading rows.
///
/// Headerless files yield no descriptors. A header with no data rows yields
/// one descriptor per name typed as [`UNKNOWN_NATIVE_TYPE`].
pub fn inspect_file(
    path: &Path,
    delimiter: u8,
    has_header: bool,
) -> Result<Vec<ColumnDescriptor>, TransferError> {
    if !has_header {
        log::info!(
            "Flat file source {} has no header. Cannot extract columns.",
            path.display()
        );
        return Ok(Vec::new());
    }

    log::info!("Inferring columns and types from file: {}", path.display());
    let sample = sample_frame(path, delimiter, SAMPLE_ROWS).map_err(|e| {
        log::error!("Error reading sample from file '{}': {}", path.display(), e);
        match e {
            TransferError::NotFound(_) => e,
            _ => TransferError::Config(format!(
                "Error reading file '{}': Check format, encoding, and delimiter.",
                path.file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string())
            )),
        }
    })?;

    if sample.column_count() == 0 {
        log::warn!("File '{}' is completely empty.", path.display());
        return Ok(Vec::new());
    }

    let has_rows = sample.row_count() > 0;
    if !has_rows {
        log::warn!(
            "File '{}' has a header but no data rows for type inference.",
            path.display()
        );
    }

    let columns = sample
        .columns()
        .iter()
        .map(|column| {
            let native_type = if has_rows {
                map_type(column.domain)
            } else {
                UNKNOWN_NATIVE_TYPE
            };
            log::debug!(
                "Column '{}' inferred as {} ({})",
                column.name,
                column.domain.as_str(),
                native_type
            );
            ColumnDescriptor::new(column.name.clone(), native_type)
        })
        .collect::<Vec<ColumnDescriptor>>();

    log::info!(
        "Inferred {} columns from file {}.",
        columns.len(),
        path.display()
    );
    Ok(columns)
}
