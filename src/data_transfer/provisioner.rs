use crate::clickhouse::StoreSession;
use crate::data_transfer::frame::FrameSchema;
use crate::data_transfer::mapper::map_type;
use crate::error::TransferError;
use crate::sql_utils::quote_identifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    Exists,
    Created,
}

/// `CREATE TABLE` for a frame schema on an append-only engine with no sort key.
pub fn build_create_table(table_ref: &str, schema: &FrameSchema) -> String {
    let columns = schema
        .columns
        .iter()
        .map(|(name, domain)| format!("{} {}", quote_identifier(name), map_type(*domain)))
        .collect::<Vec<String>>()
        .join(",\n    ");

    format!(
        "CREATE TABLE {} (\n    {}\n) ENGINE = MergeTree() ORDER BY tuple()",
        table_ref, columns
    )
}

/// Probes `table_ref`; an unknown-table answer means absent, any other
/// failure propagates.
pub async fn table_exists(session: &dyn StoreSession, table_ref: &str) -> Result<bool, TransferError> {
    log::debug!("Checking existence of table {}", table_ref);
    match session.command(&format!("DESCRIBE TABLE {}", table_ref)).await {
        Ok(()) => Ok(true),
        Err(e) if e.is_unknown_table() => Ok(false),
        Err(e) => {
            log::warn!("Error checking table existence for {}: {}", table_ref, e);
            Err(e.into())
        }
    }
}

/// Makes sure the target table exists, creating it from `schema` when allowed.
///
/// Existing tables are used as-is; their columns are not compared against
/// the schema.
pub async fn ensure_target(
    session: &dyn StoreSession,
    table_ref: &str,
    schema: &FrameSchema,
    create_if_missing: bool,
) -> Result<ProvisionOutcome, TransferError> {
    if table_exists(session, table_ref).await? {
        log::info!("Target table {} exists.", table_ref);
        if create_if_missing {
            log::info!("Target table exists, 'Create Table' option ignored.");
        }
        return Ok(ProvisionOutcome::Exists);
    }

    log::info!("Target table {} does not exist.", table_ref);
    if !create_if_missing {
        return Err(TransferError::Schema(format!(
            "Target table {} does not exist and 'Create Table' option was not checked.",
            table_ref
        )));
    }
    if !schema.header_derived {
        return Err(TransferError::Schema(
            "Cannot create table automatically: Source file has no header to infer schema."
                .to_string(),
        ));
    }
    if schema.columns.is_empty() {
        return Err(TransferError::Schema(format!(
            "Cannot create table {} without any columns.",
            table_ref
        )));
    }

    let statement = build_create_table(table_ref, schema);
    log::info!("Attempting to create target table {}...", table_ref);
    log::debug!("Create statement: {}", statement);

    session.command(&statement).await.map_err(|e| {
        log::error!("Failed to auto-create table {}: {}", table_ref, e);
        TransferError::Ddl(format!("Failed to auto-create table {}: {}", table_ref, e))
    })?;

    log::info!("Table {} created successfully.", table_ref);
    Ok(ProvisionOutcome::Created)
}

#[cfg(test)]
mod tests;
