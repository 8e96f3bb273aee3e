use crate::clickhouse::{StoreConnector, StoreError, StoreSession};
use crate::data_transfer::flat_file::{read_frame, read_header, write_frame};
use crate::data_transfer::frame::TabularFrame;
use crate::data_transfer::models::{
    ColumnsSource, FileToStoreRequest, StoreToFileRequest, TransferRequest, TransferResult,
};
use crate::data_transfer::provisioner::ensure_target;
use crate::data_transfer::schema::{inspect_file, inspect_store_table, list_tables};
use crate::db_types::{ColumnDescriptor, ConnectionConfig};
use crate::error::{InsertFailureKind, TransferError};
use crate::sandbox::PathSandbox;
use crate::sql_utils::{qualified_table_name, quoted_column_list};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Runs discovery and transfer requests. Every call opens its own store
/// session and releases it before returning.
#[derive(Clone)]
pub struct TransferEngine {
    connector: Arc<dyn StoreConnector>,
    sandbox: PathSandbox,
}

async fn release(session: Box<dyn StoreSession>) {
    if let Err(e) = session.close().await {
        log::error!("Error closing ClickHouse connection: {}", e);
    }
}

fn file_label(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

fn classify_insert_error(target_table: &str, err: StoreError) -> TransferError {
    match err {
        StoreError::Transport(_) => TransferError::Network(format!(
            "Lost connection to ClickHouse while inserting into {}: {}",
            target_table, err
        )),
        StoreError::Protocol(_) => TransferError::Internal(err.to_string()),
        StoreError::Server { .. } => {
            let kind = err.insert_failure_kind();
            let message = match kind {
                InsertFailureKind::TypeMismatch => format!(
                    "Data type mismatch error inserting into {}. Check file data types against table schema.",
                    target_table
                ),
                InsertFailureKind::UnknownColumn => format!(
                    "Column mismatch error inserting into {}. Check file header/columns against table schema.",
                    target_table
                ),
                InsertFailureKind::Generic => format!(
                    "Error inserting data into ClickHouse table {}: {}",
                    target_table, err
                ),
            };
            TransferError::Insert { kind, message }
        }
    }
}

impl TransferEngine {
    pub fn new(connector: Arc<dyn StoreConnector>, sandbox: PathSandbox) -> Self {
        Self { connector, sandbox }
    }

    // =====================================================
    // DISCOVERY
    // =====================================================

    pub async fn list_tables(&self, config: &ConnectionConfig) -> Result<Vec<String>, TransferError> {
        let session = self.connector.connect(config).await?;
        let outcome = list_tables(session.as_ref(), &config.database).await;
        release(session).await;
        outcome
    }

    pub async fn describe_columns(
        &self,
        source: &ColumnsSource,
    ) -> Result<Vec<ColumnDescriptor>, TransferError> {
        match source {
            ColumnsSource::Store { connection, table } => {
                let session = self.connector.connect(connection).await?;
                let outcome =
                    inspect_store_table(session.as_ref(), &connection.database, table).await;
                release(session).await;
                outcome
            }
            ColumnsSource::File {
                path,
                delimiter,
                has_header,
            } => {
                let resolved = self.existing_file(
                    path,
                    "File not found at specified path",
                    "Specified path is not a file",
                )?;
                inspect_file(&resolved, *delimiter, *has_header)
            }
        }
    }

    fn existing_file(
        &self,
        user_path: &str,
        missing: &str,
        not_a_file: &str,
    ) -> Result<PathBuf, TransferError> {
        let resolved = self.sandbox.resolve(user_path)?;
        if !resolved.exists() {
            return Err(TransferError::NotFound(format!("{}: {}", missing, user_path)));
        }
        if !resolved.is_file() {
            return Err(TransferError::Config(format!("{}: {}", not_a_file, user_path)));
        }
        Ok(resolved)
    }

    // =====================================================
    // TRANSFER
    // =====================================================

    /// Runs one transfer to completion. Failures are folded into the result
    /// together with the number of records read before the failure.
    pub async fn execute(&self, request: &TransferRequest) -> TransferResult {
        let operation_id = Uuid::new_v4().to_string();
        log::info!(
            "[{}] Starting ingestion flow: {}",
            operation_id,
            request.flow_label()
        );

        let mut processed = 0usize;
        let outcome = match request {
            TransferRequest::StoreToFile(req) => {
                self.store_to_file(&operation_id, req, &mut processed).await
            }
            TransferRequest::FileToStore(req) => {
                self.file_to_store(&operation_id, req, &mut processed).await
            }
        };

        match outcome {
            Ok(records) => {
                log::info!(
                    "[{}] Ingestion finished: {} records processed.",
                    operation_id,
                    records
                );
                TransferResult::succeeded(records)
            }
            Err(e) if e.is_expected() => {
                log::error!("[{}] Ingestion failed: {}", operation_id, e);
                TransferResult::failed(processed, &e)
            }
            Err(e) => {
                log::error!("[{}] Unexpected ingestion error: {:?}", operation_id, e);
                TransferResult::failed(processed, &e)
            }
        }
    }

    async fn store_to_file(
        &self,
        operation_id: &str,
        req: &StoreToFileRequest,
        processed: &mut usize,
    ) -> Result<usize, TransferError> {
        log::info!("[{}] Executing ClickHouse -> Flat File flow", operation_id);
        req.validate()?;
        let target = self.sandbox.resolve(&req.target_path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                TransferError::Config(format!(
                    "Cannot create target directory for '{}': {}",
                    req.target_path, e
                ))
            })?;
        }

        let session = self.connector.connect(&req.connection).await?;
        let outcome = async {
            let select_query = format!(
                "SELECT {} FROM {}",
                quoted_column_list(&req.columns),
                qualified_table_name(&req.connection.database, &req.source_table)
            );
            log::info!("[{}] Executing query: {}", operation_id, select_query);

            let result = session.query(&select_query, &[]).await?;
            let frame = TabularFrame::from_query_result(result);
            *processed = frame.row_count();
            log::info!(
                "[{}] Fetched {} records from ClickHouse table {}.",
                operation_id,
                frame.row_count(),
                req.source_table
            );

            log::info!(
                "[{}] Writing data to {} (at {})",
                operation_id,
                req.target_path,
                target.display()
            );
            write_frame(
                &frame,
                &target,
                req.delimiter,
                req.include_header,
                req.quoting,
            )
            .map_err(|e| {
                log::error!("[{}] Failed to write target file: {}", operation_id, e);
                TransferError::Write(format!(
                    "Failed to write data to file '{}'. Check permissions and disk space.",
                    req.target_path
                ))
            })
        }
        .await;

        release(session).await;
        outcome
    }

    fn read_source(
        &self,
        operation_id: &str,
        req: &FileToStoreRequest,
    ) -> Result<TabularFrame, TransferError> {
        let source = self.existing_file(
            &req.source_path,
            "Source file not found",
            "Source path is not a file",
        )?;
        log::info!(
            "[{}] Reading data from {} (at {})",
            operation_id,
            req.source_path,
            source.display()
        );

        let read_failure = |e: TransferError| {
            log::error!(
                "[{}] Error reading CSV file '{}': {}",
                operation_id,
                req.source_path,
                e
            );
            match e {
                TransferError::NotFound(_) => e,
                _ => TransferError::Config(format!(
                    "Error reading CSV file '{}'. Check format, encoding, and delimiter.",
                    file_label(&req.source_path)
                )),
            }
        };

        // Selected names are checked against the header before the full parse.
        if req.has_header && !req.columns.is_empty() {
            let header = read_header(&source, req.delimiter).map_err(read_failure)?;
            let missing = req
                .columns
                .iter()
                .filter(|name| !header.is_empty() && !header.contains(*name))
                .cloned()
                .collect::<Vec<String>>();
            if !missing.is_empty() {
                return Err(TransferError::MissingColumns(missing));
            }
        }

        read_frame(&source, req.delimiter, req.has_header).map_err(read_failure)
    }

    async fn file_to_store(
        &self,
        operation_id: &str,
        req: &FileToStoreRequest,
        processed: &mut usize,
    ) -> Result<usize, TransferError> {
        log::info!("[{}] Executing Flat File -> ClickHouse flow", operation_id);
        req.validate()?;
        let mut frame = self.read_source(operation_id, req)?;

        if frame.column_count() == 0 {
            log::warn!(
                "[{}] Source file '{}' is empty. Nothing to ingest.",
                operation_id,
                req.source_path
            );
            return Ok(0);
        }

        if req.has_header {
            if !req.columns.is_empty() {
                frame = frame.select(&req.columns)?;
            }
        } else {
            log::warn!(
                "[{}] Reading file without header. Column matching relies on position.",
                operation_id
            );
            if !req.columns.is_empty() {
                log::warn!(
                    "[{}] Columns were selected, but file has no header. Selection ignored.",
                    operation_id
                );
            }
        }

        *processed = frame.row_count();
        if frame.row_count() == 0 {
            log::info!("[{}] Source file is empty. Nothing to ingest.", operation_id);
            return Ok(0);
        }
        log::info!("[{}] Read {} records from file.", operation_id, frame.row_count());

        let session = self.connector.connect(&req.connection).await?;
        let table_ref = qualified_table_name(&req.connection.database, &req.target_table);

        let outcome = async {
            ensure_target(
                session.as_ref(),
                &table_ref,
                &frame.schema(),
                req.create_if_missing,
            )
            .await?;

            log::info!(
                "[{}] Inserting {} records into {}...",
                operation_id,
                frame.row_count(),
                table_ref
            );
            session
                .insert_frame(&table_ref, &frame)
                .await
                .map_err(|e| {
                    log::error!(
                        "[{}] ClickHouse insert error into {}: {}",
                        operation_id,
                        table_ref,
                        e
                    );
                    classify_insert_error(&req.target_table, e)
                })?;

            log::info!(
                "[{}] Successfully inserted {} records into {}.",
                operation_id,
                frame.row_count(),
                table_ref
            );
            Ok::<usize, TransferError>(frame.row_count())
        }
        .await;

        release(session).await;
        outcome
    }
}
