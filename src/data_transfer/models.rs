use crate::data_transfer::flat_file::{parse_delimiter, QuoteMode};
use crate::db_types::{ConnectionConfig, Credential};
use crate::error::{ErrorDescriptor, ErrorKind, TransferError};
use crate::sql_utils::is_valid_table_identifier;
use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

fn default_true() -> bool {
    true
}

fn normalized(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Selected column names, trimmed, blank-free, first occurrence wins.
pub fn normalized_columns(columns: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    columns
        .iter()
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .filter(|value| seen.insert(value.to_string()))
        .map(str::to_string)
        .collect()
}

fn deserialize_port<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PortValue {
        Number(u64),
        Text(String),
    }

    match Option::<PortValue>::deserialize(deserializer)? {
        None => Ok(None),
        Some(PortValue::Number(n)) => u16::try_from(n)
            .map(Some)
            .map_err(|_| de::Error::custom(format!("invalid port: {}", n))),
        Some(PortValue::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(PortValue::Text(s)) => s
            .trim()
            .parse::<u16>()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("invalid port: {}", s))),
    }
}

// --- Request payloads ---

/// Keys that belong to [`ConnectionPayload`] wherever they appear in a body.
pub const CONNECTION_FIELDS: [&str; 7] =
    ["host", "port", "database", "user", "password", "jwt", "secure"];

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct ConnectionPayload {
    pub host: Option<String>,
    #[serde(default, deserialize_with = "deserialize_port")]
    pub port: Option<u16>,
    pub database: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub jwt: Option<String>,
    pub secure: Option<bool>,
}

impl ConnectionPayload {
    pub fn validate(&self) -> Result<ConnectionConfig, TransferError> {
        let missing = || {
            TransferError::Config(
                "Missing required ClickHouse connection parameters (host, port, database, user)."
                    .to_string(),
            )
        };

        let host = normalized(&self.host).ok_or_else(missing)?;
        let port = self.port.filter(|port| *port > 0).ok_or_else(missing)?;
        let database = normalized(&self.database).ok_or_else(missing)?;
        let user = normalized(&self.user).ok_or_else(missing)?;
        let credential = Credential::from_parts(self.password.clone(), self.jwt.clone())
            .ok_or_else(|| {
                TransferError::Config(
                    "Authentication required: Provide either password or JWT.".to_string(),
                )
            })?;

        Ok(ConnectionConfig {
            host,
            port,
            database,
            user,
            secure: self.secure.unwrap_or(false),
            credential,
        })
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct StoreColumnsPayload {
    pub table: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct FileColumnsPayload {
    pub file_path: Option<String>,
    pub delimiter: Option<String>,
    #[serde(default = "default_true")]
    pub has_header: bool,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct StoreToFilePayload {
    #[serde(default)]
    pub columns: Vec<String>,
    pub source_table: Option<String>,
    pub target_file: Option<String>,
    pub target_delimiter: Option<String>,
    #[serde(default = "default_true")]
    pub include_header: bool,
    #[serde(default)]
    pub quoting: QuoteMode,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct FileToStorePayload {
    pub source_file: Option<String>,
    pub source_delimiter: Option<String>,
    #[serde(default = "default_true")]
    pub source_has_header: bool,
    #[serde(default)]
    pub columns: Vec<String>,
    pub target_table: Option<String>,
    #[serde(default)]
    pub target_create: bool,
}

/// A JSON body split into its connection fields and everything else.
#[derive(Debug, Clone)]
pub struct RequestBody {
    connection: ConnectionPayload,
    rest: Map<String, Value>,
}

impl RequestBody {
    pub fn parse(body: Value) -> Result<Self, TransferError> {
        let Value::Object(mut rest) = body else {
            return Err(TransferError::Config(
                "Request body must be a JSON object.".to_string(),
            ));
        };

        let mut connection = Map::new();
        for key in CONNECTION_FIELDS {
            if let Some(value) = rest.remove(key) {
                connection.insert(key.to_string(), value);
            }
        }

        Ok(Self {
            connection: decode(Value::Object(connection))?,
            rest,
        })
    }

    pub fn connection(&self) -> &ConnectionPayload {
        &self.connection
    }

    /// Removes and returns the string discriminator `field`.
    pub fn take_tag(&mut self, field: &str) -> Option<String> {
        match self.rest.remove(field) {
            Some(Value::String(tag)) => Some(tag),
            Some(other) => Some(other.to_string()),
            None => None,
        }
    }

    /// Decodes the non-connection fields, rejecting any the payload does not
    /// declare.
    pub fn into_payload<T: DeserializeOwned>(self) -> Result<(ConnectionPayload, T), TransferError> {
        let payload = decode(Value::Object(self.rest))?;
        Ok((self.connection, payload))
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, TransferError> {
    serde_json::from_value(value)
        .map_err(|e| TransferError::Config(format!("Invalid request payload: {}", e)))
}

// --- Validated requests ---

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnsSource {
    Store {
        connection: ConnectionConfig,
        table: String,
    },
    File {
        path: String,
        delimiter: u8,
        has_header: bool,
    },
}

impl ColumnsSource {
    pub fn from_body(mut body: RequestBody) -> Result<Self, TransferError> {
        let source_type = body.take_tag("source_type").unwrap_or_default();
        match source_type.as_str() {
            "clickhouse" => {
                let (connection, payload) = body.into_payload::<StoreColumnsPayload>()?;
                let table = normalized(&payload.table).ok_or_else(|| {
                    TransferError::Config(
                        "Missing 'table' parameter for ClickHouse source.".to_string(),
                    )
                })?;
                Ok(ColumnsSource::Store {
                    connection: connection.validate()?,
                    table,
                })
            }
            "flatfile" => {
                let (_, payload) = body.into_payload::<FileColumnsPayload>()?;
                let delimiter = normalized_delimiter(&payload.delimiter).ok_or_else(|| {
                    TransferError::Config("Missing 'delimiter' for Flat File source.".to_string())
                })?;
                Ok(ColumnsSource::File {
                    path: payload.file_path.unwrap_or_default(),
                    delimiter: parse_delimiter(&delimiter)?,
                    has_header: payload.has_header,
                })
            }
            other => Err(TransferError::Config(format!(
                "Invalid source_type specified: {}",
                other
            ))),
        }
    }
}

/// Delimiters are not trimmed: a lone tab or space is a valid delimiter.
fn normalized_delimiter(value: &Option<String>) -> Option<String> {
    value.clone().filter(|value| !value.is_empty())
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoreToFileRequest {
    pub connection: ConnectionConfig,
    pub source_table: String,
    pub columns: Vec<String>,
    pub target_path: String,
    pub delimiter: u8,
    pub include_header: bool,
    pub quoting: QuoteMode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileToStoreRequest {
    pub connection: ConnectionConfig,
    pub source_path: String,
    pub delimiter: u8,
    pub has_header: bool,
    pub columns: Vec<String>,
    pub target_table: String,
    pub create_if_missing: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransferRequest {
    StoreToFile(StoreToFileRequest),
    FileToStore(FileToStoreRequest),
}

impl TransferRequest {
    pub fn flow_label(&self) -> &'static str {
        match self {
            TransferRequest::StoreToFile(_) => "ch_to_ff",
            TransferRequest::FileToStore(_) => "ff_to_ch",
        }
    }

    pub fn from_body(mut body: RequestBody) -> Result<Self, TransferError> {
        let flow_type = body.take_tag("flow_type").unwrap_or_default();
        match flow_type.as_str() {
            "ch_to_ff" => {
                let (connection, payload) = body.into_payload::<StoreToFilePayload>()?;
                payload.validate(&connection).map(TransferRequest::StoreToFile)
            }
            "ff_to_ch" => {
                let (connection, payload) = body.into_payload::<FileToStorePayload>()?;
                payload.validate(&connection).map(TransferRequest::FileToStore)
            }
            other => Err(TransferError::Config(format!(
                "Invalid flow_type specified: {}",
                other
            ))),
        }
    }
}

fn check_columns(columns: &[String]) -> Result<(), TransferError> {
    if columns.is_empty() || columns.iter().any(|column| column.trim().is_empty()) {
        return Err(TransferError::Config(
            "No columns selected for ingestion.".to_string(),
        ));
    }
    Ok(())
}

fn check_source_table(table: &str) -> Result<(), TransferError> {
    if table.trim().is_empty() {
        return Err(TransferError::Config(
            "Source ClickHouse table not specified.".to_string(),
        ));
    }
    Ok(())
}

fn check_target_table(table: &str) -> Result<(), TransferError> {
    if table.trim().is_empty() {
        return Err(TransferError::Config(
            "Target ClickHouse table not specified.".to_string(),
        ));
    }
    if !is_valid_table_identifier(table) {
        return Err(TransferError::Config(format!(
            "Invalid target table name: {}. Use alphanumeric characters and underscores.",
            table
        )));
    }
    Ok(())
}

impl StoreToFileRequest {
    /// Re-checks the fields a store read depends on. Runs before any
    /// connection is opened.
    pub fn validate(&self) -> Result<(), TransferError> {
        check_columns(&self.columns)?;
        check_source_table(&self.source_table)
    }
}

impl FileToStoreRequest {
    pub fn validate(&self) -> Result<(), TransferError> {
        check_target_table(&self.target_table)
    }
}

impl StoreToFilePayload {
    pub fn validate(self, connection: &ConnectionPayload) -> Result<StoreToFileRequest, TransferError> {
        let columns = normalized_columns(&self.columns);
        check_columns(&columns)?;
        let source_table = normalized(&self.source_table).unwrap_or_default();
        check_source_table(&source_table)?;
        let delimiter = normalized_delimiter(&self.target_delimiter).ok_or_else(|| {
            TransferError::Config("Target file delimiter not specified.".to_string())
        })?;

        Ok(StoreToFileRequest {
            connection: connection.validate()?,
            source_table,
            columns,
            target_path: self.target_file.unwrap_or_default(),
            delimiter: parse_delimiter(&delimiter)?,
            include_header: self.include_header,
            quoting: self.quoting,
        })
    }
}

impl FileToStorePayload {
    pub fn validate(self, connection: &ConnectionPayload) -> Result<FileToStoreRequest, TransferError> {
        let delimiter = normalized_delimiter(&self.source_delimiter).ok_or_else(|| {
            TransferError::Config("Source file delimiter not specified.".to_string())
        })?;
        let target_table = normalized(&self.target_table).unwrap_or_default();
        check_target_table(&target_table)?;

        Ok(FileToStoreRequest {
            connection: connection.validate()?,
            source_path: self.source_file.unwrap_or_default(),
            delimiter: parse_delimiter(&delimiter)?,
            has_header: self.source_has_header,
            columns: normalized_columns(&self.columns),
            target_table,
            create_if_missing: self.target_create,
        })
    }
}

// --- Results ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferResult {
    pub success: bool,
    pub records_processed: usize,
    pub error: Option<ErrorDescriptor>,
}

impl TransferResult {
    pub fn succeeded(records_processed: usize) -> Self {
        Self {
            success: true,
            records_processed,
            error: None,
        }
    }

    pub fn failed(records_processed: usize, error: &TransferError) -> Self {
        Self {
            success: false,
            records_processed,
            error: Some(error.descriptor()),
        }
    }
}

/// Wire shape of a transfer outcome.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct IngestResponse {
    pub success: bool,
    pub records_processed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl From<&TransferResult> for IngestResponse {
    fn from(result: &TransferResult) -> Self {
        Self {
            success: result.success,
            records_processed: result.records_processed,
            error: result.error.as_ref().map(|e| e.message.clone()),
            error_kind: result.error.as_ref().map(|e| e.kind),
        }
    }
}
