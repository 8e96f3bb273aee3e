// =====================================================
// ClickHouse HTTP SESSION
// =====================================================

use crate::auth::TokenValidator;
use crate::data_transfer::frame::TabularFrame;
use crate::db_types::{ConnectionConfig, Credential, QueryResult};
use crate::error::{InsertFailureKind, TransferError};
use crate::sql_utils::quoted_column_list;
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;

/// ClickHouse server exception codes the pipeline reacts to.
pub mod codes {
    pub const CANNOT_PARSE_TEXT: u32 = 6;
    pub const THERE_IS_NO_COLUMN: u32 = 8;
    pub const NO_SUCH_COLUMN_IN_TABLE: u32 = 16;
    pub const CANNOT_PARSE_QUOTED_STRING: u32 = 26;
    pub const CANNOT_PARSE_INPUT_ASSERTION_FAILED: u32 = 27;
    pub const CANNOT_PARSE_DATE: u32 = 38;
    pub const CANNOT_PARSE_DATETIME: u32 = 41;
    pub const UNKNOWN_IDENTIFIER: u32 = 47;
    pub const TYPE_MISMATCH: u32 = 53;
    pub const TABLE_ALREADY_EXISTS: u32 = 57;
    pub const UNKNOWN_TABLE: u32 = 60;
    pub const CANNOT_PARSE_NUMBER: u32 = 72;
    pub const UNKNOWN_DATABASE: u32 = 81;
    pub const INCORRECT_DATA: u32 = 117;
    pub const UNKNOWN_USER: u32 = 192;
    pub const WRONG_PASSWORD: u32 = 193;
    pub const REQUIRED_PASSWORD: u32 = 194;
    pub const AUTHENTICATION_FAILED: u32 = 516;
}

const EXCEPTION_CODE_HEADER: &str = "X-ClickHouse-Exception-Code";

static EXCEPTION_CODE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Code:\s*(\d+)").expect("valid exception code pattern"));

// --- Errors ---

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The request never produced an HTTP response
    #[error("{0}")]
    Transport(String),

    /// ClickHouse answered with an exception
    #[error("ClickHouse error ({status}): {message}")]
    Server {
        status: u16,
        code: Option<u32>,
        message: String,
    },

    /// The response could not be decoded
    #[error("{0}")]
    Protocol(String),
}

impl StoreError {
    /// Builds a server error, falling back to the `Code: N` prefix of the body
    /// when the exception code header is absent.
    pub fn server(status: u16, header_code: Option<u32>, body: &str) -> Self {
        let code = header_code.or_else(|| {
            EXCEPTION_CODE_PATTERN
                .captures(body)
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse::<u32>().ok())
        });
        StoreError::Server {
            status,
            code,
            message: body.trim().to_string(),
        }
    }

    pub fn code(&self) -> Option<u32> {
        match self {
            StoreError::Server { code, .. } => *code,
            _ => None,
        }
    }

    fn lowered(&self) -> String {
        self.to_string().to_lowercase()
    }

    pub fn is_unknown_table(&self) -> bool {
        if !matches!(self, StoreError::Server { .. }) {
            return false;
        }
        if let Some(code) = self.code() {
            return code == codes::UNKNOWN_TABLE;
        }
        let text = self.to_string();
        text.contains("UNKNOWN_TABLE")
            || text.contains("doesn't exist")
            || text.to_lowercase().contains("code: 60")
    }

    pub fn is_unknown_database(&self) -> bool {
        match self.code() {
            Some(code) => code == codes::UNKNOWN_DATABASE,
            None => self.lowered().contains("unknown database"),
        }
    }

    pub fn is_auth_failure(&self) -> bool {
        if let Some(code) = self.code() {
            return matches!(
                code,
                codes::AUTHENTICATION_FAILED
                    | codes::UNKNOWN_USER
                    | codes::WRONG_PASSWORD
                    | codes::REQUIRED_PASSWORD
            );
        }
        let text = self.lowered();
        text.contains("authentication failed") || text.contains("auth failed")
    }

    /// Sub-kind of a failed bulk insert. The exception code decides when
    /// present; message text is the fallback.
    pub fn insert_failure_kind(&self) -> InsertFailureKind {
        if let Some(code) = self.code() {
            match code {
                codes::TYPE_MISMATCH
                | codes::CANNOT_PARSE_TEXT
                | codes::CANNOT_PARSE_QUOTED_STRING
                | codes::CANNOT_PARSE_INPUT_ASSERTION_FAILED
                | codes::CANNOT_PARSE_DATE
                | codes::CANNOT_PARSE_DATETIME
                | codes::CANNOT_PARSE_NUMBER
                | codes::INCORRECT_DATA => return InsertFailureKind::TypeMismatch,
                codes::NO_SUCH_COLUMN_IN_TABLE
                | codes::THERE_IS_NO_COLUMN
                | codes::UNKNOWN_IDENTIFIER => return InsertFailureKind::UnknownColumn,
                _ => {}
            }
        }

        let text = self.lowered();
        if text.contains("type mismatch") || text.contains("cannot parse") {
            InsertFailureKind::TypeMismatch
        } else if text.contains("unknown column") || text.contains("not found") {
            InsertFailureKind::UnknownColumn
        } else {
            InsertFailureKind::Generic
        }
    }
}

impl From<StoreError> for TransferError {
    fn from(err: StoreError) -> Self {
        match &err {
            StoreError::Transport(_) => TransferError::Network(err.to_string()),
            StoreError::Protocol(_) => TransferError::Internal(err.to_string()),
            StoreError::Server { .. } if err.is_auth_failure() => {
                TransferError::Auth(err.to_string())
            }
            StoreError::Server { .. } if err.is_unknown_table() || err.is_unknown_database() => {
                TransferError::NotFound(err.to_string())
            }
            StoreError::Server { .. } => TransferError::Store(err.to_string()),
        }
    }
}

// --- Transport seams ---

#[async_trait]
pub trait StoreSession: Send + Sync {
    /// Liveness probe.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Runs a read query. `params` bind `{name:Type}` placeholders.
    async fn query(&self, sql: &str, params: &[(&str, &str)]) -> Result<QueryResult, StoreError>;

    /// Runs a statement whose result is discarded (DDL, DESCRIBE probes).
    async fn command(&self, sql: &str) -> Result<(), StoreError>;

    async fn insert_frame(&self, table_ref: &str, frame: &TabularFrame) -> Result<(), StoreError>;

    async fn close(&self) -> Result<(), StoreError>;
}

#[async_trait]
pub trait StoreConnector: Send + Sync {
    async fn connect(&self, config: &ConnectionConfig)
        -> Result<Box<dyn StoreSession>, TransferError>;
}

// --- Connection ---

#[derive(Clone, PartialEq, Eq)]
pub enum HttpAuth {
    Password { user: String, password: String },
    Bearer(String),
}

impl std::fmt::Debug for HttpAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpAuth::Password { user, .. } => {
                write!(f, "Password {{ user: {:?}, password: [REDACTED] }}", user)
            }
            HttpAuth::Bearer(_) => write!(f, "Bearer([REDACTED])"),
        }
    }
}

pub fn validate_connection_config(config: &ConnectionConfig) -> Result<(), TransferError> {
    if config.host.trim().is_empty()
        || config.port == 0
        || config.database.trim().is_empty()
        || config.user.trim().is_empty()
    {
        return Err(TransferError::Config(
            "Missing required ClickHouse connection parameters (host, port, database, user)."
                .to_string(),
        ));
    }
    Ok(())
}

/// Picks the transport credentials. Runs after token validation.
pub fn resolve_auth(config: &ConnectionConfig) -> Result<HttpAuth, TransferError> {
    match &config.credential {
        Credential::Password(password) => Ok(HttpAuth::Password {
            user: config.user.clone(),
            password: password.clone(),
        }),
        Credential::BearerToken { token, .. } if config.is_http_port() => {
            log::info!("Using JWT via HTTP headers for connection.");
            Ok(HttpAuth::Bearer(token.clone()))
        }
        Credential::BearerToken { password, .. } => {
            log::warn!(
                "JWT provided for non-HTTP port ({}). The token cannot be carried on this protocol.",
                config.port
            );
            match password {
                Some(password) => Ok(HttpAuth::Password {
                    user: config.user.clone(),
                    password: password.clone(),
                }),
                None => Err(TransferError::Config(format!(
                    "JWT authentication via native protocol on port {} requires a password.",
                    config.port
                ))),
            }
        }
    }
}

pub fn base_url(config: &ConnectionConfig) -> String {
    let host = config.host.trim();
    let host = host
        .strip_prefix("https://")
        .or_else(|| host.strip_prefix("http://"))
        .unwrap_or(host)
        .trim_end_matches('/');
    let scheme = if config.secure { "https" } else { "http" };
    format!("{}://{}:{}/", scheme, host, config.port)
}

pub struct ClickHouseConnector {
    tokens: TokenValidator,
    connect_timeout: Duration,
}

impl ClickHouseConnector {
    pub fn new(tokens: TokenValidator, connect_timeout: Duration) -> Self {
        Self {
            tokens,
            connect_timeout,
        }
    }

    /// Everything short of network I/O: parameter checks, token validation,
    /// credential selection and client construction.
    pub fn prepare(&self, config: &ConnectionConfig) -> Result<HttpSession, TransferError> {
        validate_connection_config(config)?;

        if let Credential::BearerToken { token, .. } = &config.credential {
            log::info!("Attempting JWT validation...");
            self.tokens.validate(token)?;
        }

        let auth = resolve_auth(config)?;
        let client = reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .build()
            .map_err(|e| TransferError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(HttpSession {
            client,
            base_url: base_url(config),
            database: config.database.clone(),
            auth,
            closed: AtomicBool::new(false),
        })
    }
}

fn classify_connect_error(config: &ConnectionConfig, err: StoreError) -> TransferError {
    log::error!("ClickHouse connection check failed: {}", err);
    match &err {
        StoreError::Server { .. } if err.is_auth_failure() => TransferError::Auth(format!(
            "ClickHouse authentication failed for user '{}'. Check credentials/token.",
            config.user
        )),
        StoreError::Server { .. } if err.is_unknown_database() => TransferError::NotFound(
            format!("ClickHouse database '{}' not found.", config.database),
        ),
        StoreError::Transport(_) => TransferError::Network(format!(
            "Could not connect to ClickHouse at {}. Check host/port and network.",
            config.endpoint_label()
        )),
        _ => TransferError::Network(format!("ClickHouse connection check failed: {}", err)),
    }
}

#[async_trait]
impl StoreConnector for ClickHouseConnector {
    async fn connect(
        &self,
        config: &ConnectionConfig,
    ) -> Result<Box<dyn StoreSession>, TransferError> {
        let session = self.prepare(config)?;
        log::info!(
            "Attempting connection to {} using {}...",
            config.endpoint_label(),
            config.credential.method_label()
        );
        log::debug!("Connection args (sensitive info redacted): {:?}", config);

        session
            .ping()
            .await
            .map_err(|e| classify_connect_error(config, e))?;

        log::info!("ClickHouse connection successful.");
        Ok(Box::new(session))
    }
}

// --- Raw HTTP Query Execution ---

pub struct HttpSession {
    client: reqwest::Client,
    base_url: String,
    database: String,
    auth: HttpAuth,
    closed: AtomicBool,
}

impl HttpSession {
    pub fn auth(&self) -> &HttpAuth {
        &self.auth
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self) -> reqwest::RequestBuilder {
        let rb = self
            .client
            .post(&self.base_url)
            .query(&[("database", &self.database)]);

        match &self.auth {
            HttpAuth::Password { user, password } => rb
                .header("X-ClickHouse-User", user)
                .header("X-ClickHouse-Key", password),
            HttpAuth::Bearer(token) => rb.bearer_auth(token),
        }
    }

    async fn execute(&self, rb: reqwest::RequestBuilder) -> Result<String, StoreError> {
        let response = rb
            .send()
            .await
            .map_err(|e| StoreError::Transport(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let code = response
                .headers()
                .get(EXCEPTION_CODE_HEADER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u32>().ok());
            let err_body = response.text().await.unwrap_or_default();
            return Err(StoreError::server(status.as_u16(), code, &err_body));
        }

        response
            .text()
            .await
            .map_err(|e| StoreError::Protocol(format!("Failed to read response body: {}", e)))
    }
}

/// Decodes a `FORMAT JSONCompact` response body.
pub fn parse_json_compact(body: &str) -> Result<QueryResult, StoreError> {
    let response: Value = serde_json::from_str(body)
        .map_err(|e| StoreError::Protocol(format!("Failed to parse JSON response: {}", e)))?;

    let mut columns = Vec::new();
    let mut column_types = Vec::new();
    if let Some(meta) = response.get("meta").and_then(|v| v.as_array()) {
        for col in meta {
            columns.push(
                col.get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
            );
            column_types.push(
                col.get("type")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
            );
        }
    }

    let mut rows = Vec::new();
    if let Some(data) = response.get("data").and_then(|v| v.as_array()) {
        for row in data {
            if let Some(arr) = row.as_array() {
                rows.push(arr.clone());
            }
        }
    }

    Ok(QueryResult {
        columns,
        column_types,
        rows,
    })
}

/// Builds the `INSERT` statement and `JSONCompactEachRow` body for a frame.
/// Positional frames omit the column list so values land by position.
pub fn build_insert_payload(
    table_ref: &str,
    frame: &TabularFrame,
) -> Result<(String, String), StoreError> {
    let columns_clause = if frame.header_derived() {
        format!(" ({})", quoted_column_list(&frame.column_names()))
    } else {
        String::new()
    };
    let statement = format!(
        "INSERT INTO {}{} FORMAT JSONCompactEachRow",
        table_ref, columns_clause
    );

    let mut body = String::new();
    for row in frame.json_rows() {
        let line = serde_json::to_string(&row)
            .map_err(|e| StoreError::Protocol(format!("Failed to encode insert row: {}", e)))?;
        body.push_str(&line);
        body.push('\n');
    }

    Ok((statement, body))
}

#[async_trait]
impl StoreSession for HttpSession {
    async fn ping(&self) -> Result<(), StoreError> {
        let result = self.query("SELECT 1", &[]).await?;
        let value = result.rows.first().and_then(|row| row.first());
        let alive = match value {
            Some(Value::Number(n)) => n.as_u64() == Some(1),
            Some(Value::String(s)) => s == "1",
            _ => false,
        };
        if alive {
            Ok(())
        } else {
            Err(StoreError::Protocol(
                "ClickHouse returned unexpected result during connection test".to_string(),
            ))
        }
    }

    async fn query(&self, sql: &str, params: &[(&str, &str)]) -> Result<QueryResult, StoreError> {
        let base_query = sql.trim().trim_end_matches(';');
        let query_with_format = format!("{} FORMAT JSONCompact", base_query);

        let bound = params
            .iter()
            .map(|(name, value)| (format!("param_{}", name), value.to_string()))
            .collect::<Vec<(String, String)>>();

        let body = self
            .execute(self.request().query(&bound).body(query_with_format))
            .await?;
        parse_json_compact(&body)
    }

    async fn command(&self, sql: &str) -> Result<(), StoreError> {
        self.execute(self.request().body(sql.trim().to_string()))
            .await
            .map(|_| ())
    }

    async fn insert_frame(&self, table_ref: &str, frame: &TabularFrame) -> Result<(), StoreError> {
        let (statement, body) = build_insert_payload(table_ref, frame)?;
        let rb = self
            .request()
            .query(&[
                ("query", statement.as_str()),
                ("insert_deduplicate", "0"),
                ("insert_distributed_sync", "1"),
                ("input_format_null_as_default", "1"),
            ])
            .body(body);
        self.execute(rb).await.map(|_| ())
    }

    async fn close(&self) -> Result<(), StoreError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            log::info!("ClickHouse connection closed.");
        }
        Ok(())
    }
}
