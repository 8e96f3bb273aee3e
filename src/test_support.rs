//! In-memory stand-in for a ClickHouse server, used by unit tests.

use crate::clickhouse::{codes, StoreConnector, StoreError, StoreSession};
use crate::data_transfer::frame::TabularFrame;
use crate::db_types::{ConnectionConfig, QueryResult};
use crate::error::TransferError;
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock, Mutex};
use tokio::sync::Barrier;

static TABLE_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^`([^`]+)`\.`([^`]+)`$").unwrap());
static SELECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^SELECT (.+) FROM (`[^`]+`\.`[^`]+`)$").unwrap());
static DESCRIBE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^DESCRIBE TABLE (`[^`]+`\.`[^`]+`)$").unwrap());
static CREATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^CREATE TABLE (`[^`]+`\.`[^`]+`) \((.*)\) ENGINE").unwrap());
static COLUMN_DEF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`([^`]+)` ([A-Za-z0-9]+)").unwrap());

#[derive(Debug, Clone, Default)]
pub struct FakeTable {
    pub columns: Vec<(String, String)>,
    pub rows: Vec<Vec<Value>>,
}

#[derive(Default)]
struct FakeState {
    tables: BTreeMap<(String, String), FakeTable>,
    statements: Vec<String>,
    insert_error: Option<StoreError>,
    connect_error: Option<String>,
}

/// Shared server state. Clones observe the same tables and counters.
#[derive(Clone, Default)]
pub struct FakeStore {
    state: Arc<Mutex<FakeState>>,
    connects: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
    existence_barrier: Option<Arc<Barrier>>,
}

fn unknown_table(database: &str, table: &str) -> StoreError {
    StoreError::server(
        404,
        Some(codes::UNKNOWN_TABLE),
        &format!(
            "Code: 60. DB::Exception: Table {}.{} does not exist. (UNKNOWN_TABLE)",
            database, table
        ),
    )
}

fn split_table_ref(table_ref: &str) -> Result<(String, String), StoreError> {
    TABLE_REF
        .captures(table_ref)
        .map(|caps| (caps[1].to_string(), caps[2].to_string()))
        .ok_or_else(|| StoreError::server(400, Some(62), "Syntax error: bad table reference"))
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes absent-table probes wait until `parties` sessions have probed.
    pub fn with_existence_barrier(mut self, parties: usize) -> Self {
        self.existence_barrier = Some(Arc::new(Barrier::new(parties)));
        self
    }

    pub fn add_table(&self, database: &str, table: &str, columns: &[(&str, &str)], rows: Vec<Vec<Value>>) {
        let table_def = FakeTable {
            columns: columns
                .iter()
                .map(|(name, ty)| (name.to_string(), ty.to_string()))
                .collect(),
            rows,
        };
        self.state
            .lock()
            .unwrap()
            .tables
            .insert((database.to_string(), table.to_string()), table_def);
    }

    pub fn table(&self, database: &str, table: &str) -> Option<FakeTable> {
        self.state
            .lock()
            .unwrap()
            .tables
            .get(&(database.to_string(), table.to_string()))
            .cloned()
    }

    pub fn fail_inserts_with(&self, err: StoreError) {
        self.state.lock().unwrap().insert_error = Some(err);
    }

    pub fn refuse_connections(&self, message: &str) {
        self.state.lock().unwrap().connect_error = Some(message.to_string());
    }

    pub fn statements(&self) -> Vec<String> {
        self.state.lock().unwrap().statements.clone()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn connector(&self) -> Arc<dyn StoreConnector> {
        Arc::new(FakeConnector {
            store: self.clone(),
        })
    }
}

pub struct FakeConnector {
    store: FakeStore,
}

#[async_trait]
impl StoreConnector for FakeConnector {
    async fn connect(
        &self,
        config: &ConnectionConfig,
    ) -> Result<Box<dyn StoreSession>, TransferError> {
        crate::clickhouse::validate_connection_config(config)?;
        crate::clickhouse::resolve_auth(config)?;
        self.store.connects.fetch_add(1, Ordering::SeqCst);

        if let Some(message) = self.store.state.lock().unwrap().connect_error.clone() {
            return Err(StoreError::Transport(message).into());
        }
        Ok(Box::new(FakeSession {
            store: self.store.clone(),
        }))
    }
}

pub struct FakeSession {
    store: FakeStore,
}

impl FakeSession {
    fn param<'a>(params: &[(&'a str, &'a str)], name: &str) -> String {
        params
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.to_string())
            .unwrap_or_default()
    }
}

#[async_trait]
impl StoreSession for FakeSession {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn query(&self, sql: &str, params: &[(&str, &str)]) -> Result<QueryResult, StoreError> {
        let mut state = self.store.state.lock().unwrap();
        state.statements.push(sql.to_string());

        if sql.contains("system.tables") {
            let database = Self::param(params, "database");
            let rows = state
                .tables
                .keys()
                .filter(|(db, _)| *db == database)
                .map(|(_, table)| vec![Value::String(table.clone())])
                .collect();
            return Ok(QueryResult {
                columns: vec!["name".into()],
                column_types: vec!["String".into()],
                rows,
            });
        }

        if sql.contains("system.columns") {
            let key = (Self::param(params, "database"), Self::param(params, "table"));
            let rows = state
                .tables
                .get(&key)
                .map(|table| {
                    table
                        .columns
                        .iter()
                        .map(|(name, ty)| vec![Value::String(name.clone()), Value::String(ty.clone())])
                        .collect()
                })
                .unwrap_or_default();
            return Ok(QueryResult {
                columns: vec!["name".into(), "type".into()],
                column_types: vec!["String".into(), "String".into()],
                rows,
            });
        }

        let caps = SELECT
            .captures(sql)
            .ok_or_else(|| StoreError::server(400, Some(62), "Syntax error"))?;
        let (database, table_name) = split_table_ref(&caps[2])?;
        let table = state
            .tables
            .get(&(database.clone(), table_name.clone()))
            .ok_or_else(|| unknown_table(&database, &table_name))?;

        let mut indices = Vec::new();
        let mut result = QueryResult::default();
        for column in caps[1].split(", ") {
            let name = column.trim_matches('`');
            let index = table
                .columns
                .iter()
                .position(|(candidate, _)| candidate == name)
                .ok_or_else(|| {
                    StoreError::server(
                        400,
                        Some(codes::UNKNOWN_IDENTIFIER),
                        &format!("Missing columns: '{}'", name),
                    )
                })?;
            indices.push(index);
            result.columns.push(table.columns[index].0.clone());
            result.column_types.push(table.columns[index].1.clone());
        }
        result.rows = table
            .rows
            .iter()
            .map(|row| indices.iter().map(|i| row[*i].clone()).collect())
            .collect();
        Ok(result)
    }

    async fn command(&self, sql: &str) -> Result<(), StoreError> {
        let barrier = {
            let mut state = self.store.state.lock().unwrap();
            state.statements.push(sql.to_string());

            if let Some(caps) = DESCRIBE.captures(sql) {
                let key = split_table_ref(&caps[1])?;
                if state.tables.contains_key(&key) {
                    return Ok(());
                }
                Some(unknown_table(&key.0, &key.1))
            } else if let Some(caps) = CREATE.captures(sql) {
                let key = split_table_ref(&caps[1])?;
                if state.tables.contains_key(&key) {
                    return Err(StoreError::server(
                        500,
                        Some(codes::TABLE_ALREADY_EXISTS),
                        &format!("Table {}.{} already exists. (TABLE_ALREADY_EXISTS)", key.0, key.1),
                    ));
                }
                let columns = COLUMN_DEF
                    .captures_iter(&caps[2])
                    .map(|c| (c[1].to_string(), c[2].to_string()))
                    .collect();
                state.tables.insert(
                    key,
                    FakeTable {
                        columns,
                        rows: Vec::new(),
                    },
                );
                return Ok(());
            } else {
                return Err(StoreError::server(400, Some(62), "Syntax error"));
            }
        };

        if let Some(missing) = barrier {
            if let Some(barrier) = &self.store.existence_barrier {
                barrier.wait().await;
            }
            return Err(missing);
        }
        Ok(())
    }

    async fn insert_frame(&self, table_ref: &str, frame: &TabularFrame) -> Result<(), StoreError> {
        let mut state = self.store.state.lock().unwrap();
        state.statements.push(format!("INSERT INTO {}", table_ref));

        if let Some(err) = state.insert_error.clone() {
            return Err(err);
        }

        let (database, table_name) = split_table_ref(table_ref)?;
        let table = state
            .tables
            .get_mut(&(database.clone(), table_name.clone()))
            .ok_or_else(|| unknown_table(&database, &table_name))?;

        let positions = if frame.header_derived() {
            frame
                .column_names()
                .iter()
                .map(|name| {
                    table
                        .columns
                        .iter()
                        .position(|(candidate, _)| candidate == name)
                        .ok_or_else(|| {
                            StoreError::server(
                                400,
                                Some(codes::NO_SUCH_COLUMN_IN_TABLE),
                                &format!("No such column {} in table {}", name, table_name),
                            )
                        })
                })
                .collect::<Result<Vec<usize>, StoreError>>()?
        } else {
            (0..frame.column_count()).collect()
        };

        let width = table.columns.len();
        for row in frame.json_rows() {
            let mut stored = vec![Value::Null; width];
            for (value, position) in row.into_iter().zip(&positions) {
                if *position < width {
                    stored[*position] = value;
                }
            }
            table.rows.push(stored);
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.store.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
