//! HTTP front end for discovery and transfer requests.

use crate::data_transfer::engine::TransferEngine;
use crate::data_transfer::models::{
    ColumnsSource, IngestResponse, RequestBody, TransferRequest, TransferResult,
};
use crate::db_types::ColumnDescriptor;
use crate::error::{ErrorKind, TransferError};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Shared state for HTTP endpoints.
pub struct ServerState {
    pub engine: TransferEngine,
}

#[derive(Debug, Serialize)]
pub struct TablesResponse {
    pub tables: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ColumnsResponse {
    pub columns: Vec<ColumnDescriptor>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    }
}

fn error_response(endpoint: &str, err: &TransferError) -> Response {
    if err.is_expected() {
        log::error!("Failed in {}: {}", endpoint, err);
    } else {
        log::error!("Unexpected error in {}: {:?}", endpoint, err);
    }
    (
        status_for(err.kind()),
        Json(ErrorResponse {
            error: err.user_message(),
        }),
    )
        .into_response()
}

fn read_body(payload: Result<Json<Value>, JsonRejection>) -> Result<RequestBody, TransferError> {
    let Json(body) = payload.map_err(|rejection| {
        TransferError::Config(format!("Invalid JSON body: {}", rejection.body_text()))
    })?;
    RequestBody::parse(body)
}

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/get_tables", post(get_tables_handler))
        .route("/get_columns", post(get_columns_handler))
        .route("/ingest", post(ingest_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Serves requests until the listener fails.
pub async fn serve(listener: TcpListener, state: Arc<ServerState>) -> Result<(), TransferError> {
    if let Ok(addr) = listener.local_addr() {
        log::info!("HTTP server listening on {}", addr);
    }
    axum::serve(listener, router(state))
        .await
        .map_err(|e| TransferError::Internal(format!("HTTP server error: {}", e)))
}

pub async fn get_tables_handler(
    State(state): State<Arc<ServerState>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    let outcome = async {
        let body = read_body(payload)?;
        let config = body.connection().validate()?;
        state.engine.list_tables(&config).await
    }
    .await;

    match outcome {
        Ok(tables) => Json(TablesResponse { tables }).into_response(),
        Err(e) => error_response("/get_tables", &e),
    }
}

pub async fn get_columns_handler(
    State(state): State<Arc<ServerState>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    let outcome = async {
        let source = ColumnsSource::from_body(read_body(payload)?)?;
        state.engine.describe_columns(&source).await
    }
    .await;

    match outcome {
        Ok(columns) => Json(ColumnsResponse { columns }).into_response(),
        Err(e) => error_response("/get_columns", &e),
    }
}

pub async fn ingest_handler(
    State(state): State<Arc<ServerState>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    let request = match read_body(payload).and_then(TransferRequest::from_body) {
        Ok(request) => request,
        Err(e) => {
            log::error!("Ingestion failed: {}", e);
            let failed = TransferResult::failed(0, &e);
            return (status_for(e.kind()), Json(IngestResponse::from(&failed))).into_response();
        }
    };

    let result = state.engine.execute(&request).await;
    let status = result
        .error
        .as_ref()
        .map(|e| status_for(e.kind))
        .unwrap_or(StatusCode::OK);
    (status, Json(IngestResponse::from(&result))).into_response()
}

pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}
