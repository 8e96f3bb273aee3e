//! Failure taxonomy shared by discovery and transfer operations.

use serde::Serialize;
use thiserror::Error;

/// Message returned to callers in place of unclassified failures.
pub const UNEXPECTED_ERROR_MESSAGE: &str = "An unexpected server error occurred.";

/// Refinement of an insert failure, used for user messaging only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InsertFailureKind {
    TypeMismatch,
    UnknownColumn,
    Generic,
}

#[derive(Error, Debug)]
pub enum TransferError {
    /// Malformed or missing request parameters
    #[error("{0}")]
    Config(String),

    /// Credential or token rejected
    #[error("{0}")]
    Auth(String),

    /// Store unreachable, refused, or timed out
    #[error("{0}")]
    Network(String),

    /// Table, database or file absent
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Schema(String),

    #[error("Selected columns not found in file header: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    /// CREATE TABLE execution failed
    #[error("{0}")]
    Ddl(String),

    /// Output file could not be written
    #[error("{0}")]
    Write(String),

    #[error("{message}")]
    Insert {
        kind: InsertFailureKind,
        message: String,
    },

    /// The store rejected a read or metadata query
    #[error("{0}")]
    Store(String),

    /// Anything not covered above; never shown to the caller verbatim
    #[error("{0}")]
    Internal(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ConfigError,
    AuthError,
    NetworkError,
    NotFound,
    SchemaError,
    DdlError,
    WriteError,
    InsertError,
    StoreError,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorDescriptor {
    pub kind: ErrorKind,
    pub message: String,
}

impl TransferError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransferError::Config(_) => ErrorKind::ConfigError,
            TransferError::Auth(_) => ErrorKind::AuthError,
            TransferError::Network(_) => ErrorKind::NetworkError,
            TransferError::NotFound(_) => ErrorKind::NotFound,
            TransferError::Schema(_) | TransferError::MissingColumns(_) => ErrorKind::SchemaError,
            TransferError::Ddl(_) => ErrorKind::DdlError,
            TransferError::Write(_) => ErrorKind::WriteError,
            TransferError::Insert { .. } => ErrorKind::InsertError,
            TransferError::Store(_) => ErrorKind::StoreError,
            TransferError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Recognized outcomes are reported to the caller with their own message.
    pub fn is_expected(&self) -> bool {
        !matches!(self, TransferError::Internal(_))
    }

    pub fn user_message(&self) -> String {
        if self.is_expected() {
            self.to_string()
        } else {
            UNEXPECTED_ERROR_MESSAGE.to_string()
        }
    }

    pub fn descriptor(&self) -> ErrorDescriptor {
        ErrorDescriptor {
            kind: self.kind(),
            message: self.user_message(),
        }
    }
}

#[cfg(test)]
mod tests;
