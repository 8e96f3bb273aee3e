// =====================================================
// COMMON STORE TYPES AND STRUCTURES
// =====================================================

use serde::{Deserialize, Serialize};
use std::fmt;

/// Ports on which ClickHouse serves its HTTP(S) interface.
pub const HTTP_PORTS: [u16; 2] = [8123, 8443];

// --- Credentials ---

/// How a session authenticates against the store.
///
/// A bearer token may travel together with a password. The password is only
/// used when the target port speaks the native protocol, where a token cannot
/// be carried as a transport header.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    Password(String),
    BearerToken {
        token: String,
        password: Option<String>,
    },
}

impl Credential {
    /// Builds a credential from the raw request fields. A token takes
    /// precedence over a password.
    pub fn from_parts(password: Option<String>, token: Option<String>) -> Option<Self> {
        let password = password.filter(|value| !value.is_empty());
        let token = token.filter(|value| !value.trim().is_empty());

        match (token, password) {
            (Some(token), password) => Some(Credential::BearerToken { token, password }),
            (None, Some(password)) => Some(Credential::Password(password)),
            (None, None) => None,
        }
    }

    pub fn method_label(&self) -> &'static str {
        match self {
            Credential::Password(_) => "password",
            Credential::BearerToken { .. } => "jwt",
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Password(_) => write!(f, "Password([REDACTED])"),
            Credential::BearerToken { password, .. } => write!(
                f,
                "BearerToken([REDACTED], password: {})",
                if password.is_some() { "[REDACTED]" } else { "none" }
            ),
        }
    }
}

// --- Connection Configuration ---
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub secure: bool,
    pub credential: Credential,
}

impl ConnectionConfig {
    pub fn is_http_port(&self) -> bool {
        HTTP_PORTS.contains(&self.port)
    }

    pub fn endpoint_label(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// --- Query Result ---
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub column_types: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

// --- Column Descriptor ---
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub native_type: String,
    pub selected: bool,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, native_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            native_type: native_type.into(),
            selected: true,
        }
    }
}
