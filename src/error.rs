//! Error types for statuslink.

use serde::Serialize;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Status app error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a request never got a reply from the Status app.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnreachableReason {
    Timeout,
    ConnectionRefused,
    Dns,
    Other,
}

impl UnreachableReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::ConnectionRefused => "connection_refused",
            Self::Dns => "dns_failure",
            Self::Other => "connect_failure",
        }
    }
}

/// Errors from the Status app control API.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("Status app at {endpoint} is unreachable ({}): {detail}", .reason.as_str())]
    Unreachable {
        endpoint: String,
        reason: UnreachableReason,
        detail: String,
    },

    #[error("Status app rejected {operation}: {message}")]
    Rejected {
        operation: &'static str,
        status: Option<u16>,
        message: String,
    },

    #[error("Status app does not know network {id}: {message}")]
    UnknownNetwork { id: String, message: String },

    #[error("Status app returned a bad response to {operation}: {reason}")]
    MalformedResponse {
        operation: &'static str,
        reason: String,
    },

    #[error("HTTP client init failed: {0}")]
    Client(String),
}

impl RemoteError {
    /// Collapse the error into the failure taxonomy used for retry and logging.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Unreachable { .. } | Self::Client(_) => FailureKind::RemoteUnreachable,
            Self::Rejected { .. } | Self::UnknownNetwork { .. } => FailureKind::RemoteRejected,
            Self::MalformedResponse { .. } => FailureKind::MalformedResponse,
        }
    }

    pub fn is_unreachable(&self) -> bool {
        self.kind() == FailureKind::RemoteUnreachable
    }

    /// Message the Status app attached to a rejection, or the error text.
    pub fn remote_message(&self) -> String {
        match self {
            Self::Rejected { message, .. } | Self::UnknownNetwork { message, .. } => {
                message.clone()
            }
            other => other.to_string(),
        }
    }
}

/// Local persistence errors for the network id store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to create state directory {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write network id to {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from the local chain's JSON-RPC endpoint.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("Chain RPC at {url} is not answering: {detail}")]
    Unavailable { url: String, detail: String },

    #[error("Chain RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Chain reported an unusable network id: {0}")]
    InvalidNetworkId(String),

    #[error("HTTP client init failed: {0}")]
    Client(String),
}

/// Failure classes a reconciliation attempt can end in. Every class is
/// retried on the next scheduler tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    RemoteUnreachable,
    RemoteRejected,
    MalformedResponse,
    StorageError,
    InvalidSettings,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RemoteUnreachable => "remote_unreachable",
            Self::RemoteRejected => "remote_rejected",
            Self::MalformedResponse => "malformed_response",
            Self::StorageError => "storage_error",
            Self::InvalidSettings => "invalid_settings",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
