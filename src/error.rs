//! Error types for mc-router-dns-manager.

use thiserror::Error;

/// Errors raised by collaborators (DNS providers, mc-router, watchers).
///
/// The reconciliation engine itself never produces these for bad remote
/// data; an inconsistent observation is reported as "no observed state".
#[derive(Debug, Error)]
pub enum ManagerError {
    /// IO error (network, file, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status from a collaborator
    #[error("unexpected status {status} from {url}")]
    Status {
        /// Request URL.
        url: String,
        /// Response status code.
        status: u16,
    },

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// DNS provider API returned an error payload
    #[error("DNS provider error {code}: {message}")]
    Provider {
        /// Provider error code.
        code: String,
        /// Provider error message.
        message: String,
    },

    /// The configured domain does not exist in the provider account
    #[error("no zone named {0} in this account")]
    ZoneNotFound(String),

    /// Provider used before `init()` resolved its zone
    #[error("DNS provider not initialized")]
    NotInitialized,

    /// Response had an unexpected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ManagerError {
    /// Whether a single provider call failing with this error is worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ManagerError::Http(_) | ManagerError::Provider { .. } | ManagerError::Status { .. }
        )
    }
}

impl From<config::ConfigError> for ManagerError {
    fn from(e: config::ConfigError) -> Self {
        ManagerError::Config(e.to_string())
    }
}
