//! Error types for Dune Analytics operations.

use thiserror::Error;

use crate::execution::ExecutionState;

/// Result type for Dune Analytics operations.
pub type DuneResult<T> = Result<T, DuneError>;

/// Errors that can occur while talking to the Dune Analytics API.
#[derive(Debug, Error)]
pub enum DuneError {
    /// `DUNE_API_KEY` is missing or empty.
    #[error("DUNE_API_KEY environment variable is not set")]
    MissingApiKey,

    /// A configuration value could not be parsed.
    #[error("invalid configuration for {key}: {reason}")]
    InvalidConfig {
        /// Environment key holding the bad value
        key: String,
        /// Why it was rejected
        reason: String,
    },

    /// The requested chain is not one of the supported network names.
    #[error("unsupported chain '{name}'; supported: {supported}")]
    UnsupportedChain {
        /// Name as given by the caller
        name: String,
        /// Comma separated list of accepted names
        supported: String,
    },

    /// Transport-level failure (connect, timeout, TLS).
    #[error("HTTP error: {0}")]
    Http(String),

    /// Upstream answered with a non-success status.
    #[error("Dune API returned {status}: {body}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body, possibly empty
        body: String,
    },

    /// Response body was not the JSON we expected.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// Execute call succeeded but carried no execution id.
    #[error("Failed to start query execution")]
    MissingExecutionId,

    /// Execution ended in a terminal failure state.
    #[error("Query execution failed with state: {0}")]
    ExecutionFailed(ExecutionState),

    /// Status endpoint reported a state we do not know.
    #[error("Unknown query state: {0}")]
    UnknownState(String),

    /// Polling gave up before the execution completed.
    #[error("Query execution timed out after {attempts} status checks")]
    Timeout {
        /// Number of status polls performed
        attempts: u32,
    },

    /// Execution completed without returning any rows.
    #[error("Query completed but no data returned")]
    NoData,
}

impl DuneError {
    /// Returns true when the upstream reported 404 for the resource.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { status: 404, .. })
    }
}

impl From<reqwest::Error> for DuneError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Http(e.to_string())
        }
    }
}

impl From<serde_json::Error> for DuneError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}
