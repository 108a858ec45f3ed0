//! Execution lifecycle types and response decoding.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// State of a query execution as reported by the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ExecutionState {
    Pending,
    Executing,
    Completed,
    CompletedPartial,
    Failed,
    Cancelled,
    Expired,
    Error,
    /// Anything the API reports that we do not recognise.
    Other(String),
}

impl ExecutionState {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "QUERY_STATE_PENDING" => Self::Pending,
            "QUERY_STATE_EXECUTING" => Self::Executing,
            "QUERY_STATE_COMPLETED" => Self::Completed,
            "QUERY_STATE_COMPLETED_PARTIAL" => Self::CompletedPartial,
            "QUERY_STATE_FAILED" => Self::Failed,
            "QUERY_STATE_CANCELLED" | "QUERY_STATE_CANCELED" => Self::Cancelled,
            "QUERY_STATE_EXPIRED" => Self::Expired,
            "QUERY_STATE_ERROR" => Self::Error,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "QUERY_STATE_PENDING",
            Self::Executing => "QUERY_STATE_EXECUTING",
            Self::Completed => "QUERY_STATE_COMPLETED",
            Self::CompletedPartial => "QUERY_STATE_COMPLETED_PARTIAL",
            Self::Failed => "QUERY_STATE_FAILED",
            Self::Cancelled => "QUERY_STATE_CANCELLED",
            Self::Expired => "QUERY_STATE_EXPIRED",
            Self::Error => "QUERY_STATE_ERROR",
            Self::Other(raw) => raw,
        }
    }

    /// Results can be fetched.
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Completed | Self::CompletedPartial)
    }

    /// Still waiting on the engine.
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Pending | Self::Executing)
    }

    /// Terminal without results.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::Failed | Self::Cancelled | Self::Expired | Self::Error
        )
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ExecutionState {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

/// Optional body for the execute endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecuteOptions {
    /// Named query parameters, sent as `query_parameters`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_parameters: Option<Map<String, Value>>,
    /// Engine tier: `medium` or `large`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performance: Option<String>,
}

impl ExecuteOptions {
    pub fn to_body(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Map::new()))
    }
}

/// Response of the execute endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecuteResponse {
    pub execution_id: Option<String>,
    pub state: Option<ExecutionState>,
}

/// Response of the status endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusResponse {
    pub execution_id: Option<String>,
    pub state: ExecutionState,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawResult {
    #[serde(default)]
    rows: Vec<Value>,
    #[serde(default)]
    metadata: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawResultPage {
    execution_id: Option<String>,
    query_id: Option<u64>,
    state: Option<ExecutionState>,
    execution_started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    result: Option<RawResult>,
    next_offset: Option<u64>,
}

/// One page of query results, normalised from any results-style endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ResultPage {
    pub execution_id: Option<String>,
    pub query_id: Option<u64>,
    pub state: Option<ExecutionState>,
    pub execution_started_at: Option<DateTime<Utc>>,
    pub rows: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    pub next_offset: Option<u64>,
}

impl ResultPage {
    /// Decode a results body. Missing `result` yields an empty page.
    pub fn from_value(body: Value) -> Result<Self, serde_json::Error> {
        let raw: RawResultPage = serde_json::from_value(body)?;
        let result = raw.result.unwrap_or_default();
        Ok(Self {
            execution_id: raw.execution_id,
            query_id: raw.query_id,
            state: raw.state,
            execution_started_at: raw.execution_started_at,
            rows: result.rows,
            metadata: result.metadata,
            next_offset: raw.next_offset,
        })
    }

    /// Age of the execution relative to `now`, if known.
    pub fn age_at(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.execution_started_at.map(|started| now - started)
    }

    /// Rows in the whole stored result before filters and paging, if reported.
    pub fn total_row_count(&self) -> Option<u64> {
        self.metadata
            .as_ref()?
            .get("total_row_count")
            .and_then(Value::as_u64)
    }
}
