//! Query dispatcher for the Dune Analytics REST API.
//!
//! Each method maps to one endpoint: it formats the parameters, issues the
//! request through the configured [`HttpTransport`] and hands back the parsed
//! body. `run_query` and `latest_result` add the execute/poll flow on top.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::DuneConfig;
use crate::error::{DuneError, DuneResult};
use crate::execution::{ExecuteOptions, ExecuteResponse, ResultPage, StatusResponse};
use crate::params::{ResultParams, TrendParams, MAX_LIMIT};
use crate::transport::{HttpTransport, ReqwestTransport};

/// Latest results for a saved query, with whether they had to be recomputed.
#[derive(Debug, Clone, Serialize)]
pub struct LatestResult {
    pub query_id: u64,
    /// True when the cached result was missing or stale and the query was re-run.
    pub refreshed: bool,
    #[serde(flatten)]
    pub page: ResultPage,
}

#[derive(Clone)]
pub struct DuneClient {
    transport: Arc<dyn HttpTransport>,
    config: DuneConfig,
}

impl DuneClient {
    /// Client talking to the real API.
    pub fn new(config: DuneConfig) -> DuneResult<Self> {
        let transport = ReqwestTransport::new(&config)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Client over an arbitrary transport.
    pub fn with_transport(config: DuneConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &DuneConfig {
        &self.config
    }

    pub(crate) fn transport(&self) -> &dyn HttpTransport {
        self.transport.as_ref()
    }

    /// Trending contracts on one chain.
    pub async fn trending_contracts(&self, params: &TrendParams) -> DuneResult<Value> {
        let path = format!("/trends/evm/contracts/{}", params.chain.as_str());
        self.get(&path, &params.results).await
    }

    /// Trending memecoins discussed on Farcaster.
    pub async fn farcaster_memecoins(&self, params: &ResultParams) -> DuneResult<Value> {
        self.get("/farcaster/trends/memecoins", params).await
    }

    /// Trending Farcaster users.
    pub async fn farcaster_users(&self, params: &ResultParams) -> DuneResult<Value> {
        self.get("/farcaster/trends/users", params).await
    }

    /// Trending Farcaster channels.
    pub async fn farcaster_channels(&self, params: &ResultParams) -> DuneResult<Value> {
        self.get("/farcaster/trends/channels", params).await
    }

    /// Most recent stored results of a saved query, as returned upstream.
    pub async fn query_results(
        &self,
        query_id: u64,
        params: &ResultParams,
    ) -> DuneResult<ResultPage> {
        let body = self.get(&format!("/query/{query_id}/results"), params).await?;
        Ok(ResultPage::from_value(body)?)
    }

    /// Start a new execution of a saved query; returns the execution id.
    pub async fn execute_query(
        &self,
        query_id: u64,
        options: &ExecuteOptions,
    ) -> DuneResult<String> {
        let body = self
            .transport
            .post_json(&format!("/query/{query_id}/execute"), &options.to_body())
            .await?;
        let response: ExecuteResponse = serde_json::from_value(body)?;
        let execution_id = response
            .execution_id
            .filter(|id| !id.is_empty())
            .ok_or(DuneError::MissingExecutionId)?;
        info!(query_id, execution_id = %execution_id, "Query execution started");
        Ok(execution_id)
    }

    pub async fn execution_status(&self, execution_id: &str) -> DuneResult<StatusResponse> {
        let body = self
            .transport
            .get_json(&format!("/execution/{execution_id}/status"), &[])
            .await?;
        Ok(serde_json::from_value(body)?)
    }

    pub async fn execution_results(
        &self,
        execution_id: &str,
        params: &ResultParams,
    ) -> DuneResult<ResultPage> {
        let body = self
            .get(&format!("/execution/{execution_id}/results"), params)
            .await?;
        Ok(ResultPage::from_value(body)?)
    }

    /// Poll until the execution completes, fails, or runs out of attempts.
    pub async fn wait_for_completion(&self, execution_id: &str) -> DuneResult<()> {
        let max_attempts = self.config.max_poll_attempts.max(1);
        for attempt in 1..=max_attempts {
            let status = self.execution_status(execution_id).await?;
            if status.state.is_complete() {
                debug!(execution_id, attempt, "Execution completed");
                return Ok(());
            }
            if status.state.is_failure() {
                return Err(DuneError::ExecutionFailed(status.state));
            }
            if !status.state.is_running() {
                return Err(DuneError::UnknownState(status.state.to_string()));
            }
            debug!(execution_id, attempt, state = %status.state, "Execution still running");
            if attempt < max_attempts {
                sleep(self.config.poll_interval).await;
            }
        }
        Err(DuneError::Timeout {
            attempts: max_attempts,
        })
    }

    /// Execute a saved query, wait for it, and return the first results page.
    pub async fn run_query(
        &self,
        query_id: u64,
        options: &ExecuteOptions,
        params: &ResultParams,
    ) -> DuneResult<ResultPage> {
        let execution_id = self.execute_query(query_id, options).await?;
        self.wait_for_completion(&execution_id).await?;

        let mut page = self.execution_results(&execution_id, params).await?;
        if page.rows.is_empty() {
            return Err(DuneError::NoData);
        }
        if page.execution_id.is_none() {
            page.execution_id = Some(execution_id);
        }
        if page.query_id.is_none() {
            page.query_id = Some(query_id);
        }
        Ok(page)
    }

    /// Stored results for a query, re-running it when they are missing or stale.
    pub async fn latest_result(
        &self,
        query_id: u64,
        params: &ResultParams,
    ) -> DuneResult<LatestResult> {
        let cached = match self.query_results(query_id, params).await {
            Ok(page) => Some(page),
            Err(e) if e.is_not_found() => {
                warn!(query_id, "No stored results, running query");
                None
            }
            Err(e) => return Err(e),
        };

        if let Some(page) = cached {
            match self.staleness(&page, params) {
                None => {
                    return Ok(LatestResult {
                        query_id,
                        refreshed: false,
                        page,
                    })
                }
                Some(reason) => warn!(query_id, reason, "Stored results unusable, running query"),
            }
        }

        let page = self
            .run_query(query_id, &ExecuteOptions::default(), params)
            .await?;
        Ok(LatestResult {
            query_id,
            refreshed: true,
            page,
        })
    }

    /// Why a stored page cannot be served, or `None` when it is fresh.
    ///
    /// Emptiness is judged on the whole stored result: a filter or offset
    /// that selects no rows does not make the cache empty.
    fn staleness(&self, page: &ResultPage, params: &ResultParams) -> Option<&'static str> {
        let Some(age) = page.age_at(Utc::now()) else {
            return Some("no execution timestamp");
        };
        if page.rows.is_empty() {
            let stored_empty = match page.total_row_count() {
                Some(total) => total == 0,
                None => !params.narrows_rows(),
            };
            if stored_empty {
                return Some("empty result");
            }
        }
        // Negative ages (clock skew) count as fresh.
        match age.to_std() {
            Ok(age) if age >= self.config.stale_after => Some("stale result"),
            _ => None,
        }
    }

    /// Follow `next_offset` through the stored results of a query.
    ///
    /// Pages are at most 100 rows; collection stops at `max_rows`.
    pub async fn fetch_all_pages(
        &self,
        query_id: u64,
        params: &ResultParams,
        max_rows: usize,
    ) -> DuneResult<Vec<Value>> {
        let mut params = params.clone();
        params.sample_count = None;
        let page_size = params.effective_limit().min(MAX_LIMIT);
        params.limit = Some(page_size);

        let mut rows = Vec::new();
        loop {
            let page = self.query_results(query_id, &params).await?;
            let fetched = page.rows.len();
            rows.extend(page.rows);

            if rows.len() >= max_rows {
                rows.truncate(max_rows);
                break;
            }
            match page.next_offset {
                Some(next) if fetched >= page_size as usize && fetched > 0 => {
                    debug!(query_id, offset = next, "Fetching next page of results");
                    params.offset = Some(next);
                }
                _ => break,
            }
        }

        if rows.is_empty() {
            return Err(DuneError::NoData);
        }
        Ok(rows)
    }

    async fn get(&self, path: &str, params: &ResultParams) -> DuneResult<Value> {
        self.transport.get_json(path, &params.to_query_pairs()).await
    }
}

async fn sleep(interval: Duration) {
    if !interval.is_zero() {
        tokio::time::sleep(interval).await;
    }
}
