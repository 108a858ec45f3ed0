// Rust guideline compliant 2026-10-17

use chrono::Utc;
use dune_analytics::{
    analyze, clamp_top_n, AnalysisType, Chain, DuneClient, ExecuteOptions, ResultPage,
    ResultParams, TrendParams,
};
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    schemars,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Shared result-shaping options.
#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
pub struct PageOptions {
    #[schemars(description = "Rows per page (default: 20, max: 100)")]
    pub limit: Option<u32>,
    #[schemars(description = "Pagination cursor: pass the previous response's next_offset")]
    pub offset: Option<u64>,
    #[schemars(description = "SQL ORDER BY style expression, e.g. `usd_value_received desc`")]
    pub sort_by: Option<String>,
    #[schemars(description = "SQL WHERE style filter clause, e.g. `token_standard = 'erc20'`")]
    pub filter_clause: Option<String>,
    #[schemars(description = "Comma separated columns to return")]
    pub columns: Option<String>,
}

impl PageOptions {
    fn to_params(&self) -> ResultParams {
        ResultParams {
            limit: self.limit,
            offset: self.offset,
            columns: self.columns.clone(),
            filters: self.filter_clause.clone(),
            sort_by: self.sort_by.clone(),
            ..ResultParams::default()
        }
    }
}

/// Input for trending contracts on one chain.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct TrendingContractsInput {
    #[schemars(description = "Network name, e.g. ethereum, base, arbitrum, optimism, polygon, bnb")]
    pub chain: String,
    #[serde(flatten)]
    pub page: PageOptions,
}

/// Input for aggregate analysis of trending contracts.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct AnalyzeContractsInput {
    #[schemars(description = "Network name, e.g. ethereum, base, arbitrum")]
    pub chain: String,
    #[schemars(description = "token_standard | age_value | top_value (default: token_standard)")]
    pub analysis_type: Option<String>,
    #[schemars(description = "Rows listed by top_value (default: 5, max: 100)")]
    pub top_n: Option<usize>,
    #[serde(flatten)]
    pub page: PageOptions,
}

/// Input for the Farcaster trend tools.
#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
pub struct FarcasterInput {
    #[serde(flatten)]
    pub page: PageOptions,
}

/// Input for stored results of a saved query.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct LatestResultInput {
    #[schemars(description = "Dune query id")]
    pub query_id: u64,
    #[serde(flatten)]
    pub page: PageOptions,
}

/// Input for executing a saved query.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct RunQueryInput {
    #[schemars(description = "Dune query id")]
    pub query_id: u64,
    #[schemars(description = "Named query parameters as a JSON object")]
    pub query_parameters: Option<Map<String, Value>>,
    #[schemars(description = "Engine tier: medium or large")]
    pub performance: Option<String>,
    #[serde(flatten)]
    pub page: PageOptions,
}

/// Input for keyword search of saved query ids.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SearchQueryIdsInput {
    #[schemars(description = "Short keyword describing the data, e.g. `uniswap daily volume`")]
    pub keyword: String,
    #[schemars(description = "Broader keyword to retry with once if nothing is found")]
    pub alternate_keyword: Option<String>,
}

/// MCP server exposing Dune Analytics endpoints as tools.
#[derive(Clone)]
pub struct DuneAnalyticsMcpServer {
    client: DuneClient,
    pub tool_router: ToolRouter<Self>,
}

#[rmcp::tool_router]
impl DuneAnalyticsMcpServer {
    /// Construct a new server instance over a configured client.
    pub fn new(client: DuneClient) -> Self {
        Self {
            client,
            tool_router: Self::tool_router(),
        }
    }

    /// Trending contracts on a chain.
    #[rmcp::tool(description = "Fetch trending smart contracts on a chain (JSON rows, paginated)")]
    async fn get_trending_contracts(
        &self,
        Parameters(input): Parameters<TrendingContractsInput>,
    ) -> String {
        render(self.trending_contracts_impl(input).await)
    }

    /// Aggregates over trending contracts.
    #[rmcp::tool(
        description = "Summarise trending contracts on a chain: counts by token standard, age-vs-value buckets, or top contracts by value"
    )]
    async fn analyze_trending_contracts(
        &self,
        Parameters(input): Parameters<AnalyzeContractsInput>,
    ) -> String {
        render(self.analyze_contracts_impl(input).await)
    }

    #[rmcp::tool(description = "Fetch memecoins trending on Farcaster")]
    async fn get_farcaster_memecoins(
        &self,
        Parameters(input): Parameters<FarcasterInput>,
    ) -> String {
        render(self.client.farcaster_memecoins(&input.page.to_params()).await)
    }

    #[rmcp::tool(description = "Fetch trending Farcaster users")]
    async fn get_farcaster_users(&self, Parameters(input): Parameters<FarcasterInput>) -> String {
        render(self.client.farcaster_users(&input.page.to_params()).await)
    }

    #[rmcp::tool(description = "Fetch trending Farcaster channels")]
    async fn get_farcaster_channels(
        &self,
        Parameters(input): Parameters<FarcasterInput>,
    ) -> String {
        render(self.client.farcaster_channels(&input.page.to_params()).await)
    }

    /// Stored results, re-run when stale.
    #[rmcp::tool(
        description = "Get the latest results of a Dune query id; re-runs the query if stored results are missing or older than 8 hours"
    )]
    async fn get_latest_result(
        &self,
        Parameters(input): Parameters<LatestResultInput>,
    ) -> String {
        render(
            self.client
                .latest_result(input.query_id, &input.page.to_params())
                .await,
        )
    }

    /// Fresh execution; slow.
    #[rmcp::tool(
        description = "Execute a Dune query id now and wait for fresh results (slow; prefer get_latest_result)"
    )]
    async fn run_query(&self, Parameters(input): Parameters<RunQueryInput>) -> String {
        let options = ExecuteOptions {
            query_parameters: input.query_parameters,
            performance: input.performance,
        };
        render(
            self.client
                .run_query(input.query_id, &options, &input.page.to_params())
                .await
                .map(page_summary),
        )
    }

    /// Keyword search with a single fallback.
    #[rmcp::tool(
        description = "Find Dune query ids for a keyword; retries once with an alternate keyword before reporting no relevant data"
    )]
    async fn search_query_ids(
        &self,
        Parameters(input): Parameters<SearchQueryIdsInput>,
    ) -> String {
        render(
            self.client
                .search_with_fallback(&input.keyword, input.alternate_keyword.as_deref())
                .await,
        )
    }
}

impl DuneAnalyticsMcpServer {
    async fn trending_contracts_impl(
        &self,
        input: TrendingContractsInput,
    ) -> anyhow::Result<Value> {
        let chain: Chain = input.chain.parse()?;
        let params = TrendParams {
            chain,
            results: input.page.to_params(),
        };
        Ok(self.client.trending_contracts(&params).await?)
    }

    async fn analyze_contracts_impl(&self, input: AnalyzeContractsInput) -> anyhow::Result<Value> {
        let chain: Chain = input.chain.parse()?;
        let analysis_type = match input.analysis_type.as_deref() {
            Some(raw) => raw.parse::<AnalysisType>().map_err(anyhow::Error::msg)?,
            None => AnalysisType::default(),
        };
        let top_n = clamp_top_n(input.top_n);

        let mut results = input.page.to_params();
        // Analysis works on one full page unless the caller narrows it.
        results.limit = Some(results.limit.unwrap_or(100));
        let body = self
            .client
            .trending_contracts(&TrendParams { chain, results })
            .await?;
        let rows = body
            .pointer("/result/rows")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let analysis = analyze(&rows, analysis_type, top_n, Utc::now());
        let mut out = serde_json::to_value(analysis)?;
        if let Value::Object(map) = &mut out {
            map.insert("chain".to_string(), json!(chain.as_str()));
            let next_offset = body.get("next_offset").cloned().unwrap_or(Value::Null);
            map.insert("next_offset".to_string(), next_offset);
        }
        Ok(out)
    }
}

fn page_summary(page: ResultPage) -> Value {
    json!({
        "execution_id": page.execution_id,
        "query_id": page.query_id,
        "row_count": page.rows.len(),
        "rows": page.rows,
        "next_offset": page.next_offset,
    })
}

/// Pretty JSON on success, `Error: ...` otherwise.
fn render<T, E>(result: Result<T, E>) -> String
where
    T: Serialize,
    E: std::fmt::Display,
{
    match result {
        Ok(value) => serde_json::to_string_pretty(&value)
            .unwrap_or_else(|err| format!("Error: failed to encode response: {err}")),
        Err(err) => format!("Error: {err}"),
    }
}
