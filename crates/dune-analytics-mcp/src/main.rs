// Rust guideline compliant 2026-10-17

mod tools;

use anyhow::Context;
use dune_analytics::{DuneClient, DuneConfig};
use rmcp::{model::*, tool_handler, transport::stdio, ServerHandler, ServiceExt};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::tools::DuneAnalyticsMcpServer;

/// Tool-selection guidance handed to the calling agent.
const INSTRUCTIONS: &str = "Dune Analytics MCP Server: on-chain and Farcaster data from Dune. \
Use get_trending_contracts / analyze_trending_contracts for contract activity on a chain, \
get_farcaster_memecoins / get_farcaster_users / get_farcaster_channels for social trends. \
For any other topic, call search_query_ids with a short keyword; if nothing is found it retries \
once with a broader keyword you may supply as `alternate_keyword`, and if that also fails \
report that no relevant data was found instead of guessing. Prefer get_latest_result over \
run_query since stored results are returned immediately. Keep `limit` small (max 100) and page \
with `offset` using the returned next_offset.";

#[tool_handler]
impl ServerHandler for DuneAnalyticsMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(INSTRUCTIONS.into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the MCP protocol; logs go to stderr.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_ansi(false))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("dune_analytics=info,dune_analytics_mcp=info")),
        )
        .init();

    let config = DuneConfig::from_env().context("loading Dune configuration")?;
    let client = DuneClient::new(config).context("creating Dune client")?;
    info!(base_url = %client.config().base_url, "Starting Dune Analytics MCP server on stdio");

    let service = DuneAnalyticsMcpServer::new(client).serve(stdio()).await?;
    service.waiting().await?;
    Ok(())
}
