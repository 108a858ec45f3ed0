//! CLI for the Dune Analytics client.
//!
//! Subcommands:
//!  - `trending` / `analyze` : trending contracts on a chain, raw or aggregated.
//!  - `memecoins` / `users` / `channels` : Farcaster trends.
//!  - `results` : latest stored results of a saved query (re-run when stale),
//!    or every page with `--all`.
//!  - `run` : execute a saved query now and wait for it.
//!  - `search` : find query ids for a keyword.
//!
//! Output is a compact markdown table by default and pretty JSON with
//! `--json`. Logs go to stderr; set `RUST_LOG` or pass `--verbose`.
//!
//! Usage examples:
//!  cargo run -p dune-analytics-cli -- trending --chain base --limit 10
//!  cargo run -p dune-analytics-cli -- results --query-id 3493826 --json

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use dune_analytics::{
    analyze, clamp_top_n, AnalysisType, Chain, DuneClient, DuneConfig, ExecuteOptions,
    ResultParams, SearchOutcome, TrendParams,
};
use serde_json::{json, Map, Value};
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod table;

use crate::table::{render_rows, DEFAULT_CELL_CHARS};

/// CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "dune-analytics",
    about = "Dune Analytics CLI: trending contracts, Farcaster trends and query results",
    version
)]
struct Cli {
    /// Print pretty JSON instead of a table.
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging on stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Subcommands
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Trending contracts on a chain.
    Trending(TrendingArgs),

    /// Aggregate trending contracts on a chain.
    Analyze(AnalyzeArgs),

    /// Memecoins trending on Farcaster.
    Memecoins(PageArgs),

    /// Trending Farcaster users.
    Users(PageArgs),

    /// Trending Farcaster channels.
    Channels(PageArgs),

    /// Latest stored results of a saved query.
    Results(ResultsArgs),

    /// Execute a saved query and wait for fresh results.
    Run(RunArgs),

    /// Find query ids for a keyword (one retry with an alternate keyword).
    Search(SearchArgs),
}

/// Result-shaping flags shared by every data subcommand.
#[derive(Args, Debug, Default)]
struct PageArgs {
    /// Rows per page (clamped to 1..=100).
    #[arg(long)]
    limit: Option<u32>,

    /// Pagination cursor (row offset).
    #[arg(long)]
    offset: Option<u64>,

    /// ORDER BY style expression, passed through verbatim.
    #[arg(long)]
    sort_by: Option<String>,

    /// WHERE style filter clause, passed through verbatim.
    #[arg(long = "filter")]
    filter_clause: Option<String>,

    /// Comma separated columns to return.
    #[arg(long)]
    columns: Option<String>,
}

impl PageArgs {
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

#[derive(Args, Debug)]
struct TrendingArgs {
    /// Network name (ethereum, base, arbitrum, ...).
    #[arg(short, long)]
    chain: Chain,

    #[command(flatten)]
    page: PageArgs,
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// Network name (ethereum, base, arbitrum, ...).
    #[arg(short, long)]
    chain: Chain,

    /// token_standard | age_value | top_value
    #[arg(long, default_value = "token_standard")]
    analysis_type: AnalysisType,

    /// Rows listed by top_value (clamped to 1..=100).
    #[arg(long)]
    top_n: Option<usize>,

    #[command(flatten)]
    page: PageArgs,
}

#[derive(Args, Debug)]
struct ResultsArgs {
    /// Dune query id.
    #[arg(short, long)]
    query_id: u64,

    /// Follow next_offset through every page instead of returning one.
    #[arg(long)]
    all: bool,

    /// Stop collecting after this many rows (with --all).
    #[arg(long, default_value_t = 10_000)]
    max_rows: usize,

    #[command(flatten)]
    page: PageArgs,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Dune query id.
    #[arg(short, long)]
    query_id: u64,

    /// Query parameter as key=value. Repeatable.
    #[arg(long = "param", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    params: Vec<(String, String)>,

    /// Engine tier: medium or large.
    #[arg(long)]
    performance: Option<String>,

    #[command(flatten)]
    page: PageArgs,
}

#[derive(Args, Debug)]
struct SearchArgs {
    /// Keyword describing the data.
    keyword: String,

    /// Broader keyword to retry with if nothing is found.
    #[arg(long)]
    alternate: Option<String>,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty parameter name in '{raw}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Application entry point.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = DuneConfig::from_env().context("loading Dune configuration")?;
    let client = DuneClient::new(config).context("creating Dune client")?;

    let output = run(&client, cli.command).await?;
    print_output(&output, cli.json)
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("dune_analytics=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Dispatch one subcommand and return its JSON result.
async fn run(client: &DuneClient, command: Commands) -> Result<Value> {
    debug!(?command, "Dispatching");
    let value = match command {
        Commands::Trending(args) => {
            let params = TrendParams {
                chain: args.chain,
                results: args.page.to_params(),
            };
            client
                .trending_contracts(&params)
                .await
                .with_context(|| format!("fetching trending contracts on {}", args.chain))?
        }
        Commands::Analyze(args) => {
            let mut results = args.page.to_params();
            results.limit = Some(results.limit.unwrap_or(100));
            let body = client
                .trending_contracts(&TrendParams {
                    chain: args.chain,
                    results,
                })
                .await
                .with_context(|| format!("fetching trending contracts on {}", args.chain))?;
            let rows = rows_of(&body);
            let analysis = analyze(
                &rows,
                args.analysis_type,
                clamp_top_n(args.top_n),
                Utc::now(),
            );
            serde_json::to_value(analysis)?
        }
        Commands::Memecoins(page) => client.farcaster_memecoins(&page.to_params()).await?,
        Commands::Users(page) => client.farcaster_users(&page.to_params()).await?,
        Commands::Channels(page) => client.farcaster_channels(&page.to_params()).await?,
        Commands::Results(args) => {
            let params = args.page.to_params();
            if args.all {
                let rows = client
                    .fetch_all_pages(args.query_id, &params, args.max_rows)
                    .await
                    .with_context(|| format!("paging results of query {}", args.query_id))?;
                json!({
                    "query_id": args.query_id,
                    "row_count": rows.len(),
                    "result": { "rows": rows },
                })
            } else {
                let latest = client
                    .latest_result(args.query_id, &params)
                    .await
                    .with_context(|| format!("fetching results of query {}", args.query_id))?;
                json!({
                    "query_id": latest.query_id,
                    "refreshed": latest.refreshed,
                    "execution_started_at": latest.page.execution_started_at,
                    "next_offset": latest.page.next_offset,
                    "result": { "rows": latest.page.rows },
                })
            }
        }
        Commands::Run(args) => {
            let query_parameters = if args.params.is_empty() {
                None
            } else {
                Some(
                    args.params
                        .into_iter()
                        .map(|(k, v)| (k, Value::String(v)))
                        .collect::<Map<String, Value>>(),
                )
            };
            let options = ExecuteOptions {
                query_parameters,
                performance: args.performance,
            };
            let page = client
                .run_query(args.query_id, &options, &args.page.to_params())
                .await
                .with_context(|| format!("running query {}", args.query_id))?;
            json!({
                "query_id": args.query_id,
                "execution_id": page.execution_id,
                "next_offset": page.next_offset,
                "result": { "rows": page.rows },
            })
        }
        Commands::Search(args) => {
            let outcome = client
                .search_with_fallback(&args.keyword, args.alternate.as_deref())
                .await?;
            search_output(outcome)?
        }
    };
    Ok(value)
}

fn search_output(outcome: SearchOutcome) -> Result<Value> {
    let value = match outcome {
        SearchOutcome::Found {
            keyword,
            retried,
            matches,
        } => json!({
            "keyword": keyword,
            "retried": retried,
            "result": { "rows": matches },
        }),
        other => serde_json::to_value(other).context("encoding search outcome")?,
    };
    Ok(value)
}

fn rows_of(body: &Value) -> Vec<Value> {
    body.pointer("/result/rows")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn print_output(value: &Value, as_json: bool) -> Result<()> {
    if as_json || value.pointer("/result/rows").is_none() {
        println!("{}", serde_json::to_string_pretty(value)?);
        return Ok(());
    }

    if let Some(obj) = value.as_object() {
        for (key, v) in obj {
            if key != "result" && !v.is_null() {
                println!("- {key}: {v}");
            }
        }
        println!();
    }
    print!("{}", render_rows(&rows_of(value), DEFAULT_CELL_CHARS));
    Ok(())
}
