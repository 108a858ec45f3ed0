//! Library entry point for the Dune Analytics client.
//!
//! The crate is a thin, typed layer over the Dune REST API: a parameter
//! formatter ([`params`]), a query dispatcher ([`client`]) with the
//! execute/poll flow, keyword search for saved query ids ([`search`]) and a
//! few row aggregates ([`analysis`]). Responses stay as `serde_json::Value`
//! so callers can pass them straight through to an agent.
//!
//! ```rust,ignore
//! use dune_analytics::{Chain, DuneClient, DuneConfig, TrendParams};
//!
//! let client = DuneClient::new(DuneConfig::from_env()?)?;
//! let contracts = client.trending_contracts(&TrendParams::new(Chain::Base)).await?;
//! ```

pub mod analysis;
pub mod client;
pub mod config;
pub mod error;
pub mod execution;
pub mod params;
pub mod search;
pub mod transport;

// Re-export primary types for ergonomic use.
pub use analysis::{analyze, Analysis, AnalysisType};
pub use client::{DuneClient, LatestResult};
pub use config::DuneConfig;
pub use error::{DuneError, DuneResult};
pub use execution::{ExecuteOptions, ExecutionState, ResultPage};
pub use params::{clamp_limit, clamp_top_n, Chain, ResultParams, TrendParams};
pub use search::{QueryMatch, SearchOutcome, NO_RELEVANT_DATA};
pub use transport::{HttpTransport, ReqwestTransport};
