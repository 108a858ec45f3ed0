//! Translation of high-level call arguments into Dune query-string parameters.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DuneError;

/// Rows per request when the caller does not say.
pub const DEFAULT_LIMIT: u32 = 20;
/// Hard ceiling on rows per request.
pub const MAX_LIMIT: u32 = 100;
/// Rows listed by a top-N analysis when the caller does not say.
pub const DEFAULT_TOP_N: usize = 5;
/// Hard ceiling on top-N analysis output.
pub const MAX_TOP_N: usize = 100;

/// Clamp a requested page size into `1..=MAX_LIMIT`.
pub fn clamp_limit(limit: Option<u32>) -> u32 {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

/// Clamp a requested top-N into `1..=MAX_TOP_N`.
pub fn clamp_top_n(top_n: Option<usize>) -> usize {
    top_n.unwrap_or(DEFAULT_TOP_N).clamp(1, MAX_TOP_N)
}

/// Networks the trending-contracts endpoint knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Chain {
    Ethereum,
    Arbitrum,
    Base,
    Bnb,
    Optimism,
    Polygon,
    Zksync,
    Zora,
    Scroll,
    Linea,
    Blast,
    AvalancheC,
    Gnosis,
    Celo,
    Fantom,
    Mantle,
}

impl Chain {
    const ALL: [Chain; 16] = [
        Chain::Ethereum,
        Chain::Arbitrum,
        Chain::Base,
        Chain::Bnb,
        Chain::Optimism,
        Chain::Polygon,
        Chain::Zksync,
        Chain::Zora,
        Chain::Scroll,
        Chain::Linea,
        Chain::Blast,
        Chain::AvalancheC,
        Chain::Gnosis,
        Chain::Celo,
        Chain::Fantom,
        Chain::Mantle,
    ];

    /// All supported chains in a stable order.
    pub fn supported() -> &'static [Chain] {
        &Self::ALL
    }

    /// Name used in the endpoint path.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ethereum => "ethereum",
            Self::Arbitrum => "arbitrum",
            Self::Base => "base",
            Self::Bnb => "bnb",
            Self::Optimism => "optimism",
            Self::Polygon => "polygon",
            Self::Zksync => "zksync",
            Self::Zora => "zora",
            Self::Scroll => "scroll",
            Self::Linea => "linea",
            Self::Blast => "blast",
            Self::AvalancheC => "avalanche_c",
            Self::Gnosis => "gnosis",
            Self::Celo => "celo",
            Self::Fantom => "fantom",
            Self::Mantle => "mantle",
        }
    }

    fn supported_list() -> String {
        Self::ALL
            .iter()
            .map(|c| c.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Chain {
    type Err = DuneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        let chain = match normalized.as_str() {
            "ethereum" | "eth" | "mainnet" => Self::Ethereum,
            "arbitrum" | "arb" => Self::Arbitrum,
            "base" => Self::Base,
            "bnb" | "bsc" | "binance" => Self::Bnb,
            "optimism" | "op" => Self::Optimism,
            "polygon" | "matic" => Self::Polygon,
            "zksync" => Self::Zksync,
            "zora" => Self::Zora,
            "scroll" => Self::Scroll,
            "linea" => Self::Linea,
            "blast" => Self::Blast,
            "avalanche_c" | "avalanche" | "avax" => Self::AvalancheC,
            "gnosis" => Self::Gnosis,
            "celo" => Self::Celo,
            "fantom" | "ftm" => Self::Fantom,
            "mantle" => Self::Mantle,
            _ => {
                return Err(DuneError::UnsupportedChain {
                    name: s.to_string(),
                    supported: Self::supported_list(),
                })
            }
        };
        Ok(chain)
    }
}

/// Result-shaping parameters shared by every results-style endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultParams {
    /// Rows per page; clamped on output.
    pub limit: Option<u32>,
    /// Pagination cursor (row offset).
    pub offset: Option<u64>,
    /// Comma separated column names to return.
    pub columns: Option<String>,
    /// Row filter expression, SQL WHERE style.
    pub filters: Option<String>,
    /// Ordering expression, SQL ORDER BY style.
    pub sort_by: Option<String>,
    /// Random sample size; mutually exclusive with limit/offset upstream.
    pub sample_count: Option<u32>,
    pub allow_partial_results: bool,
    pub ignore_max_datapoints_per_request: bool,
}

impl ResultParams {
    /// Parameters with only a limit set.
    pub fn with_limit(limit: u32) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    /// Effective page size after clamping.
    pub fn effective_limit(&self) -> u32 {
        clamp_limit(self.limit)
    }

    /// True when the request selects a subset of the stored rows.
    pub fn narrows_rows(&self) -> bool {
        non_empty(&self.filters).is_some() || self.offset.is_some_and(|o| o > 0)
    }

    /// Literal query-string pairs, in a stable order.
    ///
    /// Filter, sort and column strings are copied through untouched.
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();

        match self.sample_count {
            Some(sample) => pairs.push(("sample_count".to_string(), sample.to_string())),
            None => {
                pairs.push(("limit".to_string(), self.effective_limit().to_string()));
                if let Some(offset) = self.offset {
                    pairs.push(("offset".to_string(), offset.to_string()));
                }
            }
        }
        if let Some(columns) = non_empty(&self.columns) {
            pairs.push(("columns".to_string(), columns.to_string()));
        }
        if let Some(filters) = non_empty(&self.filters) {
            pairs.push(("filters".to_string(), filters.to_string()));
        }
        if let Some(sort_by) = non_empty(&self.sort_by) {
            pairs.push(("sort_by".to_string(), sort_by.to_string()));
        }
        if self.allow_partial_results {
            pairs.push(("allow_partial_results".to_string(), "true".to_string()));
        }
        if self.ignore_max_datapoints_per_request {
            pairs.push((
                "ignore_max_datapoints_per_request".to_string(),
                "true".to_string(),
            ));
        }

        pairs
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Arguments for the trending-contracts endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrendParams {
    pub chain: Chain,
    pub results: ResultParams,
}

impl TrendParams {
    pub fn new(chain: Chain) -> Self {
        Self {
            chain,
            results: ResultParams::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value_of<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
        pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn limit_is_clamped() {
        assert_eq!(clamp_limit(None), DEFAULT_LIMIT);
        assert_eq!(clamp_limit(Some(0)), 1);
        assert_eq!(clamp_limit(Some(50)), 50);
        assert_eq!(clamp_limit(Some(100)), 100);
        assert_eq!(clamp_limit(Some(101)), 100);
        assert_eq!(clamp_limit(Some(u32::MAX)), 100);
    }

    #[test]
    fn top_n_is_clamped() {
        assert_eq!(clamp_top_n(None), DEFAULT_TOP_N);
        assert_eq!(clamp_top_n(Some(0)), 1);
        assert_eq!(clamp_top_n(Some(1_000)), MAX_TOP_N);
    }

    #[test]
    fn chain_aliases_parse() {
        assert_eq!("Ethereum".parse::<Chain>().unwrap(), Chain::Ethereum);
        assert_eq!("bsc".parse::<Chain>().unwrap(), Chain::Bnb);
        assert_eq!("avalanche-c".parse::<Chain>().unwrap(), Chain::AvalancheC);
        assert_eq!(" base ".parse::<Chain>().unwrap(), Chain::Base);
        assert_eq!(Chain::AvalancheC.to_string(), "avalanche_c");
    }

    #[test]
    fn unknown_chain_lists_supported() {
        let err = "solana".parse::<Chain>().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("solana"));
        assert!(msg.contains("ethereum"));
        assert!(msg.contains("mantle"));
    }

    #[test]
    fn every_supported_chain_round_trips_through_its_name() {
        for chain in Chain::supported() {
            assert_eq!(chain.as_str().parse::<Chain>().unwrap(), *chain);
        }
    }

    #[test]
    fn sort_and_filter_pass_through_unmodified() {
        let params = ResultParams {
            limit: Some(500),
            offset: Some(40),
            filters: Some("token_standard = 'erc20' AND usd_value_received > 1e6".into()),
            sort_by: Some("usd_value_received desc, contract_address asc".into()),
            columns: Some("contract_address,usd_value_received".into()),
            ..ResultParams::default()
        };
        let pairs = params.to_query_pairs();
        assert_eq!(value_of(&pairs, "limit"), Some("100"));
        assert_eq!(value_of(&pairs, "offset"), Some("40"));
        assert_eq!(
            value_of(&pairs, "filters"),
            Some("token_standard = 'erc20' AND usd_value_received > 1e6")
        );
        assert_eq!(
            value_of(&pairs, "sort_by"),
            Some("usd_value_received desc, contract_address asc")
        );
        assert_eq!(
            value_of(&pairs, "columns"),
            Some("contract_address,usd_value_received")
        );
        assert_eq!(value_of(&pairs, "allow_partial_results"), None);
    }

    #[test]
    fn sampling_replaces_pagination() {
        let params = ResultParams {
            limit: Some(10),
            offset: Some(5),
            sample_count: Some(25),
            allow_partial_results: true,
            ignore_max_datapoints_per_request: true,
            ..ResultParams::default()
        };
        let pairs = params.to_query_pairs();
        assert_eq!(value_of(&pairs, "sample_count"), Some("25"));
        assert_eq!(value_of(&pairs, "limit"), None);
        assert_eq!(value_of(&pairs, "offset"), None);
        assert_eq!(value_of(&pairs, "allow_partial_results"), Some("true"));
        assert_eq!(
            value_of(&pairs, "ignore_max_datapoints_per_request"),
            Some("true")
        );
    }

    #[test]
    fn filters_and_offsets_narrow_rows() {
        assert!(!ResultParams::default().narrows_rows());
        assert!(!ResultParams {
            offset: Some(0),
            filters: Some(String::new()),
            ..ResultParams::default()
        }
        .narrows_rows());
        assert!(ResultParams {
            offset: Some(20),
            ..ResultParams::default()
        }
        .narrows_rows());
        assert!(ResultParams {
            filters: Some("chain = 'base'".into()),
            ..ResultParams::default()
        }
        .narrows_rows());
    }

    #[test]
    fn empty_strings_are_not_sent() {
        let params = ResultParams {
            filters: Some(String::new()),
            sort_by: Some(String::new()),
            ..ResultParams::default()
        };
        let pairs = params.to_query_pairs();
        assert_eq!(pairs, vec![("limit".to_string(), "20".to_string())]);
    }
}
