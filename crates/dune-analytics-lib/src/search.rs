//! Keyword search for saved query ids.
//!
//! Dune has no search endpoint in its public API, so this fetches the public
//! discover page and pulls query links out of the markup. A search that finds
//! nothing is retried once with an alternate keyword before giving up.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::client::DuneClient;
use crate::error::DuneResult;

/// Message reported when neither keyword finds anything.
pub const NO_RELEVANT_DATA: &str = "no relevant data found";

/// Most ids returned from one search.
pub const MAX_MATCHES: usize = 10;

/// An anchor linking to a saved query: id and inner markup.
static QUERY_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<a\b[^>]*?href="(?:https://dune\.com)?/queries/(\d+)[^"]*"[^>]*>(.*?)</a>"#)
        .expect("valid query link regex")
});

static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid tag regex"));

/// One query found on the discover page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryMatch {
    pub query_id: u64,
    /// Visible link text, when the page carried any.
    pub title: Option<String>,
    pub url: String,
}

/// Outcome of a search with keyword fallback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SearchOutcome {
    Found {
        keyword: String,
        retried: bool,
        matches: Vec<QueryMatch>,
    },
    NotFound {
        tried: Vec<String>,
        message: String,
    },
}

impl SearchOutcome {
    /// Number of discover-page requests the search made.
    pub fn attempts(&self) -> usize {
        match self {
            Self::Found { retried, .. } => 1 + usize::from(*retried),
            Self::NotFound { tried, .. } => tried.len(),
        }
    }
}

/// Query-string pairs for the discover page.
pub fn discover_params(keyword: &str) -> Vec<(String, String)> {
    vec![
        ("q".to_string(), keyword.to_string()),
        ("resource-type".to_string(), "queries".to_string()),
        ("publicness".to_string(), "public".to_string()),
        ("sort-by".to_string(), "relevance".to_string()),
    ]
}

/// Unique queries linked from `html`, in page order, with their link text.
///
/// A query linked more than once keeps the first non-empty title.
pub fn extract_query_ids(html: &str, max: usize) -> Vec<QueryMatch> {
    let mut out: Vec<QueryMatch> = Vec::new();
    for cap in QUERY_LINK.captures_iter(html) {
        let Ok(query_id) = cap[1].parse::<u64>() else {
            continue;
        };
        let title = link_text(&cap[2]);
        if let Some(existing) = out.iter_mut().find(|m| m.query_id == query_id) {
            if existing.title.is_none() {
                existing.title = title;
            }
            continue;
        }
        if out.len() >= max {
            break;
        }
        out.push(QueryMatch {
            query_id,
            title,
            url: format!("https://dune.com/queries/{query_id}"),
        });
    }
    out
}

/// Plain text of an anchor's inner markup, whitespace collapsed.
fn link_text(markup: &str) -> Option<String> {
    let text = TAG.replace_all(markup, " ");
    let text = text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&");
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Broader variant of a multi-word keyword: the trailing word is dropped.
pub fn alternate_keyword(keyword: &str) -> Option<String> {
    let words: Vec<&str> = keyword.split_whitespace().collect();
    if words.len() < 2 {
        return None;
    }
    Some(words[..words.len() - 1].join(" "))
}

impl DuneClient {
    /// Query ids matching one keyword.
    pub async fn search_query_ids(&self, keyword: &str) -> DuneResult<Vec<QueryMatch>> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Ok(Vec::new());
        }
        debug!(keyword, "Searching discover page");
        let html = self
            .transport()
            .get_text(&self.config().discover_url, &discover_params(keyword))
            .await?;
        Ok(extract_query_ids(&html, MAX_MATCHES))
    }

    /// Search `keyword`; on no match, retry at most once with `alternate`
    /// (or a derived broader keyword).
    pub async fn search_with_fallback(
        &self,
        keyword: &str,
        alternate: Option<&str>,
    ) -> DuneResult<SearchOutcome> {
        let primary = keyword.trim().to_string();
        let matches = self.search_query_ids(&primary).await?;
        if !matches.is_empty() {
            return Ok(SearchOutcome::Found {
                keyword: primary,
                retried: false,
                matches,
            });
        }

        let fallback = alternate
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .or_else(|| alternate_keyword(&primary))
            .filter(|a| !a.eq_ignore_ascii_case(&primary));

        if let Some(fallback) = &fallback {
            warn!(
                keyword = %primary,
                alternate = %fallback,
                "No queries found, retrying with alternate keyword"
            );
        }
        let mut tried = vec![primary];
        if let Some(fallback) = fallback {
            let matches = self.search_query_ids(&fallback).await?;
            if !matches.is_empty() {
                return Ok(SearchOutcome::Found {
                    keyword: fallback,
                    retried: true,
                    matches,
                });
            }
            tried.push(fallback);
        }

        Ok(SearchOutcome::NotFound {
            tried,
            message: NO_RELEVANT_DATA.to_string(),
        })
    }
}
