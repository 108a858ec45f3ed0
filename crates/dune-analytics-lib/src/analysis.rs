//! Simple aggregates over trending-contract rows.
//!
//! Everything here is a single pass over the returned rows. Column names vary
//! slightly between Dune presets, so each metric looks at a short list of
//! candidate columns and takes the first one present.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const TOKEN_STANDARD_COLUMNS: &[&str] = &["token_standard"];
const VALUE_COLUMNS: &[&str] = &["usd_value_received", "usd_value", "value_usd"];
const AGE_DAYS_COLUMNS: &[&str] = &["contract_age_days", "age_days"];
const CREATED_COLUMNS: &[&str] = &["created_time", "created_at", "deployed_at"];
const UNKNOWN: &str = "unknown";

/// Age buckets as `(label, upper bound in days, exclusive)`.
const AGE_BUCKETS: &[(&str, f64)] = &[
    ("<7d", 7.0),
    ("7-30d", 30.0),
    ("30-90d", 90.0),
    ("90-365d", 365.0),
    (">365d", f64::INFINITY),
];

/// Which aggregate to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisType {
    /// Contract counts per token standard.
    #[default]
    TokenStandard,
    /// Count and value per contract-age bucket.
    AgeValue,
    /// Highest-value rows.
    TopValue,
}

impl AnalysisType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TokenStandard => "token_standard",
            Self::AgeValue => "age_value",
            Self::TopValue => "top_value",
        }
    }
}

impl fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "token_standard" | "standard" | "standards" => Ok(Self::TokenStandard),
            "age_value" | "age" | "age_vs_value" => Ok(Self::AgeValue),
            "top_value" | "top" => Ok(Self::TopValue),
            other => Err(format!(
                "unsupported analysis_type '{other}'; supported: token_standard|age_value|top_value"
            )),
        }
    }
}

/// Count and value totals for one age bucket.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AgeBucket {
    pub bucket: String,
    pub count: usize,
    pub total_value: f64,
    /// Average over rows that carried a value.
    pub avg_value: Option<f64>,
    #[serde(skip)]
    valued: usize,
}

/// Output of [`analyze`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "analysis_type", rename_all = "snake_case")]
pub enum Analysis {
    TokenStandard {
        total_rows: usize,
        counts: BTreeMap<String, usize>,
    },
    AgeValue {
        total_rows: usize,
        buckets: Vec<AgeBucket>,
    },
    TopValue {
        total_rows: usize,
        top: Vec<Value>,
    },
}

/// Run one analysis over `rows`.
pub fn analyze(
    rows: &[Value],
    analysis_type: AnalysisType,
    top_n: usize,
    now: DateTime<Utc>,
) -> Analysis {
    match analysis_type {
        AnalysisType::TokenStandard => Analysis::TokenStandard {
            total_rows: rows.len(),
            counts: count_by_token_standard(rows),
        },
        AnalysisType::AgeValue => Analysis::AgeValue {
            total_rows: rows.len(),
            buckets: age_value_buckets(rows, now),
        },
        AnalysisType::TopValue => Analysis::TopValue {
            total_rows: rows.len(),
            top: top_by_value(rows, top_n),
        },
    }
}

pub fn count_by_token_standard(rows: &[Value]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for row in rows {
        let standard = first_field(row, TOKEN_STANDARD_COLUMNS)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase)
            .unwrap_or_else(|| UNKNOWN.to_string());
        *counts.entry(standard).or_insert(0) += 1;
    }
    counts
}

/// Buckets in fixed order, `unknown` last; empty buckets are kept.
pub fn age_value_buckets(rows: &[Value], now: DateTime<Utc>) -> Vec<AgeBucket> {
    let mut buckets: Vec<AgeBucket> = AGE_BUCKETS
        .iter()
        .map(|(label, _)| AgeBucket {
            bucket: (*label).to_string(),
            ..AgeBucket::default()
        })
        .collect();
    buckets.push(AgeBucket {
        bucket: UNKNOWN.to_string(),
        ..AgeBucket::default()
    });

    for row in rows {
        let idx = match row_age_days(row, now) {
            Some(days) => AGE_BUCKETS
                .iter()
                .position(|(_, upper)| days < *upper)
                .unwrap_or(AGE_BUCKETS.len() - 1),
            None => AGE_BUCKETS.len(),
        };
        let bucket = &mut buckets[idx];
        bucket.count += 1;
        if let Some(value) = row_value(row) {
            bucket.total_value += value;
            bucket.valued += 1;
        }
    }

    for bucket in &mut buckets {
        if bucket.valued > 0 {
            bucket.avg_value = Some(bucket.total_value / bucket.valued as f64);
        }
    }
    buckets
}

/// Rows sorted by value, highest first; rows without a value are skipped.
pub fn top_by_value(rows: &[Value], top_n: usize) -> Vec<Value> {
    let mut valued: Vec<(f64, &Value)> = rows
        .iter()
        .filter_map(|row| row_value(row).map(|v| (v, row)))
        .collect();
    valued.sort_by(|a, b| b.0.total_cmp(&a.0));
    valued
        .into_iter()
        .take(top_n)
        .map(|(_, row)| row.clone())
        .collect()
}

fn first_field<'a>(row: &'a Value, columns: &[&str]) -> Option<&'a Value> {
    columns
        .iter()
        .find_map(|c| row.get(*c).filter(|v| !v.is_null()))
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

fn row_value(row: &Value) -> Option<f64> {
    first_field(row, VALUE_COLUMNS).and_then(as_number)
}

fn row_age_days(row: &Value, now: DateTime<Utc>) -> Option<f64> {
    if let Some(days) = first_field(row, AGE_DAYS_COLUMNS).and_then(as_number) {
        return Some(days.max(0.0));
    }
    let created = first_field(row, CREATED_COLUMNS)
        .and_then(Value::as_str)
        .and_then(parse_timestamp)?;
    let seconds = (now - created).num_seconds().max(0);
    Some(seconds as f64 / 86_400.0)
}

/// Accepts RFC 3339, Dune's `YYYY-MM-DD HH:MM:SS.fff UTC`, and bare dates.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    let without_zone = raw.trim_end_matches(" UTC");
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(without_zone, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(without_zone, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
