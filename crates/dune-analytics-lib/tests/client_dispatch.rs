use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, SecondsFormat, Utc};
use dune_analytics::transport::mock::MockTransport;
use dune_analytics::{
    Chain, DuneClient, DuneConfig, DuneError, ExecuteOptions, ExecutionState, ResultParams,
    SearchOutcome, TrendParams, NO_RELEVANT_DATA,
};
use serde_json::{json, Value};

const DISCOVER: &str = "https://dune.test/discover";

fn client_with(mock: Arc<MockTransport>) -> DuneClient {
    let mut config = DuneConfig::new("test-key");
    config.poll_interval = Duration::ZERO;
    config.max_poll_attempts = 3;
    config.discover_url = DISCOVER.to_string();
    DuneClient::with_transport(config, mock)
}

fn rows(n: usize) -> Vec<Value> {
    (0..n).map(|i| json!({ "row": i })).collect()
}

fn results_body(
    started: chrono::DateTime<Utc>,
    rows: Vec<Value>,
    next_offset: Option<u64>,
) -> Value {
    json!({
        "execution_id": "01-cached",
        "query_id": 77,
        "state": "QUERY_STATE_COMPLETED",
        "execution_started_at": started.to_rfc3339_opts(SecondsFormat::Micros, true),
        "result": { "rows": rows },
        "next_offset": next_offset,
    })
}

fn script_execution(
    mock: &MockTransport,
    query_id: u64,
    execution_id: &str,
    states: &[&str],
    rows: Vec<Value>,
) {
    mock.on_post(
        &format!("/query/{query_id}/execute"),
        json!({ "execution_id": execution_id, "state": "QUERY_STATE_PENDING" }),
    );
    let status_path = format!("/execution/{execution_id}/status");
    for state in states {
        mock.on_get(&status_path, json!({ "execution_id": execution_id, "state": state }));
    }
    mock.on_get(
        &format!("/execution/{execution_id}/results"),
        json!({ "execution_id": execution_id, "result": { "rows": rows } }),
    );
}

#[tokio::test]
async fn trending_contracts_hits_chain_path_with_clamped_limit() {
    let mock = Arc::new(MockTransport::new());
    mock.on_get("/trends/evm/contracts/base", json!({ "result": { "rows": [] } }));
    let client = client_with(mock.clone());

    let mut params = TrendParams::new(Chain::Base);
    params.results.limit = Some(1_000);
    params.results.sort_by = Some("usd_value_received desc".to_string());
    params.results.filters = Some("token_standard = 'erc20'".to_string());
    client.trending_contracts(&params).await.unwrap();

    let requests = mock.requests_to("/trends/evm/contracts/base");
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "GET");
    assert_eq!(requests[0].param("limit"), Some("100"));
    assert_eq!(requests[0].param("sort_by"), Some("usd_value_received desc"));
    assert_eq!(requests[0].param("filters"), Some("token_standard = 'erc20'"));
}

#[tokio::test]
async fn farcaster_endpoints_pass_body_through() {
    let mock = Arc::new(MockTransport::new());
    let memecoins = json!({ "result": { "rows": [{ "ticker": "DEGEN" }] }, "next_offset": 1 });
    mock.on_get("/farcaster/trends/memecoins", memecoins.clone());
    mock.on_get("/farcaster/trends/users", json!({ "result": { "rows": [] } }));
    mock.on_get("/farcaster/trends/channels", json!({ "result": { "rows": [] } }));
    let client = client_with(mock.clone());

    let params = ResultParams::with_limit(250);
    assert_eq!(client.farcaster_memecoins(&params).await.unwrap(), memecoins);
    client.farcaster_users(&params).await.unwrap();
    client.farcaster_channels(&params).await.unwrap();

    for request in mock.requests() {
        assert_eq!(request.param("limit"), Some("100"), "{}", request.path);
    }
}

#[tokio::test]
async fn upstream_errors_surface_as_api_errors() {
    let mock = Arc::new(MockTransport::new());
    mock.on_status("GET", "/farcaster/trends/users", 401);
    let client = client_with(mock);

    let err = client
        .farcaster_users(&ResultParams::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DuneError::Api { status: 401, .. }));
    assert!(err.to_string().contains("401"));
}

#[tokio::test]
async fn run_query_polls_until_complete() {
    let mock = Arc::new(MockTransport::new());
    script_execution(
        &mock,
        5,
        "01-exec",
        &["QUERY_STATE_PENDING", "QUERY_STATE_EXECUTING", "QUERY_STATE_COMPLETED"],
        rows(3),
    );
    let client = client_with(mock.clone());

    let page = client
        .run_query(5, &ExecuteOptions::default(), &ResultParams::with_limit(10))
        .await
        .unwrap();
    assert_eq!(page.rows.len(), 3);
    assert_eq!(page.query_id, Some(5));
    assert_eq!(mock.requests_to("/execution/01-exec/status").len(), 3);

    let results = mock.requests_to("/execution/01-exec/results");
    assert_eq!(results[0].param("limit"), Some("10"));
}

#[tokio::test]
async fn run_query_sends_parameters_in_body() {
    let mock = Arc::new(MockTransport::new());
    script_execution(&mock, 9, "01-body", &["QUERY_STATE_COMPLETED"], rows(1));
    let client = client_with(mock.clone());

    let mut query_parameters = serde_json::Map::new();
    query_parameters.insert("days".to_string(), json!(7));
    let options = ExecuteOptions {
        query_parameters: Some(query_parameters),
        performance: Some("medium".to_string()),
    };
    client
        .run_query(9, &options, &ResultParams::default())
        .await
        .unwrap();

    let post = &mock.requests_to("/query/9/execute")[0];
    assert_eq!(
        post.body,
        Some(json!({ "query_parameters": { "days": 7 }, "performance": "medium" }))
    );
}

#[tokio::test]
async fn run_query_times_out_after_max_polls() {
    let mock = Arc::new(MockTransport::new());
    script_execution(&mock, 5, "01-slow", &["QUERY_STATE_EXECUTING"], rows(1));
    let client = client_with(mock.clone());

    let err = client
        .run_query(5, &ExecuteOptions::default(), &ResultParams::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DuneError::Timeout { attempts: 3 }));
    assert_eq!(mock.requests_to("/execution/01-slow/status").len(), 3);
    assert!(mock.requests_to("/execution/01-slow/results").is_empty());
}

#[tokio::test]
async fn run_query_reports_failed_and_unknown_states() {
    let mock = Arc::new(MockTransport::new());
    script_execution(&mock, 1, "01-fail", &["QUERY_STATE_FAILED"], rows(1));
    script_execution(&mock, 2, "01-odd", &["QUERY_STATE_SLEEPING"], rows(1));
    let client = client_with(mock);

    let err = client
        .run_query(1, &ExecuteOptions::default(), &ResultParams::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DuneError::ExecutionFailed(ExecutionState::Failed)));

    let err = client
        .run_query(2, &ExecuteOptions::default(), &ResultParams::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DuneError::UnknownState(ref s) if s == "QUERY_STATE_SLEEPING"));
}

#[tokio::test]
async fn run_query_requires_execution_id_and_rows() {
    let mock = Arc::new(MockTransport::new());
    mock.on_post("/query/3/execute", json!({ "state": "QUERY_STATE_PENDING" }));
    script_execution(&mock, 4, "01-empty", &["QUERY_STATE_COMPLETED"], Vec::new());
    let client = client_with(mock);

    let err = client
        .run_query(3, &ExecuteOptions::default(), &ResultParams::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DuneError::MissingExecutionId));

    let err = client
        .run_query(4, &ExecuteOptions::default(), &ResultParams::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DuneError::NoData));
}

#[tokio::test]
async fn latest_result_serves_fresh_cache() {
    let mock = Arc::new(MockTransport::new());
    let started = Utc::now() - ChronoDuration::hours(1);
    mock.on_get("/query/77/results", results_body(started, rows(2), None));
    let client = client_with(mock.clone());

    let latest = client
        .latest_result(77, &ResultParams::default())
        .await
        .unwrap();
    assert!(!latest.refreshed);
    assert_eq!(latest.page.rows.len(), 2);
    assert!(mock.requests_to("/query/77/execute").is_empty());
}

#[tokio::test]
async fn latest_result_reruns_stale_cache_once() {
    let mock = Arc::new(MockTransport::new());
    let started = Utc::now() - ChronoDuration::hours(9);
    mock.on_get("/query/77/results", results_body(started, rows(2), None));
    script_execution(&mock, 77, "01-fresh", &["QUERY_STATE_COMPLETED"], rows(4));
    let client = client_with(mock.clone());

    let latest = client
        .latest_result(77, &ResultParams::default())
        .await
        .unwrap();
    assert!(latest.refreshed);
    assert_eq!(latest.page.rows.len(), 4);
    assert_eq!(mock.requests_to("/query/77/execute").len(), 1);
}

#[tokio::test]
async fn latest_result_runs_query_when_missing() {
    let mock = Arc::new(MockTransport::new());
    mock.on_status("GET", "/query/88/results", 404);
    script_execution(&mock, 88, "01-new", &["QUERY_STATE_COMPLETED"], rows(1));
    let client = client_with(mock.clone());

    let latest = client
        .latest_result(88, &ResultParams::default())
        .await
        .unwrap();
    assert!(latest.refreshed);
    assert_eq!(mock.requests_to("/query/88/execute").len(), 1);
}

#[tokio::test]
async fn latest_result_runs_query_when_cache_is_empty() {
    let mock = Arc::new(MockTransport::new());
    mock.on_get("/query/12/results", results_body(Utc::now(), Vec::new(), None));
    script_execution(&mock, 12, "01-refill", &["QUERY_STATE_COMPLETED"], rows(2));
    let client = client_with(mock.clone());

    let latest = client
        .latest_result(12, &ResultParams::default())
        .await
        .unwrap();
    assert!(latest.refreshed);
    assert_eq!(latest.page.rows.len(), 2);
}

#[tokio::test]
async fn latest_result_reruns_when_timestamp_is_missing() {
    let mock = Arc::new(MockTransport::new());
    mock.on_get(
        "/query/31/results",
        json!({ "execution_id": "01-old", "result": { "rows": rows(3) } }),
    );
    script_execution(&mock, 31, "01-dated", &["QUERY_STATE_COMPLETED"], rows(2));
    let client = client_with(mock.clone());

    let latest = client
        .latest_result(31, &ResultParams::default())
        .await
        .unwrap();
    assert!(latest.refreshed);
    assert_eq!(latest.page.execution_id.as_deref(), Some("01-dated"));
    assert_eq!(mock.requests_to("/query/31/execute").len(), 1);
}

#[tokio::test]
async fn filter_matching_nothing_serves_cache_without_rerun() {
    let mock = Arc::new(MockTransport::new());
    let started = Utc::now() - ChronoDuration::hours(1);
    mock.on_get(
        "/query/77/results",
        json!({
            "execution_id": "01-cached",
            "execution_started_at": started.to_rfc3339_opts(SecondsFormat::Micros, true),
            "result": { "rows": [], "metadata": { "total_row_count": 500 } },
        }),
    );
    let client = client_with(mock.clone());

    let params = ResultParams {
        filters: Some("chain = 'nonexistent'".to_string()),
        ..ResultParams::default()
    };
    let latest = client.latest_result(77, &params).await.unwrap();
    assert!(!latest.refreshed);
    assert!(latest.page.rows.is_empty());
    assert!(mock.requests_to("/query/77/execute").is_empty());
    assert_eq!(
        mock.requests_to("/query/77/results")[0].param("filters"),
        Some("chain = 'nonexistent'")
    );
}

#[tokio::test]
async fn offset_past_the_end_is_not_an_empty_cache() {
    let mock = Arc::new(MockTransport::new());
    mock.on_get("/query/77/results", results_body(Utc::now(), Vec::new(), None));
    let client = client_with(mock.clone());

    let params = ResultParams {
        offset: Some(1_000),
        ..ResultParams::default()
    };
    let latest = client.latest_result(77, &params).await.unwrap();
    assert!(!latest.refreshed);
    assert!(mock.requests_to("/query/77/execute").is_empty());
}

#[tokio::test]
async fn filtered_read_of_empty_result_still_reruns() {
    let mock = Arc::new(MockTransport::new());
    mock.on_get(
        "/query/12/results",
        json!({
            "execution_started_at": Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            "result": { "rows": [], "metadata": { "total_row_count": 0 } },
        }),
    );
    script_execution(&mock, 12, "01-refill", &["QUERY_STATE_COMPLETED"], rows(2));
    let client = client_with(mock.clone());

    let params = ResultParams {
        filters: Some("chain = 'base'".to_string()),
        ..ResultParams::default()
    };
    let latest = client.latest_result(12, &params).await.unwrap();
    assert!(latest.refreshed);
    assert_eq!(mock.requests_to("/query/12/execute").len(), 1);
}

#[tokio::test]
async fn fetch_all_pages_follows_next_offset() {
    let mock = Arc::new(MockTransport::new());
    let now = Utc::now();
    mock.on_get("/query/7/results", results_body(now, rows(100), Some(100)))
        .on_get("/query/7/results", results_body(now, rows(100), Some(200)))
        .on_get("/query/7/results", results_body(now, rows(30), None));
    let client = client_with(mock.clone());

    let params = ResultParams {
        limit: Some(5_000),
        ..ResultParams::default()
    };
    let all = client.fetch_all_pages(7, &params, 10_000).await.unwrap();
    assert_eq!(all.len(), 230);

    let requests = mock.requests_to("/query/7/results");
    assert_eq!(requests.len(), 3);
    assert!(requests.iter().all(|r| r.param("limit") == Some("100")));
    assert_eq!(requests[0].param("offset"), None);
    assert_eq!(requests[1].param("offset"), Some("100"));
    assert_eq!(requests[2].param("offset"), Some("200"));
}

#[tokio::test]
async fn fetch_all_pages_stops_at_max_rows() {
    let mock = Arc::new(MockTransport::new());
    mock.on_get("/query/7/results", results_body(Utc::now(), rows(100), Some(100)));
    let client = client_with(mock.clone());

    let all = client
        .fetch_all_pages(7, &ResultParams::with_limit(100), 150)
        .await
        .unwrap();
    assert_eq!(all.len(), 150);
    assert_eq!(mock.requests_to("/query/7/results").len(), 2);
}

#[tokio::test]
async fn search_returns_first_hit_without_retry() {
    let mock = Arc::new(MockTransport::new());
    mock.on_page(DISCOVER, r#"<a href="https://dune.com/queries/3493826">Daily</a>"#);
    let client = client_with(mock.clone());

    let outcome = client
        .search_with_fallback("Eternal AI Daily Inferences", None)
        .await
        .unwrap();
    match &outcome {
        SearchOutcome::Found {
            keyword,
            retried,
            matches,
        } => {
            assert_eq!(keyword, "Eternal AI Daily Inferences");
            assert!(!retried);
            assert_eq!(matches[0].query_id, 3493826);
            assert_eq!(matches[0].title.as_deref(), Some("Daily"));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(outcome.attempts(), 1);

    let page = &mock.requests_to(DISCOVER)[0];
    assert_eq!(page.param("q"), Some("Eternal AI Daily Inferences"));
    assert_eq!(page.param("resource-type"), Some("queries"));
}

#[tokio::test]
async fn search_retries_once_with_alternate_keyword() {
    let mock = Arc::new(MockTransport::new());
    mock.on_page(DISCOVER, "<html>nothing here</html>")
        .on_page(DISCOVER, r#"<a href="/queries/42">Broader</a>"#);
    let client = client_with(mock.clone());

    let outcome = client
        .search_with_fallback("uniswap v4 hooks", Some("uniswap hooks"))
        .await
        .unwrap();
    assert_eq!(outcome.attempts(), 2);
    match outcome {
        SearchOutcome::Found {
            keyword, retried, ..
        } => {
            assert_eq!(keyword, "uniswap hooks");
            assert!(retried);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    let keywords: Vec<String> = mock
        .requests_to(DISCOVER)
        .iter()
        .filter_map(|r| r.param("q").map(str::to_string))
        .collect();
    assert_eq!(keywords, vec!["uniswap v4 hooks", "uniswap hooks"]);
}

#[tokio::test]
async fn search_gives_up_after_one_retry() {
    let mock = Arc::new(MockTransport::new());
    mock.on_page(DISCOVER, "<html>nothing here</html>");
    let client = client_with(mock.clone());

    let outcome = client
        .search_with_fallback("obscure protocol metrics", None)
        .await
        .unwrap();
    match &outcome {
        SearchOutcome::NotFound { tried, message } => {
            assert_eq!(
                tried,
                &vec![
                    "obscure protocol metrics".to_string(),
                    "obscure protocol".to_string()
                ]
            );
            assert_eq!(message, NO_RELEVANT_DATA);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(mock.requests_to(DISCOVER).len(), 2);
}

#[tokio::test]
async fn single_word_search_has_no_retry() {
    let mock = Arc::new(MockTransport::new());
    mock.on_page(DISCOVER, "<html></html>");
    let client = client_with(mock.clone());

    let outcome = client.search_with_fallback("zzz", None).await.unwrap();
    assert_eq!(outcome.attempts(), 1);
    assert_eq!(mock.requests_to(DISCOVER).len(), 1);
}
