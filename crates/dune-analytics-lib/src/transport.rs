//! HTTP transport abstraction.
//!
//! The dispatcher only needs three verbs: GET a JSON document from the API,
//! POST a JSON body to the API, and GET a public page as text. Keeping them
//! behind a trait lets tests script responses without a network.

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use serde_json::Value;
use tracing::debug;

use crate::config::{DuneConfig, API_KEY_HEADER};
use crate::error::{DuneError, DuneResult};

/// Query-string pairs, passed through verbatim.
pub type QueryPairs = [(String, String)];

#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// GET `path` (relative to the API root) and decode JSON.
    async fn get_json(&self, path: &str, query: &QueryPairs) -> DuneResult<Value>;

    /// POST `body` to `path` (relative to the API root) and decode JSON.
    async fn post_json(&self, path: &str, body: &Value) -> DuneResult<Value>;

    /// GET an absolute URL outside the API and return the body text.
    async fn get_text(&self, url: &str, query: &QueryPairs) -> DuneResult<String>;
}

/// `reqwest`-backed transport talking to the real API.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
    base_url: String,
    api_key: String,
}

impl ReqwestTransport {
    pub fn new(config: &DuneConfig) -> DuneResult<Self> {
        Self::from_builder(config, Client::builder())
    }

    fn from_builder(config: &DuneConfig, builder: ClientBuilder) -> DuneResult<Self> {
        let client = builder
            .user_agent(config.user_agent.as_str())
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| DuneError::Http(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn check(response: reqwest::Response) -> DuneResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(DuneError::Api {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get_json(&self, path: &str, query: &QueryPairs) -> DuneResult<Value> {
        let url = self.url(path);
        debug!(url = %url, params = query.len(), "GET");

        let response = self
            .client
            .get(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .query(query)
            .send()
            .await?;
        let response = Self::check(response).await?;
        Ok(response.json::<Value>().await?)
    }

    async fn post_json(&self, path: &str, body: &Value) -> DuneResult<Value> {
        let url = self.url(path);
        debug!(url = %url, "POST");

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(body)
            .send()
            .await?;
        let response = Self::check(response).await?;
        Ok(response.json::<Value>().await?)
    }

    async fn get_text(&self, url: &str, query: &QueryPairs) -> DuneResult<String> {
        debug!(url = %url, "GET page");

        let response = self.client.get(url).query(query).send().await?;
        let response = Self::check(response).await?;
        Ok(response.text().await?)
    }
}

#[cfg(any(test, feature = "mock-transport"))]
pub mod mock {
    //! Scripted transport for tests.
    //!
    //! Responses are queued per `(method, path)`; each call pops the next one.
    //! When a queue holds a single entry it is reused for every later call.

    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::Value;

    use super::{HttpTransport, QueryPairs};
    use crate::error::{DuneError, DuneResult};

    /// One observed request.
    #[derive(Debug, Clone, PartialEq)]
    pub struct RecordedRequest {
        pub method: &'static str,
        pub path: String,
        pub query: Vec<(String, String)>,
        pub body: Option<Value>,
    }

    impl RecordedRequest {
        /// Value of a query parameter, if sent.
        pub fn param(&self, key: &str) -> Option<&str> {
            self.query
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        }
    }

    enum Scripted {
        Json(Value),
        Text(String),
        Status(u16, String),
    }

    #[derive(Default)]
    pub struct MockTransport {
        responses: Mutex<HashMap<(&'static str, String), VecDeque<Scripted>>>,
        requests: Mutex<Vec<RecordedRequest>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        fn push(&self, method: &'static str, path: &str, entry: Scripted) {
            self.responses
                .lock()
                .unwrap()
                .entry((method, path.to_string()))
                .or_default()
                .push_back(entry);
        }

        /// Queue a JSON answer for `GET path`.
        pub fn on_get(&self, path: &str, body: Value) -> &Self {
            self.push("GET", path, Scripted::Json(body));
            self
        }

        /// Queue a JSON answer for `POST path`.
        pub fn on_post(&self, path: &str, body: Value) -> &Self {
            self.push("POST", path, Scripted::Json(body));
            self
        }

        /// Queue a text answer for a page `GET url`.
        pub fn on_page(&self, url: &str, html: &str) -> &Self {
            self.push("PAGE", url, Scripted::Text(html.to_string()));
            self
        }

        /// Queue an error status for `method path`.
        pub fn on_status(&self, method: &'static str, path: &str, status: u16) -> &Self {
            self.push(method, path, Scripted::Status(status, format!("status {status}")));
            self
        }

        /// Every request seen so far, in order.
        pub fn requests(&self) -> Vec<RecordedRequest> {
            self.requests.lock().unwrap().clone()
        }

        /// Requests to one path.
        pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
            self.requests()
                .into_iter()
                .filter(|r| r.path == path)
                .collect()
        }

        fn next(&self, method: &'static str, path: &str) -> DuneResult<Scripted> {
            let mut responses = self.responses.lock().unwrap();
            let queue = responses
                .get_mut(&(method, path.to_string()))
                .ok_or_else(|| DuneError::Api {
                    status: 404,
                    body: format!("no scripted response for {method} {path}"),
                })?;
            let entry = if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().map(|e| match e {
                    Scripted::Json(v) => Scripted::Json(v.clone()),
                    Scripted::Text(t) => Scripted::Text(t.clone()),
                    Scripted::Status(s, b) => Scripted::Status(*s, b.clone()),
                })
            };
            entry.ok_or_else(|| DuneError::Api {
                status: 404,
                body: format!("no scripted response for {method} {path}"),
            })
        }

        fn record(
            &self,
            method: &'static str,
            path: &str,
            query: &QueryPairs,
            body: Option<&Value>,
        ) {
            self.requests.lock().unwrap().push(RecordedRequest {
                method,
                path: path.to_string(),
                query: query.to_vec(),
                body: body.cloned(),
            });
        }
    }

    fn into_json(entry: Scripted) -> DuneResult<Value> {
        match entry {
            Scripted::Json(v) => Ok(v),
            Scripted::Text(t) => Ok(serde_json::from_str(&t)?),
            Scripted::Status(status, body) => Err(DuneError::Api { status, body }),
        }
    }

    #[async_trait]
    impl HttpTransport for MockTransport {
        async fn get_json(&self, path: &str, query: &QueryPairs) -> DuneResult<Value> {
            self.record("GET", path, query, None);
            into_json(self.next("GET", path)?)
        }

        async fn post_json(&self, path: &str, body: &Value) -> DuneResult<Value> {
            self.record("POST", path, &[], Some(body));
            into_json(self.next("POST", path)?)
        }

        async fn get_text(&self, url: &str, query: &QueryPairs) -> DuneResult<String> {
            self.record("PAGE", url, query, None);
            match self.next("PAGE", url)? {
                Scripted::Text(t) => Ok(t),
                Scripted::Json(v) => Ok(v.to_string()),
                Scripted::Status(status, body) => Err(DuneError::Api { status, body }),
            }
        }
    }
}
