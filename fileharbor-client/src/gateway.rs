//! Request gateway
//!
//! Every outbound call goes through [`Gateway`]. It resolves paths against the
//! configured base URL, attaches the CSRF token from the cookie store, and
//! keeps the shared [`StatusBoard`] in sync:
//!
//! - a request that is not a job status poll flips the status to loading;
//! - a response that does not name a pending job clears it again;
//! - a failure marks the status as failed and publishes exactly one
//!   [`ErrorMessage`] with normalized tokens.
//!
//! Polls never touch the loading flag, so one spinner spans the whole poll
//! chain of a search.

use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::HeaderName;
use reqwest::{Method, Url};
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::classify::{ErrorPayload, Failure};
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::job::JobId;
use crate::status::{ErrorMessage, RequestStatus, StatusBoard};

/// An outbound API call
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path appended to the base URL (e.g. "/search")
    pub path: String,
    /// JSON body
    pub body: Option<Value>,
    /// Query-string parameters, as a JSON object
    pub params: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            params: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }

    /// Whether this request only asks for the status of a running job
    pub fn is_job_poll(&self) -> bool {
        [&self.body, &self.params]
            .into_iter()
            .flatten()
            .any(|payload| JobId::in_payload(payload).is_some())
    }
}

/// HTTP client wrapper shared by all API consumers
#[derive(Debug, Clone)]
pub struct Gateway {
    client: reqwest::Client,
    base_url: String,
    cookies: Arc<Jar>,
    csrf_cookie_name: String,
    csrf_header: HeaderName,
    board: StatusBoard,
}

impl Gateway {
    /// Create a gateway reporting to `board`
    pub fn new(config: &ClientConfig, board: StatusBoard) -> Result<Self> {
        config.validate()?;

        let cookies = Arc::new(Jar::default());
        let client = reqwest::Client::builder()
            .cookie_provider(cookies.clone())
            .timeout(config.timeout())
            .build()
            .map_err(|e| ClientError::Config(format!("Failed to create HTTP client: {}", e)))?;

        let csrf_header = HeaderName::from_bytes(config.csrf_header_name.as_bytes())
            .map_err(|e| ClientError::Config(format!("Invalid CSRF header name: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url().trim_end_matches('/').to_string(),
            cookies,
            csrf_cookie_name: config.csrf_cookie_name.clone(),
            csrf_header,
            board,
        })
    }

    /// Status board this gateway reports to
    pub fn board(&self) -> &StatusBoard {
        &self.board
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for an API path
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Store a cookie for the API host, as if the server had set it
    pub fn add_cookie(&self, cookie: &str) -> Result<()> {
        let url = Url::parse(&self.base_url)
            .map_err(|e| ClientError::Config(format!("Invalid API URL: {}", e)))?;
        self.cookies.add_cookie_str(cookie, &url);
        Ok(())
    }

    /// Send a request, reporting to the status board
    pub async fn send(&self, request: ApiRequest) -> Result<Value> {
        self.dispatch(request, None).await
    }

    /// Send a request on behalf of a session that may be superseded.
    ///
    /// Once `scope` is cancelled nothing from this request reaches the status
    /// board, and the call resolves to [`ClientError::Superseded`].
    pub async fn send_scoped(&self, request: ApiRequest, scope: &CancellationToken) -> Result<Value> {
        self.dispatch(request, Some(scope)).await
    }

    /// POST a JSON body
    pub async fn post(&self, path: &str, body: Value) -> Result<Value> {
        self.send(ApiRequest::post(path).with_body(body)).await
    }

    async fn dispatch(&self, request: ApiRequest, scope: Option<&CancellationToken>) -> Result<Value> {
        if scope.is_some_and(|s| s.is_cancelled()) {
            return Err(ClientError::Superseded);
        }

        let url = self.url(&request.path);
        let is_poll = request.is_job_poll();
        if !is_poll {
            self.board.set_status_scoped(scope, RequestStatus::loading());
        }

        debug!("Gateway: {} {} (poll={})", request.method, url, is_poll);

        match self.execute(&url, request).await {
            Ok(value) => {
                // A pending job keeps the spinner up until its final reply
                if JobId::in_payload(&value).is_none()
                    && !self.board.set_status_scoped(scope, RequestStatus::settled())
                {
                    return Err(ClientError::Superseded);
                }
                Ok(value)
            }
            Err(failure) => {
                let details = failure.details();
                warn!("Gateway: {} failed: {}", url, details.join(", "));

                let message = ErrorMessage::error(details);
                if !self.board.report_failure(scope, message.clone()) {
                    return Err(ClientError::Superseded);
                }
                Err(ClientError::Request(message))
            }
        }
    }

    async fn execute(&self, url: &str, request: ApiRequest) -> std::result::Result<Value, Failure> {
        let mut builder = self.client.request(request.method, url);

        if let Some(token) = self.csrf_token(url) {
            builder = builder.header(self.csrf_header.clone(), token);
        }
        if let Some(params) = &request.params {
            builder = builder.query(&query_pairs(params));
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| Failure::from_reqwest(&e))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| Failure::from_reqwest(&e))?;

        if !status.is_success() {
            return Err(Failure::Server {
                status: status.as_u16(),
                payload: ErrorPayload::from_body(&text),
            });
        }

        Ok(parse_body(text))
    }

    /// CSRF token stored for `url`, if the server has set one
    fn csrf_token(&self, url: &str) -> Option<String> {
        let url = Url::parse(url).ok()?;
        let header = self.cookies.cookies(&url)?;

        header
            .to_str()
            .ok()?
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == self.csrf_cookie_name)
            .map(|(_, value)| value.to_string())
    }
}

/// Flatten a JSON object into query pairs; arrays repeat their key
fn query_pairs(params: &Value) -> Vec<(String, String)> {
    let Some(object) = params.as_object() else {
        return Vec::new();
    };

    let mut pairs = Vec::new();
    for (key, value) in object {
        match value {
            Value::Null => {}
            Value::Array(items) => {
                pairs.extend(items.iter().map(|item| (key.clone(), scalar_text(item))));
            }
            other => pairs.push((key.clone(), scalar_text(other))),
        }
    }
    pairs
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Empty bodies read as `null`; bodies that are not JSON pass through as text
fn parse_body(text: String) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(&text).unwrap_or(Value::String(text))
}
