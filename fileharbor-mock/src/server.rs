//! HTTP routes of the mock backend

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::MockConfig;
use crate::jobs::{build_results, JobStore, PollOutcome, SearchBody};

/// Header the client echoes the CSRF token in
const CSRF_HEADER: &str = "x-csrftoken";

/// Shared state of the mock backend
pub struct MockState {
    config: MockConfig,
    jobs: Mutex<JobStore>,
    requests: AtomicU64,
    last_csrf_header: Mutex<Option<String>>,
}

impl MockState {
    pub fn new(config: MockConfig) -> Arc<Self> {
        let jobs = JobStore::new(config.entries_per_dataset, config.job_ttl());
        Arc::new(Self {
            config,
            jobs: Mutex::new(jobs),
            requests: AtomicU64::new(0),
            last_csrf_header: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &MockConfig {
        &self.config
    }

    /// Number of `/search` requests served
    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::SeqCst)
    }

    /// CSRF header sent with the latest `/search` request
    pub async fn last_csrf_header(&self) -> Option<String> {
        self.last_csrf_header.lock().await.clone()
    }

    /// Jobs created, not yet delivered and not expired
    pub async fn pending_jobs(&self) -> usize {
        let mut jobs = self.jobs.lock().await;
        jobs.evict_expired(Instant::now());
        jobs.len()
    }
}

/// Build the router
pub fn router(state: Arc<MockState>) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
        .route("/search", post(search_handler))
        .with_state(state)
}

/// Serve on an already bound listener
pub async fn serve(listener: TcpListener, state: Arc<MockState>) -> anyhow::Result<()> {
    info!("Mock backend listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "fileharbor-mock",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Search and job status endpoint
async fn search_handler(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<SearchBody>,
) -> Response {
    state.requests.fetch_add(1, Ordering::SeqCst);
    *state.last_csrf_header.lock().await = headers
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let (status, reply) = match body.params.job_id.as_ref().and_then(job_key) {
        Some(job_id) => poll_job(&state, &job_id).await,
        None => start_search(&state, body).await,
    };

    let cookie = format!("csrftoken={}; Path=/", state.config.csrf_token);
    ([(header::SET_COOKIE, cookie)], (status, Json(reply))).into_response()
}

async fn start_search(state: &MockState, body: SearchBody) -> (StatusCode, Value) {
    let params = body.params;
    let query_len = params.query.as_deref().map(|q| q.trim().chars().count()).unwrap_or(0);

    if query_len < state.config.min_query_len {
        debug!("Rejecting short query {:?}", params.query);
        return (StatusCode::BAD_REQUEST, json!({ "query": ["Too short"] }));
    }

    if state.config.pending_polls == 0 {
        return (StatusCode::OK, build_results(&params, state.config.entries_per_dataset));
    }

    let job_id = state.jobs.lock().await.create(params, state.config.pending_polls - 1);
    info!("Created search job {}", job_id);
    (StatusCode::OK, json!({ "job_id": job_id }))
}

async fn poll_job(state: &MockState, job_id: &str) -> (StatusCode, Value) {
    match state.jobs.lock().await.poll(job_id) {
        PollOutcome::Pending => {
            debug!("Job {} still pending", job_id);
            (StatusCode::OK, json!({ "job_id": job_id }))
        }
        PollOutcome::Ready(result) => {
            info!("Job {} finished", job_id);
            (StatusCode::OK, result)
        }
        PollOutcome::Unknown => (StatusCode::NOT_FOUND, json!("Not found.")),
    }
}

fn job_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
