//! Search job client
//!
//! Drives one search session at a time through
//! `Idle → Submitting → (Completed | Polling → … → Completed | Failed)`.
//!
//! Every session gets a number and a cancellation scope. Starting a new
//! search cancels the previous scope and bumps the number in one step; every
//! later write checks the number under the snapshot channel's lock, so a stale
//! poll chain can never overwrite the state of the session that replaced it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::types::*;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::gateway::{ApiRequest, Gateway};
use crate::job::JobId;
use crate::status::RequestStatus;

/// Search endpoint
pub const SEARCH_PATH: &str = "/search";

struct Session {
    params: SearchParams,
    filters: Filters,
    scope: CancellationToken,
}

/// Search state store with job polling
pub struct SearchClient {
    gateway: Gateway,
    poll_interval: Duration,
    session: Mutex<Session>,
    state: watch::Sender<SearchSnapshot>,
}

impl SearchClient {
    /// Create a client polling at the configured interval
    pub fn new(gateway: Gateway, config: &ClientConfig) -> Self {
        Self::with_poll_interval(gateway, config.poll_interval())
    }

    pub fn with_poll_interval(gateway: Gateway, poll_interval: Duration) -> Self {
        let (state, _) = watch::channel(SearchSnapshot::default());

        Self {
            gateway,
            poll_interval,
            session: Mutex::new(Session {
                params: SearchParams::default(),
                filters: Filters::new(),
                scope: CancellationToken::new(),
            }),
            state,
        }
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    /// Watch snapshot changes
    pub fn subscribe(&self) -> watch::Receiver<SearchSnapshot> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> SearchSnapshot {
        self.state.borrow().clone()
    }

    pub fn result(&self) -> SearchResult {
        self.state.borrow().result.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().is_loading()
    }

    pub fn job_id(&self) -> Option<JobId> {
        self.state.borrow().job_id.clone()
    }

    pub fn phase(&self) -> SearchPhase {
        self.state.borrow().phase
    }

    /// Parameters of the latest session
    pub fn params(&self) -> SearchParams {
        self.lock_session().params.clone()
    }

    pub fn filters(&self) -> Filters {
        self.lock_session().filters.clone()
    }

    /// Replace all filters; they apply from the next search on
    pub fn set_filters(&self, filters: Filters) {
        debug!("Search: setting {} filters", filters.len());
        self.lock_session().filters = filters;
    }

    pub fn remove_filters(&self) {
        debug!("Search: clearing filters");
        self.lock_session().filters.clear();
    }

    /// Start a search session and drive it until results arrive.
    ///
    /// Returns [`ClientError::Superseded`] if another search (or
    /// [`cancel`](Self::cancel)) replaced this session before it finished.
    pub async fn search(&self, params: SearchParams) -> Result<SearchResult> {
        let (session, scope, body) = self.begin(params);
        self.drive(session, scope, body).await
    }

    /// Start a search session in the background.
    ///
    /// The session starts before this returns, so sessions submitted in
    /// sequence supersede each other in that order.
    pub fn submit(self: &Arc<Self>, params: SearchParams) -> JoinHandle<Result<SearchResult>> {
        let (session, scope, body) = self.begin(params);
        let client = Arc::clone(self);

        tokio::spawn(async move { client.drive(session, scope, body).await })
    }

    /// Abandon the current session without starting a new one
    pub fn cancel(&self) {
        let session = self.lock_session();
        session.scope.cancel();

        let was_loading = self.state.send_if_modified(|s| {
            if !s.is_loading() {
                return false;
            }
            s.session += 1;
            s.phase = SearchPhase::Idle;
            s.job_id = None;
            true
        });

        if was_loading {
            info!("Search: session cancelled");
            self.gateway.board().set_status(RequestStatus::settled());
        }
    }

    fn lock_session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Merge parameters, retire the previous session and open a new one
    fn begin(&self, update: SearchParams) -> (u64, CancellationToken, serde_json::Value) {
        let mut guard = self.lock_session();
        let session = &mut *guard;

        session.scope.cancel();
        session.scope = CancellationToken::new();
        session.params = session.params.merged_with(update);
        let body = search_body(&session.params, &session.filters);

        let mut number = 0;
        self.state.send_modify(|s| {
            s.session += 1;
            s.phase = SearchPhase::Submitting;
            s.job_id = None;
            number = s.session;
        });

        info!("Search session {}: submitting {:?}", number, session.params);
        (number, session.scope.clone(), body)
    }

    async fn drive(
        &self,
        session: u64,
        scope: CancellationToken,
        body: serde_json::Value,
    ) -> Result<SearchResult> {
        let mut request = ApiRequest::post(SEARCH_PATH).with_body(body);

        loop {
            let outcome = tokio::select! {
                biased;
                _ = scope.cancelled() => return Err(ClientError::Superseded),
                outcome = self.gateway.send_scoped(request, &scope) => outcome,
            };

            let reply = match outcome.and_then(SearchReply::from_value) {
                Ok(reply) => reply,
                Err(ClientError::Superseded) => return Err(ClientError::Superseded),
                Err(e) => {
                    self.fail(session, &e);
                    return Err(e);
                }
            };

            match reply {
                SearchReply::Pending(job_id) => {
                    let committed = self.commit(session, |s| {
                        s.phase = SearchPhase::Polling;
                        s.job_id = Some(job_id.clone());
                    });
                    if !committed {
                        return Err(ClientError::Superseded);
                    }

                    debug!(
                        "Search session {}: job {} pending, polling in {:?}",
                        session, job_id, self.poll_interval
                    );

                    tokio::select! {
                        biased;
                        _ = scope.cancelled() => return Err(ClientError::Superseded),
                        _ = tokio::time::sleep(self.poll_interval) => {}
                    }

                    request = ApiRequest::post(SEARCH_PATH).with_body(poll_body(&job_id));
                }
                SearchReply::Complete(result) => {
                    let committed = self.commit(session, |s| {
                        s.phase = SearchPhase::Completed;
                        s.job_id = None;
                        s.result = result.clone();
                    });
                    if !committed {
                        return Err(ClientError::Superseded);
                    }

                    info!(
                        "Search session {}: completed with {} entries",
                        session,
                        result.entries.len()
                    );
                    return Ok(result);
                }
            }
        }
    }

    fn fail(&self, session: u64, error: &ClientError) {
        warn!("Search session {} failed: {}", session, error);
        self.commit(session, |s| {
            s.phase = SearchPhase::Failed;
            s.job_id = None;
        });
    }

    /// Apply `update` only if `session` is still the live one
    fn commit(&self, session: u64, update: impl FnOnce(&mut SearchSnapshot)) -> bool {
        self.state.send_if_modified(|s| {
            if s.session != session {
                return false;
            }
            update(s);
            true
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::StatusBoard;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::collections::VecDeque;

    const FAST_POLL: Duration = Duration::from_millis(10);

    #[derive(Clone, Default)]
    struct Script {
        replies: Arc<Mutex<VecDeque<(StatusCode, Value)>>>,
        bodies: Arc<Mutex<Vec<Value>>>,
    }

    impl Script {
        fn new(replies: Vec<(StatusCode, Value)>) -> Self {
            Self {
                replies: Arc::new(Mutex::new(replies.into())),
                bodies: Arc::default(),
            }
        }

        fn bodies(&self) -> Vec<Value> {
            self.bodies.lock().unwrap().clone()
        }
    }

    async fn scripted(State(script): State<Script>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
        script.bodies.lock().unwrap().push(body);
        let (status, reply) = script
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or((StatusCode::INTERNAL_SERVER_ERROR, json!("No scripted reply")));
        (status, Json(reply))
    }

    async fn spawn_server(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind to ephemeral port");
        let addr = listener.local_addr().expect("get local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("server run");
        });

        format!("http://{}", addr)
    }

    async fn client_for(app: Router, poll_interval: Duration) -> Arc<SearchClient> {
        let url = spawn_server(app).await;
        let config = ClientConfig::development().with_api(url);
        let gateway = Gateway::new(&config, StatusBoard::new()).unwrap();
        Arc::new(SearchClient::with_poll_interval(gateway, poll_interval))
    }

    async fn scripted_client(script: &Script, poll_interval: Duration) -> Arc<SearchClient> {
        let app = Router::new()
            .route(SEARCH_PATH, post(scripted))
            .with_state(script.clone());
        client_for(app, poll_interval).await
    }

    fn results(entries: Value) -> (StatusCode, Value) {
        (StatusCode::OK, json!({"entries": entries, "aggregations": [{"field": "dataset"}]}))
    }

    #[tokio::test]
    async fn test_immediate_results() {
        let script = Script::new(vec![results(json!([{"id": 1}]))]);
        let client = scripted_client(&script, FAST_POLL).await;

        let result = client.search(SearchParams::query("cat")).await.unwrap();
        assert_eq!(result.entries, vec![json!({"id": 1})]);

        let snapshot = client.snapshot();
        assert_eq!(snapshot.phase, SearchPhase::Completed);
        assert_eq!(snapshot.session, 1);
        assert!(snapshot.job_id.is_none());
        assert_eq!(snapshot.result, result);
        assert!(!client.gateway().board().status().loading);
    }

    #[tokio::test]
    async fn test_polls_until_results() {
        let script = Script::new(vec![
            (StatusCode::OK, json!({"job_id": 42})),
            (StatusCode::OK, json!({"job_id": 42})),
            results(json!([{"id": 7}])),
        ]);
        let client = scripted_client(&script, FAST_POLL).await;

        let result = client.search(SearchParams::query("cat")).await.unwrap();
        assert_eq!(result.entries, vec![json!({"id": 7})]);

        let bodies = script.bodies();
        assert_eq!(bodies.len(), 3);
        assert_eq!(bodies[0]["params"]["query"], "cat");
        assert_eq!(bodies[1], json!({"params": {"job_id": 42}}));
        assert_eq!(bodies[2], json!({"params": {"job_id": 42}}));

        assert!(client.job_id().is_none());
        assert!(!client.is_loading());
        assert!(!client.gateway().board().status().loading);
    }

    #[tokio::test]
    async fn test_pending_job_schedules_one_poll() {
        let script = Script::new(vec![(StatusCode::OK, json!({"job_id": 42}))]);
        let client = scripted_client(&script, Duration::from_secs(60)).await;
        let mut snapshots = client.subscribe();

        let handle = client.submit(SearchParams::query("cat"));
        snapshots
            .wait_for(|s| s.phase == SearchPhase::Polling)
            .await
            .unwrap();

        assert_eq!(client.job_id(), Some(JobId::Number(42)));
        assert!(client.is_loading());
        assert!(client.gateway().board().status().loading);
        assert_eq!(script.bodies().len(), 1);

        client.cancel();
        assert!(matches!(handle.await.unwrap(), Err(ClientError::Superseded)));
        assert_eq!(client.phase(), SearchPhase::Idle);
        assert!(client.job_id().is_none());
        assert!(!client.gateway().board().status().loading);
        assert_eq!(script.bodies().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_keeps_previous_result() {
        let script = Script::new(vec![
            results(json!([{"id": 1}])),
            (StatusCode::BAD_REQUEST, json!({"query": ["Too short"]})),
        ]);
        let client = scripted_client(&script, FAST_POLL).await;

        let first = client.search(SearchParams::query("cat")).await.unwrap();
        let err = client.search(SearchParams::query("c")).await.unwrap_err();

        assert_eq!(err.details().unwrap(), ["too_short"]);
        assert_eq!(client.phase(), SearchPhase::Failed);
        assert_eq!(client.result(), first);

        let status = client.gateway().board().status();
        assert!(status.error);
        assert!(!status.loading);
    }

    #[tokio::test]
    async fn test_failed_poll_clears_job() {
        let script = Script::new(vec![
            (StatusCode::OK, json!({"job_id": "j-1"})),
            (StatusCode::NOT_FOUND, json!("Not found.")),
        ]);
        let client = scripted_client(&script, FAST_POLL).await;
        let mut messages = client.gateway().board().subscribe_messages();

        let err = client.search(SearchParams::query("cat")).await.unwrap_err();
        assert_eq!(err.details().unwrap(), ["not_found"]);
        assert_eq!(client.phase(), SearchPhase::Failed);
        assert!(client.job_id().is_none());

        assert_eq!(messages.recv().await.unwrap().details, vec!["not_found"]);
        assert!(messages.try_recv().is_err());
        assert_eq!(script.bodies().len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_reply_fails_session() {
        let script = Script::new(vec![(StatusCode::OK, json!(["not", "a", "result"]))]);
        let client = scripted_client(&script, FAST_POLL).await;

        let err = client.search(SearchParams::query("cat")).await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidReply(_)));
        assert_eq!(client.phase(), SearchPhase::Failed);
    }

    #[tokio::test]
    async fn test_reply_without_result_keeps_previous_result() {
        let script = Script::new(vec![
            results(json!([{"id": 1}])),
            (StatusCode::OK, json!({})),
            (StatusCode::OK, json!({"job_id": -1})),
        ]);
        let client = scripted_client(&script, FAST_POLL).await;

        let first = client.search(SearchParams::query("cat")).await.unwrap();

        for _ in 0..2 {
            let err = client.search(SearchParams::query("dog")).await.unwrap_err();
            assert!(matches!(err, ClientError::InvalidReply(_)));
            assert_eq!(client.phase(), SearchPhase::Failed);
            assert_eq!(client.result(), first);
            assert!(client.job_id().is_none());
        }
    }

    #[tokio::test]
    async fn test_params_merge_and_filters() {
        let script = Script::new(vec![results(json!([])), results(json!([])), results(json!([]))]);
        let client = scripted_client(&script, FAST_POLL).await;

        let mut filters = Filters::new();
        filters.insert("year".to_string(), json!([1900, 1950]));
        client.set_filters(filters);

        client
            .search(SearchParams::query("cat").with_dataset(["a"]).with_modality("image"))
            .await
            .unwrap();
        client.search(SearchParams::query("dog")).await.unwrap();
        client.remove_filters();
        client.search(SearchParams::default().with_similarity(["clip"])).await.unwrap();

        let bodies = script.bodies();
        assert_eq!(
            bodies[0],
            json!({"params": {"query": "cat", "modality": "image", "dataset": ["a"], "filters": {"year": [1900, 1950]}}})
        );
        assert_eq!(
            bodies[1],
            json!({"params": {"query": "dog", "modality": "image", "dataset": ["a"], "filters": {"year": [1900, 1950]}}})
        );
        assert_eq!(
            bodies[2],
            json!({"params": {"query": "dog", "modality": "image", "dataset": ["a"], "similarity": ["clip"], "filters": {}}})
        );
        assert_eq!(client.params().dataset, Some(vec!["a".to_string()]));
        assert!(client.filters().is_empty());
    }

    /// First session gets a job whose poll answers slowly with stale results;
    /// the second session answers immediately.
    async fn racing(Json(body): Json<Value>) -> Json<Value> {
        let params = &body["params"];
        if params["job_id"] == "first-job" {
            tokio::time::sleep(Duration::from_millis(200)).await;
            return Json(json!({"entries": ["stale"], "aggregations": []}));
        }
        if params["query"] == "first" {
            return Json(json!({"job_id": "first-job"}));
        }
        Json(json!({"entries": ["fresh"], "aggregations": []}))
    }

    #[tokio::test]
    async fn test_new_search_supersedes_pending_poll() {
        let app = Router::new().route(SEARCH_PATH, post(racing));
        let client = client_for(app, FAST_POLL).await;
        let mut snapshots = client.subscribe();

        let first = client.submit(SearchParams::query("first"));
        snapshots
            .wait_for(|s| s.phase == SearchPhase::Polling)
            .await
            .unwrap();
        // Let the slow poll go out
        tokio::time::sleep(Duration::from_millis(50)).await;

        let fresh = client.search(SearchParams::query("second")).await.unwrap();
        assert_eq!(fresh.entries, vec![json!("fresh")]);
        assert!(matches!(first.await.unwrap(), Err(ClientError::Superseded)));

        // Outlast the stale poll's server-side delay
        tokio::time::sleep(Duration::from_millis(300)).await;

        let snapshot = client.snapshot();
        assert_eq!(snapshot.session, 2);
        assert_eq!(snapshot.phase, SearchPhase::Completed);
        assert_eq!(snapshot.result.entries, vec![json!("fresh")]);
        assert!(snapshot.job_id.is_none());

        let status = client.gateway().board().status();
        assert!(!status.loading);
        assert!(!status.error);
    }

    #[tokio::test]
    async fn test_submissions_supersede_in_order() {
        let script = Script::new(vec![results(json!([{"id": 2}]))]);
        let client = scripted_client(&script, Duration::from_secs(60)).await;

        let first = client.submit(SearchParams::query("one"));
        let second = client.submit(SearchParams::query("two"));

        assert!(matches!(first.await.unwrap(), Err(ClientError::Superseded)));
        let result = second.await.unwrap().unwrap();
        assert_eq!(client.snapshot().session, 2);
        assert_eq!(client.result(), result);

        // The retired session never reached the server
        let bodies = script.bodies();
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0]["params"]["query"], "two");
    }
}
