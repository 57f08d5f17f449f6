//! Search jobs and generated results

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// `params` object of a search or poll request
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RequestParams {
    pub query: Option<String>,
    pub modality: Option<String>,
    #[serde(default)]
    pub dataset: Vec<String>,
    #[serde(default)]
    pub similarity: Vec<String>,
    #[serde(default)]
    pub filters: Map<String, Value>,
    pub job_id: Option<Value>,
}

/// Body of `POST /search`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchBody {
    #[serde(default)]
    pub params: RequestParams,
}

/// Result of polling a job
#[derive(Debug, PartialEq)]
pub enum PollOutcome {
    /// No such job (never created, or already delivered)
    Unknown,
    /// Still running
    Pending,
    /// Finished; the job is forgotten
    Ready(Value),
}

struct PendingJob {
    params: RequestParams,
    remaining_polls: u32,
    last_seen: Instant,
}

/// Running jobs keyed by id.
///
/// Jobs not polled within the TTL are dropped, so jobs abandoned by their
/// client do not pile up.
pub struct JobStore {
    jobs: HashMap<String, PendingJob>,
    entries_per_dataset: usize,
    ttl: Duration,
}

impl JobStore {
    pub fn new(entries_per_dataset: usize, ttl: Duration) -> Self {
        Self {
            jobs: HashMap::new(),
            entries_per_dataset,
            ttl,
        }
    }

    /// Register a job that finishes after `polls` polls
    pub fn create(&mut self, params: RequestParams, polls: u32) -> String {
        let now = Instant::now();
        self.evict_expired(now);

        let id = uuid::Uuid::new_v4().simple().to_string();
        self.jobs.insert(
            id.clone(),
            PendingJob {
                params,
                remaining_polls: polls,
                last_seen: now,
            },
        );
        id
    }

    pub fn poll(&mut self, id: &str) -> PollOutcome {
        let now = Instant::now();
        self.evict_expired(now);

        let Some(job) = self.jobs.get_mut(id) else {
            return PollOutcome::Unknown;
        };

        if job.remaining_polls > 0 {
            job.remaining_polls -= 1;
            job.last_seen = now;
            return PollOutcome::Pending;
        }

        match self.jobs.remove(id) {
            Some(job) => PollOutcome::Ready(build_results(&job.params, self.entries_per_dataset)),
            None => PollOutcome::Unknown,
        }
    }

    /// Drop jobs idle for longer than the TTL as of `now`; returns how many
    pub fn evict_expired(&mut self, now: Instant) -> usize {
        let ttl = self.ttl;
        let before = self.jobs.len();
        self.jobs
            .retain(|_, job| now.saturating_duration_since(job.last_seen) <= ttl);

        let evicted = before - self.jobs.len();
        if evicted > 0 {
            debug!("Evicted {} expired jobs", evicted);
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

/// Final reply for a search: entries per dataset plus a dataset aggregation
pub fn build_results(params: &RequestParams, per_dataset: usize) -> Value {
    let datasets = if params.dataset.is_empty() {
        vec!["default".to_string()]
    } else {
        params.dataset.clone()
    };

    let mut entries = Vec::new();
    let mut counts = Vec::new();
    for dataset in &datasets {
        for rank in 0..per_dataset {
            entries.push(json!({
                "id": format!("{}-{}", dataset, rank),
                "dataset": dataset,
                "query": params.query,
                "modality": params.modality,
                "similarity": params.similarity,
                "filters": params.filters,
                "score": 1.0 - rank as f64 / per_dataset.max(1) as f64,
            }));
        }
        counts.push(json!({ "name": dataset, "count": per_dataset }));
    }

    json!({
        "entries": entries,
        "aggregations": [{ "field": "dataset", "entries": counts }],
    })
}
