//! Search types and data structures

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{ClientError, Result};
use crate::job::{JobId, JOB_ID_FIELD};

/// Filter name → value, sent alongside the search parameters
pub type Filters = Map<String, Value>;

/// Search parameters
///
/// Each new search is merged into the previous parameters: fields left as
/// `None` keep the value of the last session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchParams {
    /// Query text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// Modality tag (e.g. "image", "text")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modality: Option<String>,
    /// Datasets to search
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset: Option<Vec<String>>,
    /// Similarity modes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<Vec<String>>,
}

impl SearchParams {
    /// Parameters carrying only a query
    pub fn query(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            ..Self::default()
        }
    }

    pub fn with_modality(mut self, modality: impl Into<String>) -> Self {
        self.modality = Some(modality.into());
        self
    }

    pub fn with_dataset<I, S>(mut self, dataset: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dataset = Some(dataset.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_similarity<I, S>(mut self, similarity: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.similarity = Some(similarity.into_iter().map(Into::into).collect());
        self
    }

    /// Apply `update` on top of these parameters
    pub fn merged_with(&self, update: SearchParams) -> SearchParams {
        SearchParams {
            query: update.query.or_else(|| self.query.clone()),
            modality: update.modality.or_else(|| self.modality.clone()),
            dataset: update.dataset.or_else(|| self.dataset.clone()),
            similarity: update.similarity.or_else(|| self.similarity.clone()),
        }
    }

    fn to_json(&self) -> Map<String, Value> {
        let mut object = Map::new();
        if let Some(query) = &self.query {
            object.insert("query".to_string(), json!(query));
        }
        if let Some(modality) = &self.modality {
            object.insert("modality".to_string(), json!(modality));
        }
        if let Some(dataset) = &self.dataset {
            object.insert("dataset".to_string(), json!(dataset));
        }
        if let Some(similarity) = &self.similarity {
            object.insert("similarity".to_string(), json!(similarity));
        }
        object
    }
}

/// Body of a new search request: `{"params": {...params, "filters": {...}}}`
pub fn search_body(params: &SearchParams, filters: &Filters) -> Value {
    let mut object = params.to_json();
    object.insert("filters".to_string(), Value::Object(filters.clone()));
    json!({ "params": object })
}

/// Body of a job status poll: `{"params": {"job_id": ...}}`
pub fn poll_body(job_id: &JobId) -> Value {
    json!({ "params": { JOB_ID_FIELD: job_id } })
}

/// Final search result. Entries and aggregations are passed through as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    #[serde(default)]
    pub entries: Vec<Value>,
    #[serde(default)]
    pub aggregations: Vec<Value>,
}

/// Server answer to a search or poll request
#[derive(Debug, Clone, PartialEq)]
pub enum SearchReply {
    /// The search is still running under this job
    Pending(JobId),
    /// The search finished
    Complete(SearchResult),
}

impl SearchReply {
    pub fn from_value(value: Value) -> Result<Self> {
        if let Some(job_id) = JobId::in_payload(&value) {
            return Ok(SearchReply::Pending(job_id));
        }

        let Some(object) = value.as_object() else {
            return Err(ClientError::InvalidReply(format!(
                "expected a JSON object, got {}",
                value
            )));
        };

        if !object.contains_key("entries") && !object.contains_key("aggregations") {
            return Err(ClientError::InvalidReply(format!(
                "neither a job nor a result: {}",
                value
            )));
        }

        serde_json::from_value(value)
            .map(SearchReply::Complete)
            .map_err(|e| ClientError::InvalidReply(e.to_string()))
    }
}

/// Where the current search session stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchPhase {
    /// No search outstanding
    Idle,
    /// Initial request in flight
    Submitting,
    /// Waiting on a server-side job
    Polling,
    /// Results committed
    Completed,
    /// The session ended with an error
    Failed,
}

/// Observable state of the search client
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchSnapshot {
    /// Session number; increases with every `search()`
    pub session: u64,
    pub phase: SearchPhase,
    /// Job the session is waiting on
    pub job_id: Option<JobId>,
    /// Latest committed result; kept across failures
    pub result: SearchResult,
}

impl SearchSnapshot {
    pub fn is_loading(&self) -> bool {
        matches!(self.phase, SearchPhase::Submitting | SearchPhase::Polling)
    }
}

impl Default for SearchSnapshot {
    fn default() -> Self {
        Self {
            session: 0,
            phase: SearchPhase::Idle,
            job_id: None,
            result: SearchResult::default(),
        }
    }
}
