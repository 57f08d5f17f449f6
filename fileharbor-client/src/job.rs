//! Job identifiers for asynchronous searches

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Field carrying the job identifier in requests and responses
pub const JOB_ID_FIELD: &str = "job_id";

/// Opaque token naming a search the server is still computing
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobId {
    Number(u64),
    Text(String),
}

impl JobId {
    /// Read a job id from a raw JSON value. Empty strings, zero and
    /// non-scalar values do not name a job.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_u64().filter(|n| *n != 0).map(JobId::Number),
            Value::String(s) if !s.is_empty() => Some(JobId::Text(s.clone())),
            _ => None,
        }
    }

    /// Job id carried by a payload, either as `job_id` or as `params.job_id`
    pub fn in_payload(payload: &Value) -> Option<Self> {
        let object = payload.as_object()?;

        object
            .get(JOB_ID_FIELD)
            .and_then(Self::from_value)
            .or_else(|| {
                object
                    .get("params")
                    .and_then(|params| params.get(JOB_ID_FIELD))
                    .and_then(Self::from_value)
            })
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobId::Number(n) => write!(f, "{}", n),
            JobId::Text(s) => f.write_str(s),
        }
    }
}

impl From<u64> for JobId {
    fn from(n: u64) -> Self {
        JobId::Number(n)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        JobId::Text(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_job_id_in_payload() {
        assert_eq!(JobId::in_payload(&json!({"job_id": 42})), Some(JobId::Number(42)));
        assert_eq!(
            JobId::in_payload(&json!({"params": {"job_id": "a1b2"}})),
            Some(JobId::from("a1b2"))
        );
        assert_eq!(JobId::in_payload(&json!({"params": {"query": "cat"}})), None);
        assert_eq!(JobId::in_payload(&json!({"entries": [], "aggregations": []})), None);
        assert_eq!(JobId::in_payload(&json!("job_id")), None);
    }

    #[test]
    fn test_falsy_job_ids_are_ignored() {
        assert_eq!(JobId::in_payload(&json!({"job_id": null})), None);
        assert_eq!(JobId::in_payload(&json!({"job_id": ""})), None);
        assert_eq!(JobId::in_payload(&json!({"job_id": 0})), None);
    }

    #[test]
    fn test_job_id_serializes_untagged() {
        assert_eq!(serde_json::to_value(JobId::Number(7)).unwrap(), json!(7));
        assert_eq!(serde_json::to_value(JobId::from("abc")).unwrap(), json!("abc"));
        assert_eq!(JobId::from("abc").to_string(), "abc");
    }
}
