//! Failure classification into normalized error tokens
//!
//! Every failed request ends up as one [`Failure`]. Its [`Failure::details`]
//! are the lowercase, underscore-joined tokens shown to users and used as
//! lookup keys for translated messages.

use serde_json::{Map, Value};
use tracing::debug;

/// Token used when nothing else could be derived
pub const UNKNOWN_ERROR: &str = "unknown_error";

/// Token used for requests that ran out of time
pub const REQUEST_TIMEOUT: &str = "request_timeout";

/// Message for requests that never produced a usable response
pub const NETWORK_ERROR: &str = "Network Error";

/// Normalize a raw message: trim, collapse whitespace into `_`, drop periods,
/// lowercase.
pub fn normalize_token(input: &str) -> String {
    input
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .replace('.', "")
        .to_lowercase()
}

/// Shape of an error response body
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorPayload {
    /// `"Not found."`
    Text(String),
    /// `["Too short", "Required"]`
    List(Vec<Value>),
    /// `{"query": ["Too short"], "dataset": "Unknown"}`
    Fields(Map<String, Value>),
    /// Empty body or a JSON scalar carrying no message
    Absent,
}

impl ErrorPayload {
    /// Classify a raw response body. Bodies that are not JSON are treated as text.
    pub fn from_body(body: &str) -> Self {
        if body.trim().is_empty() {
            return ErrorPayload::Absent;
        }

        match serde_json::from_str::<Value>(body) {
            Ok(value) => Self::from_value(value),
            Err(_) => ErrorPayload::Text(body.to_string()),
        }
    }

    /// Classify a parsed JSON body
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::String(text) => ErrorPayload::Text(text),
            Value::Array(items) => ErrorPayload::List(items),
            Value::Object(fields) => ErrorPayload::Fields(fields),
            Value::Null | Value::Bool(_) | Value::Number(_) => ErrorPayload::Absent,
        }
    }

    /// Normalized tokens carried by the payload
    fn tokens(&self) -> Vec<String> {
        let tokens: Vec<String> = match self {
            ErrorPayload::Text(text) => vec![normalize_token(text)],
            ErrorPayload::List(items) => items.iter().map(value_token).collect(),
            ErrorPayload::Fields(fields) => fields
                .values()
                .flat_map(|raw| match raw {
                    Value::Array(values) => values.iter().map(value_token).collect::<Vec<_>>(),
                    scalar => vec![value_token(scalar)],
                })
                .collect(),
            ErrorPayload::Absent => Vec::new(),
        };

        tokens.into_iter().filter(|token| !token.is_empty()).collect()
    }
}

fn value_token(value: &Value) -> String {
    normalize_token(&value_text(value))
}

/// Plain text of a payload element; nested collections join with `,`
fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        Value::Array(items) => items.iter().map(value_text).collect::<Vec<_>>().join(","),
        Value::Object(fields) => fields.values().map(value_text).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    }
}

/// Why a request failed
#[derive(Debug, Clone, PartialEq)]
pub enum Failure {
    /// The overall request timeout elapsed
    Timeout,
    /// The server answered with an error status
    Server { status: u16, payload: ErrorPayload },
    /// Connection, protocol or decoding failure
    Transport(String),
}

impl Failure {
    /// Build from a reqwest error raised before a response was available.
    ///
    /// The error's own text carries the URL and the OS error, so only its
    /// kind is kept.
    pub fn from_reqwest(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            return Failure::Timeout;
        }

        debug!("Transport failure: {}", error);
        Failure::Transport(NETWORK_ERROR.to_string())
    }

    /// Normalized tokens for display. Never empty.
    pub fn details(&self) -> Vec<String> {
        let tokens = match self {
            Failure::Timeout => vec![REQUEST_TIMEOUT.to_string()],
            Failure::Server { status, payload } => match payload {
                ErrorPayload::Absent => {
                    vec![normalize_token(&format!("Request failed with status code {}", status))]
                }
                payload => payload.tokens(),
            },
            Failure::Transport(message) => vec![normalize_token(message)],
        };

        let tokens: Vec<String> = tokens.into_iter().filter(|t| !t.is_empty()).collect();
        if tokens.is_empty() {
            vec![UNKNOWN_ERROR.to_string()]
        } else {
            tokens
        }
    }
}
