//! Process-wide request status and error messages
//!
//! The [`StatusBoard`] is created once per application session and shared by
//! the gateway (which writes to it) and any number of observers (which
//! subscribe to it). It replaces ambient global state with an explicit
//! context object.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Capacity of the error message broadcast channel
const MESSAGE_CHANNEL_CAPACITY: usize = 64;

/// Global loading/error indicator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestStatus {
    /// A user-facing request (or its poll chain) is outstanding
    pub loading: bool,
    /// The last request failed
    pub error: bool,
    /// When the last cycle ended; `None` while loading
    pub timestamp: Option<DateTime<Utc>>,
}

impl RequestStatus {
    /// Status while a request is in flight
    pub fn loading() -> Self {
        Self {
            loading: true,
            error: false,
            timestamp: None,
        }
    }

    /// Status after a successful cycle
    pub fn settled() -> Self {
        Self {
            loading: false,
            error: false,
            timestamp: Some(Utc::now()),
        }
    }

    /// Status after a failed request
    pub fn failed() -> Self {
        Self {
            loading: false,
            error: true,
            timestamp: Some(Utc::now()),
        }
    }
}

/// Message kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Error,
}

/// User-facing message describing a failed request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub timestamp: DateTime<Utc>,
    /// Normalized error tokens, in payload order
    pub details: Vec<String>,
}

impl ErrorMessage {
    /// Create an error message stamped with the current time
    pub fn error(details: Vec<String>) -> Self {
        Self {
            kind: MessageKind::Error,
            timestamp: Utc::now(),
            details,
        }
    }
}

struct BoardInner {
    status: watch::Sender<RequestStatus>,
    latest_message: watch::Sender<Option<ErrorMessage>>,
    messages: broadcast::Sender<ErrorMessage>,
}

/// Shared holder of the latest [`RequestStatus`] and [`ErrorMessage`]
#[derive(Clone)]
pub struct StatusBoard {
    inner: Arc<BoardInner>,
}

impl StatusBoard {
    /// Create a new board with an idle status and no message
    pub fn new() -> Self {
        let (status, _) = watch::channel(RequestStatus::default());
        let (latest_message, _) = watch::channel(None);
        let (messages, _) = broadcast::channel(MESSAGE_CHANNEL_CAPACITY);

        Self {
            inner: Arc::new(BoardInner {
                status,
                latest_message,
                messages,
            }),
        }
    }

    /// Current status
    pub fn status(&self) -> RequestStatus {
        self.inner.status.borrow().clone()
    }

    /// Latest published error message
    pub fn message(&self) -> Option<ErrorMessage> {
        self.inner.latest_message.borrow().clone()
    }

    /// Watch status transitions
    pub fn subscribe_status(&self) -> watch::Receiver<RequestStatus> {
        self.inner.status.subscribe()
    }

    /// Receive every published error message
    pub fn subscribe_messages(&self) -> broadcast::Receiver<ErrorMessage> {
        self.inner.messages.subscribe()
    }

    /// Replace the status unconditionally
    pub fn set_status(&self, status: RequestStatus) {
        self.set_status_scoped(None, status);
    }

    /// Replace the status unless `scope` has been cancelled.
    ///
    /// The cancellation check runs under the channel's write lock, so a
    /// superseded writer can never land after the writer that superseded it.
    pub fn set_status_scoped(&self, scope: Option<&CancellationToken>, status: RequestStatus) -> bool {
        self.inner.status.send_if_modified(|current| {
            if scope.is_some_and(|s| s.is_cancelled()) {
                return false;
            }
            debug!(
                "Status: loading={} error={}",
                status.loading, status.error
            );
            *current = status;
            true
        })
    }

    /// Mark the status as failed and publish `message`, unless `scope` has
    /// been cancelled. Returns whether the message was published.
    ///
    /// The message goes out while the status lock is held, so a cancellation
    /// lands either before both writes or after both.
    pub fn report_failure(&self, scope: Option<&CancellationToken>, message: ErrorMessage) -> bool {
        self.inner.status.send_if_modified(|current| {
            if scope.is_some_and(|s| s.is_cancelled()) {
                return false;
            }
            *current = RequestStatus::failed();

            self.inner.latest_message.send_replace(Some(message.clone()));
            // No subscribers is fine; the latest message stays readable
            let _ = self.inner.messages.send(message);
            true
        })
    }
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StatusBoard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusBoard")
            .field("status", &self.status())
            .field("message", &self.message())
            .finish()
    }
}
